use std::sync::Arc;
use tracing::info;

use crate::core::config::{ConfigError, SyncConfig};
use crate::core::connection::ConnectionManager;
use crate::core::connection::transport::Connector;
use crate::core::router::MessageRouter;
use crate::core::store::{ConsoleState, SharedState, read_state, shared};

/// One console's view of the event stream: state, router and connection,
/// created by [`ConsoleSession::init`] and ended by
/// [`ConsoleSession::teardown`]. Independent sessions share nothing.
pub struct ConsoleSession {
    state: SharedState,
    connection: ConnectionManager,
}

impl ConsoleSession {
    /// Validate `config`, build the stores and start connecting.
    pub fn init(config: &SyncConfig, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = shared(ConsoleState::new(&config.capacities));
        let router = MessageRouter::new(state.clone());
        let connection = ConnectionManager::new(config.connection()?, connector, router);
        info!(
            "Console session {} targeting {}",
            connection.client_id(),
            connection.endpoint()
        );
        connection.connect();
        Ok(Self { state, connection })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Run `f` against a consistent view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&ConsoleState) -> R) -> R {
        f(&read_state(&self.state))
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub async fn teardown(self) {
        self.connection.disconnect().await;
        info!("Console session {} closed", self.connection.client_id());
    }
}
