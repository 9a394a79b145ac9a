mod reconnect;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::core::connection::backoff::ReconnectPolicy;
use crate::core::connection::memory::MemoryConnector;
use crate::core::connection::subscriptions::topics;
use crate::core::connection::{
    ConnectionConfig, ConnectionManager, ConnectionSnapshot, ConnectionStatus,
};
use crate::core::router::MessageRouter;
use crate::core::store::{ConsoleState, shared};

const BASE: Duration = Duration::from_secs(1);

fn config(max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig {
        endpoint: Url::parse("ws://sync.test/").unwrap(),
        ping_interval: Duration::from_secs(30),
        resubscribe_delay: Duration::from_millis(100),
        reconnect: ReconnectPolicy {
            base_delay: BASE,
            growth_factor: 2.0,
            max_attempts,
        },
        default_topics: topics::DEFAULT.iter().map(|t| t.to_string()).collect(),
    }
}

fn manager(connector: &MemoryConnector, max_attempts: u32) -> ConnectionManager {
    ConnectionManager::new(
        config(max_attempts),
        Arc::new(connector.clone()),
        MessageRouter::new(shared(ConsoleState::default())),
    )
}

async fn wait_for(
    rx: &mut watch::Receiver<ConnectionSnapshot>,
    status: ConnectionStatus,
) -> ConnectionSnapshot {
    rx.wait_for(|s| s.status == status)
        .await
        .expect("status channel closed")
        .clone()
}

/// Paused-clock gaps land on the millisecond grid; allow for rounding.
fn assert_gap(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(5),
        "expected gap of {:?}, got {:?}",
        expected,
        actual
    );
}
