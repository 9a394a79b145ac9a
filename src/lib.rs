//! Real-time event sync for an operations console: a reconnecting event
//! stream connection, a message router and the entity stores it drives.

pub mod core;
pub mod logging;

pub use crate::core::config::{ConfigError, SyncConfig};
pub use crate::core::connection::{
    ConnectionManager, ConnectionSnapshot, ConnectionStatus, generate_client_id,
};
pub use crate::core::router::MessageRouter;
pub use crate::core::session::ConsoleSession;
pub use crate::core::store::ConsoleState;
