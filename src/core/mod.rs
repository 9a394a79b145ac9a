pub mod config;
pub mod connection;
pub mod router;
pub mod session;
pub mod store;
pub mod terminal;
