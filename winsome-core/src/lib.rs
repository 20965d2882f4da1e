pub mod config;
pub mod core_engine;
pub mod core_notify;
pub mod core_rewards;
pub mod core_server;
pub mod core_store;
pub mod logging;
pub mod metrics;
pub mod shutdown;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use core_server::{Server, ServerError};
pub use logging::{init_logging, LogLevel};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};
