//! Process startup: logging, signals and the store pool.

mod logging;
mod pool;
mod shutdown;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use pool::{MEMORY_SCHEME, build_pool, connect_store};
pub use shutdown::shutdown_token;
