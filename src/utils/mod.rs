pub mod config;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use config::{AccountConfig, Config};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use retry::RetryPolicy;
