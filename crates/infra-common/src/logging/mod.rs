//! Logging setup for voxdial services.

mod setup;

pub use setup::{parse_log_level, setup_logging, LoggingConfig};
