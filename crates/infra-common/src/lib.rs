//! # voxdial-infra-common
//!
//! A thin horizontal layer shared by every voxdial component:
//!
//! - Logging setup and level parsing
//! - Environment-backed configuration loading
//!
//! Configuration is always handed to components by injection; nothing in
//! this crate installs process-global state except the tracing subscriber.

pub mod config;
pub mod logging;

pub use config::{env_var, optional_env_var, EnvError};
pub use logging::{parse_log_level, setup_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
