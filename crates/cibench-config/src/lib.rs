//! KDL configuration parsing for the CI benchmarker.
//!
//! This crate handles:
//! - System configuration (cibench.kdl)
//! - Environment variable overrides

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    DatabaseConfig, HadesConfig, HttpConfig, JenkinsConfig, RetryConfig, ServerConfig,
    SystemConfig, parse_system_config,
};
