pub mod config;
pub mod error;

pub use config::{CatalogConfig, EmptyScanPolicy, LoggingConfig, SkillsConfig, WatchConfig};
pub use error::ConfigError;
