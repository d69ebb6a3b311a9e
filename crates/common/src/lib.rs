//! uitrace Common Library
//!
//! Shared configuration, error and domain types for the uitrace workspace.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    ArtifactPaths, BrowserConfig, Config, LoginConfig, ReportConfig, ReportFormatKind,
    RetentionConfig,
};
pub use error::{Error, Result};
pub use types::*;

/// uitrace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path, relative to the working directory
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("config").join("config.json")
}
