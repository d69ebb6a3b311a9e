//! Run configuration
//!
//! The configuration file may be JSON, TOML or YAML; the format is picked
//! from the file extension. Every section falls back to its defaults, so a
//! partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{BrowserKind, RetentionCategory, ScenarioKind};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scenarios to run for every engine, in order
    pub scenarios: Vec<ScenarioKind>,

    /// Browser launch configuration
    pub browser: BrowserConfig,

    /// Login scenario configuration
    pub login: LoginConfig,

    /// Artifact output directories
    pub artifacts: ArtifactPaths,

    /// Report rendering configuration
    pub report: ReportConfig,

    /// Artifact retention configuration
    pub retention: RetentionConfig,
}

/// Browser launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Engines to run against, one after another
    pub engines: Vec<BrowserKind>,

    /// Run without a visible window
    pub headless: bool,

    /// Delay inserted by Playwright between operations
    #[serde(alias = "slowMo")]
    pub slow_mo_ms: u64,

    /// Use a full HD viewport instead of the default one
    pub maximized: bool,

    /// Record a video of every page into the videos directory
    pub record_video: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engines: vec![BrowserKind::Chromium],
            headless: false,
            slow_mo_ms: 0,
            maximized: true,
            record_video: true,
        }
    }
}

impl BrowserConfig {
    /// Viewport size as (width, height)
    pub fn viewport(&self) -> (u32, u32) {
        if self.maximized {
            (1920, 1080)
        } else {
            (1280, 720)
        }
    }
}

/// Login scenario configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub url: String,
    pub username: String,
    pub password: String,

    /// Password used by the invalid-login scenario
    pub invalid_password: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: "http://the-internet.herokuapp.com/login".to_string(),
            username: "tomsmith".to_string(),
            password: "SuperSecretPassword!".to_string(),
            invalid_password: "not-the-password".to_string(),
        }
    }
}

/// Artifact output directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub reports_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub videos_dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("./reports"),
            screenshots_dir: PathBuf::from("./screenshots"),
            videos_dir: PathBuf::from("./videos"),
        }
    }
}

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormatKind {
    #[default]
    Html,
    Json,
}

impl ReportFormatKind {
    /// File extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormatKind::Html => ".html",
            ReportFormatKind::Json => ".json",
        }
    }
}

impl std::str::FromStr for ReportFormatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormatKind::Html),
            "json" => Ok(ReportFormatKind::Json),
            other => Err(Error::UnknownVariant {
                kind: "report format",
                value: other.to_string(),
            }),
        }
    }
}

/// Report rendering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    pub format: ReportFormatKind,

    /// Inline failure screenshots as data URIs instead of linking them
    pub embed_screenshots: bool,

    /// Turn recorder misuse into errors instead of ignoring it
    pub strict: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Login test".to_string(),
            format: ReportFormatKind::Html,
            embed_screenshots: false,
            strict: false,
        }
    }
}

/// Artifact retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Run cleanup before the first engine starts
    pub enabled: bool,

    /// Attempts per file before giving up on it
    pub max_attempts: u32,

    /// Pause between attempts on a locked file
    pub retry_interval_ms: u64,

    /// Explicit categories; derived from the artifact directories when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<RetentionCategory>>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            retry_interval_ms: 2000,
            categories: None,
        }
    }
}

impl Config {
    /// Load configuration from a file, choosing the format by extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, writing the defaults first if the file is missing
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        if self.browser.engines.is_empty() {
            return Err(Error::InvalidConfig("browser.engines must not be empty".to_string()));
        }
        if self.retention.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retention.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.login.url.trim().is_empty() {
            return Err(Error::InvalidConfig("login.url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Scenarios to run; the login scenario when none are configured
    pub fn scenarios(&self) -> Vec<ScenarioKind> {
        if self.scenarios.is_empty() {
            vec![ScenarioKind::Login]
        } else {
            self.scenarios.clone()
        }
    }

    /// Retention categories, derived from the artifact directories unless
    /// set explicitly
    pub fn retention_categories(&self) -> Vec<RetentionCategory> {
        if let Some(categories) = &self.retention.categories {
            return categories.clone();
        }
        vec![
            RetentionCategory::new(&self.artifacts.reports_dir, self.report.format.extension(), 1),
            RetentionCategory::new(&self.artifacts.screenshots_dir, ".png", 3),
            RetentionCategory::new(&self.artifacts.videos_dir, ".webm", 1),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}
