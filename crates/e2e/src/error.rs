//! Error types for the e2e engine

use std::path::PathBuf;
use thiserror::Error;

use crate::recorder::RecorderError;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser launch failed for {browser}: {reason}")]
    Launch { browser: String, reason: String },

    #[error("Page action '{action}' failed: {reason}")]
    PageAction { action: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Recorder misuse: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Cannot prepare artifact directory {path}: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] uitrace_common::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl E2eError {
    /// Build a page action failure
    pub fn page_action(action: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        E2eError::PageAction {
            action: action.into(),
            reason: reason.to_string(),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
