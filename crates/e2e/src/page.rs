//! Browser page abstraction
//!
//! Scenarios talk to a [`Page`]; the Playwright bridge is one implementation,
//! tests supply scripted fakes.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uitrace_common::BrowserKind;

use crate::error::E2eResult;

/// Load state to wait for after navigation or a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    /// Name understood by Playwright
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single browser page
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()>;

    /// Wait until an element matching `selector` is visible
    async fn wait_for_locator(&self, selector: &str, timeout: Duration) -> E2eResult<()>;

    async fn is_visible(&self, selector: &str) -> E2eResult<bool>;

    /// Capture the page into a PNG file
    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()>;

    /// Capture only the first element matching `selector`
    async fn element_screenshot(&self, selector: &str, path: &Path) -> E2eResult<()>;

    /// Close the page and release the browser behind it
    async fn close(&self) -> E2eResult<()>;
}

/// Opens pages for an engine
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn launch(&self, browser: BrowserKind) -> E2eResult<Box<dyn Page>>;
}
