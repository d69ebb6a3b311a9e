//! Login form page object

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::page::{LoadState, Page};

pub const USERNAME_INPUT: &str = "#username";
pub const PASSWORD_INPUT: &str = "#password";
pub const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
pub const SUCCESS_FLASH: &str = ".flash.success";
pub const ERROR_FLASH: &str = ".flash.error";
pub const LOGOUT_LINK: &str = r#"a[href="/logout"]"#;
pub const FLASH_MESSAGE: &str = "#flash";

/// How long a flash message may take to appear
pub const FLASH_TIMEOUT: Duration = Duration::from_millis(5000);

/// The login form at a configurable URL
pub struct LoginPage<'a> {
    page: &'a dyn Page,
    url: String,
}

impl<'a> LoginPage<'a> {
    pub fn new(page: &'a dyn Page, url: impl Into<String>) -> Self {
        Self {
            page,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the login form and wait for the network to settle
    pub async fn navigate(&self) -> E2eResult<()> {
        debug!("Opening {}", self.url);
        self.page.navigate(&self.url).await?;
        self.page.wait_for_load_state(LoadState::NetworkIdle).await
    }

    /// Submit the form with the given credentials
    pub async fn login(&self, username: &str, password: &str) -> E2eResult<()> {
        self.page.fill(USERNAME_INPUT, username).await?;
        self.page.fill(PASSWORD_INPUT, password).await?;
        self.page.click(SUBMIT_BUTTON).await?;
        self.page.wait_for_load_state(LoadState::NetworkIdle).await
    }

    /// The success flash appears and the logout link is visible
    pub async fn verify_login_success(&self) -> E2eResult<()> {
        self.page.wait_for_locator(SUCCESS_FLASH, FLASH_TIMEOUT).await?;
        if !self.page.is_visible(LOGOUT_LINK).await? {
            return Err(E2eError::AssertionFailed(
                "logout link is not visible after login".to_string(),
            ));
        }
        Ok(())
    }

    /// The error flash appears and the form is still there
    pub async fn verify_login_failed(&self) -> E2eResult<()> {
        self.page.wait_for_locator(ERROR_FLASH, FLASH_TIMEOUT).await?;
        if !self.page.is_visible(SUBMIT_BUTTON).await? {
            return Err(E2eError::AssertionFailed(
                "login button is not visible after a rejected login".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the current flash message as an image
    pub async fn capture_flash(&self, path: &Path) -> E2eResult<()> {
        self.page.wait_for_locator(FLASH_MESSAGE, FLASH_TIMEOUT).await?;
        self.page.element_screenshot(FLASH_MESSAGE, path).await
    }

    pub async fn logout(&self) -> E2eResult<()> {
        self.page.click(LOGOUT_LINK).await?;
        self.page.wait_for_load_state(LoadState::NetworkIdle).await
    }

    /// Back on the form with no logout link
    pub async fn verify_logged_out(&self) -> E2eResult<()> {
        self.page.wait_for_locator(SUBMIT_BUTTON, FLASH_TIMEOUT).await?;
        if self.page.is_visible(LOGOUT_LINK).await? {
            return Err(E2eError::AssertionFailed(
                "logout link is still visible after logging out".to_string(),
            ));
        }
        Ok(())
    }
}
