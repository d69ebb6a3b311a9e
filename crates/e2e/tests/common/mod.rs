//! In-memory page double for scenario and runner tests
//!
//! `FakePage` imitates the login form: submitting the valid password logs in,
//! anything else shows the error flash, and the logout link logs out again.
//! Individual calls can be forced to fail with `fail_on`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uitrace_common::BrowserKind;
use uitrace_e2e::login::{
    ERROR_FLASH, FLASH_MESSAGE, LOGOUT_LINK, PASSWORD_INPUT, SUBMIT_BUTTON, SUCCESS_FLASH,
};
use uitrace_e2e::{E2eError, E2eResult, LoadState, Page, PageLauncher};

/// Minimal PNG signature; enough for digests and embedding
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Debug, Default)]
struct FormState {
    password: String,
    logged_in: bool,
    rejected: bool,
}

#[derive(Clone)]
pub struct FakePage {
    valid_password: String,
    failures: Arc<HashMap<String, String>>,
    screenshot_fails: bool,
    state: Arc<Mutex<FormState>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakePage {
    pub fn new(valid_password: &str) -> Self {
        Self {
            valid_password: valid_password.to_string(),
            failures: Arc::new(HashMap::new()),
            screenshot_fails: false,
            state: Arc::new(Mutex::new(FormState::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the call recorded as `call` (e.g. `"navigate"`,
    /// `"wait_for_locator:.flash.success"`) fail with `reason`
    pub fn fail_on(mut self, call: &str, reason: &str) -> Self {
        Arc::make_mut(&mut self.failures).insert(call.to_string(), reason.to_string());
        self
    }

    pub fn without_screenshots(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, action: &str, arg: &str) -> E2eResult<()> {
        let call = if arg.is_empty() {
            action.to_string()
        } else {
            format!("{}:{}", action, arg)
        };
        self.calls.lock().unwrap().push(call.clone());

        for key in [call.as_str(), action] {
            if let Some(reason) = self.failures.get(key) {
                return Err(E2eError::page_action(action, reason));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.record("navigate", url)
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.record("fill", selector)?;
        if selector == PASSWORD_INPUT {
            self.state.lock().unwrap().password = value.to_string();
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.record("click", selector)?;
        let mut state = self.state.lock().unwrap();
        if selector == SUBMIT_BUTTON {
            state.logged_in = state.password == self.valid_password;
            state.rejected = !state.logged_in;
        } else if selector == LOGOUT_LINK {
            state.logged_in = false;
            state.rejected = false;
        }
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.record("wait_for_load_state", state.as_str())
    }

    async fn wait_for_locator(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.record("wait_for_locator", selector)?;
        let state = self.state.lock().unwrap();
        let present = match selector {
            SUCCESS_FLASH => state.logged_in,
            ERROR_FLASH => state.rejected,
            FLASH_MESSAGE => state.logged_in || state.rejected,
            SUBMIT_BUTTON => !state.logged_in,
            _ => false,
        };
        if present {
            Ok(())
        } else {
            Err(E2eError::page_action(
                "wait for selector",
                format!("Timeout {}ms exceeded waiting for {}", timeout.as_millis(), selector),
            ))
        }
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        self.record("is_visible", selector)?;
        let state = self.state.lock().unwrap();
        Ok(match selector {
            LOGOUT_LINK => state.logged_in,
            SUBMIT_BUTTON => !state.logged_in,
            _ => false,
        })
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> E2eResult<()> {
        self.record("screenshot", &path.display().to_string())?;
        if self.screenshot_fails {
            return Err(E2eError::page_action("screenshot", "target closed"));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, PNG_BYTES)?;
        Ok(())
    }

    async fn element_screenshot(&self, selector: &str, path: &Path) -> E2eResult<()> {
        self.record("element_screenshot", selector)?;
        if self.screenshot_fails {
            return Err(E2eError::page_action("element screenshot", "target closed"));
        }
        std::fs::write(path, PNG_BYTES)?;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        self.record("close", "")
    }
}

/// Hands out clones of a template page; selected engines fail to launch
pub struct FakeLauncher {
    template: FakePage,
    broken: HashSet<BrowserKind>,
    launched: Mutex<Vec<BrowserKind>>,
}

impl FakeLauncher {
    pub fn new(template: FakePage) -> Self {
        Self {
            template,
            broken: HashSet::new(),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn broken(mut self, engine: BrowserKind) -> Self {
        self.broken.insert(engine);
        self
    }

    pub fn launched(&self) -> Vec<BrowserKind> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageLauncher for FakeLauncher {
    async fn launch(&self, browser: BrowserKind) -> E2eResult<Box<dyn Page>> {
        self.launched.lock().unwrap().push(browser);
        if self.broken.contains(&browser) {
            return Err(E2eError::Launch {
                browser: browser.to_string(),
                reason: "executable doesn't exist".to_string(),
            });
        }

        // Fresh form state per launch, shared call log
        let page = FakePage {
            state: Arc::new(Mutex::new(FormState::default())),
            ..self.template.clone()
        };
        Ok(Box::new(page))
    }
}
