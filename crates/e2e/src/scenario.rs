//! Login scenarios
//!
//! A scenario is one recorded Test made of ordered steps. The first failing
//! step captures a full-page screenshot and ends the test.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};
use uitrace_common::{BrowserKind, LoginConfig, ScenarioKind};

use crate::error::E2eResult;
use crate::login::LoginPage;
use crate::page::Page;
use crate::recorder::Recorder;

/// What a scenario runs against
pub struct ScenarioContext<'a> {
    pub page: &'a dyn Page,
    pub login: &'a LoginConfig,
    pub screenshot_dir: &'a Path,
    pub engine: BrowserKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Navigate,
    Login,
    LoginInvalid,
    VerifySuccess,
    VerifyRejected,
    Logout,
    VerifyLoggedOut,
}

#[derive(Debug, Clone, Copy)]
struct ScenarioStep {
    /// Used in the failure screenshot name
    slug: &'static str,
    name: &'static str,
    success: &'static str,
    failure: &'static str,
    action: Action,
}

const NAVIGATE: ScenarioStep = ScenarioStep {
    slug: "navigate",
    name: "Navigate to login page",
    success: "Opened the login page",
    failure: "Could not open the login page",
    action: Action::Navigate,
};

const LOGIN: ScenarioStep = ScenarioStep {
    slug: "login",
    name: "Submit credentials",
    success: "Submitted the login form",
    failure: "Could not submit the login form",
    action: Action::Login,
};

const LOGIN_INVALID: ScenarioStep = ScenarioStep {
    slug: "login",
    name: "Submit invalid credentials",
    success: "Submitted the login form with a wrong password",
    failure: "Could not submit the login form",
    action: Action::LoginInvalid,
};

const VERIFY_SUCCESS: ScenarioStep = ScenarioStep {
    slug: "verify",
    name: "Verify login succeeded",
    success: "Logged in",
    failure: "Login was not confirmed",
    action: Action::VerifySuccess,
};

const VERIFY_REJECTED: ScenarioStep = ScenarioStep {
    slug: "verify",
    name: "Verify login was rejected",
    success: "Login was rejected",
    failure: "Rejected login was not reported",
    action: Action::VerifyRejected,
};

const LOGOUT: ScenarioStep = ScenarioStep {
    slug: "logout",
    name: "Log out",
    success: "Clicked the logout link",
    failure: "Could not log out",
    action: Action::Logout,
};

const VERIFY_LOGGED_OUT: ScenarioStep = ScenarioStep {
    slug: "verify_logout",
    name: "Verify back on login form",
    success: "Back on the login form",
    failure: "Still logged in",
    action: Action::VerifyLoggedOut,
};

fn steps(kind: ScenarioKind) -> &'static [ScenarioStep] {
    match kind {
        ScenarioKind::Login => &[NAVIGATE, LOGIN, VERIFY_SUCCESS],
        ScenarioKind::InvalidLogin => &[NAVIGATE, LOGIN_INVALID, VERIFY_REJECTED],
        ScenarioKind::LoginLogout => &[
            NAVIGATE,
            LOGIN,
            VERIFY_SUCCESS,
            LOGOUT,
            VERIFY_LOGGED_OUT,
        ],
    }
}

/// Step names of a scenario, in order
pub fn step_names(kind: ScenarioKind) -> Vec<&'static str> {
    steps(kind).iter().map(|s| s.name).collect()
}

/// Where the failure screenshot of a step goes
pub fn failure_screenshot_path(
    dir: &Path,
    engine: BrowserKind,
    kind: ScenarioKind,
    slug: &str,
) -> PathBuf {
    dir.join(format!("{}_{}_{}_failure.png", engine, kind.as_str(), slug))
}

/// Run one scenario as a recorded test. Returns whether it passed.
///
/// Page failures end up in the recorder; an `Err` only comes from a strict
/// recorder rejecting a call.
pub async fn run_scenario(
    kind: ScenarioKind,
    ctx: &ScenarioContext<'_>,
    recorder: &mut Recorder,
) -> E2eResult<bool> {
    let start = Instant::now();
    let login = LoginPage::new(ctx.page, ctx.login.url.as_str());
    recorder.start_test(kind.title());

    let mut passed = true;
    for step in steps(kind) {
        recorder.start_step(step.name)?;
        match perform(step.action, &login, ctx.login).await {
            Ok(()) => recorder.end_step_success(step.success)?,
            Err(e) => {
                warn!("[{}] {}: {}", ctx.engine, step.name, e);
                let screenshot = capture_failure(ctx, kind, step.slug).await;
                recorder.end_step_failure(step.failure, Some(e.to_string()), screenshot)?;
                passed = false;
                break;
            }
        }
    }

    let duration = start.elapsed();
    if passed {
        info!("✓ [{}] {} ({} ms)", ctx.engine, kind.title(), duration.as_millis());
        recorder.end_test_success(format!("{} passed", kind.title()), duration)?;
    } else {
        info!("✗ [{}] {} ({} ms)", ctx.engine, kind.title(), duration.as_millis());
        recorder.end_test_failure(format!("{} failed", kind.title()), duration)?;
    }
    Ok(passed)
}

async fn perform(action: Action, login: &LoginPage<'_>, creds: &LoginConfig) -> E2eResult<()> {
    match action {
        Action::Navigate => login.navigate().await,
        Action::Login => login.login(&creds.username, &creds.password).await,
        Action::LoginInvalid => login.login(&creds.username, &creds.invalid_password).await,
        Action::VerifySuccess => login.verify_login_success().await,
        Action::VerifyRejected => login.verify_login_failed().await,
        Action::Logout => login.logout().await,
        Action::VerifyLoggedOut => login.verify_logged_out().await,
    }
}

async fn capture_failure(ctx: &ScenarioContext<'_>, kind: ScenarioKind, slug: &str) -> Option<PathBuf> {
    let path = failure_screenshot_path(ctx.screenshot_dir, ctx.engine, kind, slug);
    match ctx.page.screenshot(&path, true).await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("Failed to capture {}: {}", path.display(), e);
            None
        }
    }
}
