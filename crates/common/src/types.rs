//! Core types for uitrace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// Browser engine a run is executed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    /// All supported engines, in the order they are run
    pub const ALL: [BrowserKind; 3] = [BrowserKind::Chromium, BrowserKind::Firefox, BrowserKind::Webkit];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::UnknownVariant {
                kind: "browser",
                value: other.to_string(),
            }),
        }
    }
}

/// A named UI scenario the runner knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Log in with valid credentials and verify the secure area
    Login,
    /// Log in with a wrong password and verify the error banner
    InvalidLogin,
    /// Log in, log out again and verify the login form is back
    LoginLogout,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::Login => "login",
            ScenarioKind::InvalidLogin => "invalid_login",
            ScenarioKind::LoginLogout => "login_logout",
        }
    }

    /// Human-readable test name used in reports
    pub fn title(&self) -> &'static str {
        match self {
            ScenarioKind::Login => "Login",
            ScenarioKind::InvalidLogin => "Login with invalid credentials",
            ScenarioKind::LoginLogout => "Login and logout",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "login" => Ok(ScenarioKind::Login),
            "invalid_login" => Ok(ScenarioKind::InvalidLogin),
            "login_logout" => Ok(ScenarioKind::LoginLogout),
            other => Err(Error::UnknownVariant {
                kind: "scenario",
                value: other.to_string(),
            }),
        }
    }
}

/// One retention rule: keep the `keep` newest files in `directory` whose
/// name ends with `extension`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionCategory {
    pub directory: PathBuf,
    pub extension: String,
    pub keep: usize,
}

impl RetentionCategory {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>, keep: usize) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
            keep,
        }
    }

    /// Case-insensitive suffix match against a file name
    pub fn matches(&self, file_name: &str) -> bool {
        file_name
            .to_lowercase()
            .ends_with(&self.extension.to_lowercase())
    }
}

impl fmt::Display for RetentionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (*{}, keep {})",
            self.directory.display(),
            self.extension,
            self.keep
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("chromium", BrowserKind::Chromium)]
    #[test_case("Firefox", BrowserKind::Firefox)]
    #[test_case(" webkit ", BrowserKind::Webkit)]
    #[test_case("chrome", BrowserKind::Chromium)]
    fn test_parse_browser(input: &str, expected: BrowserKind) {
        assert_eq!(input.parse::<BrowserKind>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_browser() {
        let err = "netscape".parse::<BrowserKind>().unwrap_err();
        assert!(err.to_string().contains("netscape"));
    }

    #[test]
    fn test_scenario_roundtrip_names() {
        for kind in [ScenarioKind::Login, ScenarioKind::InvalidLogin, ScenarioKind::LoginLogout] {
            assert_eq!(kind.as_str().parse::<ScenarioKind>().unwrap(), kind);
        }
        assert_eq!("login-logout".parse::<ScenarioKind>().unwrap(), ScenarioKind::LoginLogout);
    }

    #[test_case("report-20240101-101010.html", true)]
    #[test_case("REPORT.HTML", true)]
    #[test_case("report.htm", false)]
    #[test_case("notes.txt", false)]
    #[test_case("archive.html.bak", false)]
    fn test_category_matches(name: &str, expected: bool) {
        let category = RetentionCategory::new("reports", ".html", 1);
        assert_eq!(category.matches(name), expected);
    }

    #[test]
    fn test_category_matches_uppercase_extension() {
        let category = RetentionCategory::new("shots", ".PNG", 3);
        assert!(category.matches("login_failure.png"));
    }
}
