//! Recorded run data: a Run owns Tests, a Test owns Steps

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a test or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    Running,
    Success,
    Failure,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "Running",
            Status::Success => "Success",
            Status::Failure => "Failure",
        }
    }

    /// Success and Failure are final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smallest recorded unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
    /// Set only for failed steps whose screenshot was captured
    pub screenshot: Option<PathBuf>,
}

impl Step {
    pub(crate) fn started(name: String) -> Self {
        Self {
            name,
            status: Status::Running,
            message: String::new(),
            error: None,
            timestamp: Local::now(),
            screenshot: None,
        }
    }
}

/// A named unit of work made of ordered steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub duration: Option<Duration>,
    pub steps: Vec<Step>,
}

impl Test {
    pub(crate) fn started(name: String) -> Self {
        Self {
            name,
            status: Status::Running,
            message: String::new(),
            started_at: Local::now(),
            ended_at: None,
            duration: None,
            steps: Vec::new(),
        }
    }

    /// Number of steps with the given status
    pub fn count(&self, status: Status) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// One reporting session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub title: String,
    pub started_at: DateTime<Local>,
    /// Browser engine the run was executed against, if any
    pub engine: Option<String>,
    pub tests: Vec<Test>,
}

impl Run {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            started_at: Local::now(),
            engine: None,
            tests: Vec::new(),
        }
    }

    /// All steps of all tests, in recording order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.tests.iter().flat_map(|t| t.steps.iter())
    }
}
