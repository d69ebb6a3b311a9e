//! Run recorder
//!
//! An in-memory state machine that accumulates Tests and their Steps. The
//! "current" test and step are indices into the run's own storage and are
//! looked up on every call, so growing the collections never invalidates
//! them.
//!
//! By default misuse (ending a step that was never started, starting a step
//! with no test) is ignored so the recorder can never abort a run. A strict
//! recorder reports the same misuse as [`RecorderError`].

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tracing::debug;

use crate::model::{Run, Status, Step, Test};

/// Recorder misuse, reported only in strict mode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("no test has been started")]
    NoActiveTest,

    #[error("no step is active")]
    NoActiveStep,

    #[error("test '{0}' has already ended")]
    TestAlreadyEnded(String),

    #[error("step '{0}' has already ended")]
    StepAlreadyEnded(String),
}

/// Records one run
#[derive(Debug, Clone)]
pub struct Recorder {
    run: Run,
    current_test: Option<usize>,
    current_step: Option<usize>,
    strict: bool,
}

impl Recorder {
    /// Start a new run with the given title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            run: Run::new(title),
            current_test: None,
            current_step: None,
            strict: false,
        }
    }

    /// Start a new run that reports misuse as errors
    pub fn strict(title: impl Into<String>) -> Self {
        Self::new(title).with_strict(true)
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Label the run with the engine it is executed against
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.run.engine = Some(engine.into());
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn into_run(self) -> Run {
        self.run
    }

    pub fn current_test(&self) -> Option<&Test> {
        self.current_test.and_then(|i| self.run.tests.get(i))
    }

    pub fn current_step(&self) -> Option<&Step> {
        let test = self.current_test()?;
        self.current_step.and_then(|i| test.steps.get(i))
    }

    /// Append a new running test and make it current
    pub fn start_test(&mut self, name: impl Into<String>) {
        self.run.tests.push(Test::started(name.into()));
        self.current_test = Some(self.run.tests.len() - 1);
        self.current_step = None;
    }

    /// Append a new running step to the current test and make it current
    pub fn start_step(&mut self, name: impl Into<String>) -> Result<(), RecorderError> {
        let strict = self.strict;
        let Some(test) = self.current_test.and_then(|i| self.run.tests.get_mut(i)) else {
            return self.misuse(RecorderError::NoActiveTest);
        };
        if strict && test.status.is_terminal() {
            return Err(RecorderError::TestAlreadyEnded(test.name.clone()));
        }

        test.steps.push(Step::started(name.into()));
        self.current_step = Some(test.steps.len() - 1);
        Ok(())
    }

    /// Mark the current step as successful
    pub fn end_step_success(&mut self, message: impl Into<String>) -> Result<(), RecorderError> {
        if let Some(step) = self.active_step()? {
            step.status = Status::Success;
            step.message = message.into();
        }
        Ok(())
    }

    /// Mark the current step as failed. `screenshot` is `None` when no
    /// screenshot could be captured.
    pub fn end_step_failure(
        &mut self,
        message: impl Into<String>,
        error: Option<String>,
        screenshot: Option<PathBuf>,
    ) -> Result<(), RecorderError> {
        if let Some(step) = self.active_step()? {
            step.status = Status::Failure;
            step.message = message.into();
            step.error = error;
            step.screenshot = screenshot;
        }
        Ok(())
    }

    /// Mark the current test as successful
    pub fn end_test_success(
        &mut self,
        message: impl Into<String>,
        duration: Duration,
    ) -> Result<(), RecorderError> {
        self.finish_test(Status::Success, message.into(), duration)
    }

    /// Mark the current test as failed
    pub fn end_test_failure(
        &mut self,
        message: impl Into<String>,
        duration: Duration,
    ) -> Result<(), RecorderError> {
        self.finish_test(Status::Failure, message.into(), duration)
    }

    // The current test is deliberately kept after it ends; only a strict
    // recorder refuses further steps on it.
    fn finish_test(
        &mut self,
        status: Status,
        message: String,
        duration: Duration,
    ) -> Result<(), RecorderError> {
        let strict = self.strict;
        let Some(test) = self.current_test.and_then(|i| self.run.tests.get_mut(i)) else {
            return self.misuse(RecorderError::NoActiveTest);
        };
        if strict && test.status.is_terminal() {
            return Err(RecorderError::TestAlreadyEnded(test.name.clone()));
        }

        test.status = status;
        test.message = message;
        test.ended_at = Some(Local::now());
        test.duration = Some(duration);
        Ok(())
    }

    fn active_step(&mut self) -> Result<Option<&mut Step>, RecorderError> {
        let strict = self.strict;
        let step = match (self.current_test, self.current_step) {
            (Some(t), Some(s)) => self.run.tests.get_mut(t).and_then(|t| t.steps.get_mut(s)),
            _ => None,
        };

        match step {
            Some(step) if strict && step.status.is_terminal() => {
                Err(RecorderError::StepAlreadyEnded(step.name.clone()))
            }
            Some(step) => Ok(Some(step)),
            None if strict => Err(RecorderError::NoActiveStep),
            None => {
                debug!("Ignoring step update: no active step");
                Ok(None)
            }
        }
    }

    fn misuse(&self, err: RecorderError) -> Result<(), RecorderError> {
        if self.strict {
            Err(err)
        } else {
            debug!("Ignoring recorder call: {}", err);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_empty() {
        let recorder = Recorder::new("Login test");
        assert_eq!(recorder.run().title, "Login test");
        assert!(recorder.run().tests.is_empty());
        assert!(recorder.current_test().is_none());
        assert!(!recorder.is_strict());
    }

    #[test]
    fn test_steps_without_test_are_ignored() {
        let mut recorder = Recorder::new("run");
        for i in 0..5 {
            recorder.start_step(format!("step {}", i)).unwrap();
            recorder.end_step_success("ok").unwrap();
        }
        recorder.end_step_failure("bad", Some("boom".into()), None).unwrap();
        recorder.end_test_success("done", Duration::from_secs(1)).unwrap();

        assert!(recorder.run().tests.is_empty());
    }

    #[test]
    fn test_end_step_without_start_step_is_ignored() {
        let mut recorder = Recorder::new("run");
        recorder.start_test("Login");
        recorder.end_step_success("nothing to end").unwrap();

        let test = recorder.current_test().unwrap();
        assert!(test.steps.is_empty());
        assert_eq!(test.status, Status::Running);
    }

    #[test]
    fn test_step_lifecycle() {
        let mut recorder = Recorder::new("run");
        recorder.start_test("Login");
        recorder.start_step("Navigate").unwrap();
        assert_eq!(recorder.current_step().unwrap().status, Status::Running);

        recorder.end_step_success("navigated").unwrap();
        recorder.start_step("Submit").unwrap();
        recorder
            .end_step_failure("submit failed", Some("timeout".into()), Some(PathBuf::from("submit.png")))
            .unwrap();
        recorder.end_test_failure("login failed", Duration::from_millis(1200)).unwrap();

        let test = &recorder.run().tests[0];
        assert_eq!(test.status, Status::Failure);
        assert_eq!(test.duration, Some(Duration::from_millis(1200)));
        assert!(test.ended_at.is_some());
        assert_eq!(test.steps.len(), 2);
        assert_eq!(test.steps[0].status, Status::Success);
        assert_eq!(test.steps[0].message, "navigated");
        assert_eq!(test.steps[0].screenshot, None);
        assert_eq!(test.steps[1].status, Status::Failure);
        assert_eq!(test.steps[1].error.as_deref(), Some("timeout"));
        assert_eq!(test.steps[1].screenshot, Some(PathBuf::from("submit.png")));
    }

    #[test]
    fn test_current_step_survives_storage_growth() {
        let mut recorder = Recorder::new("run");
        recorder.start_test("first");
        for i in 0..100 {
            recorder.start_test(format!("filler {}", i));
        }
        recorder.start_test("last");
        for i in 0..64 {
            recorder.start_step(format!("step {}", i)).unwrap();
        }
        recorder.end_step_success("final").unwrap();

        let last = recorder.run().tests.last().unwrap();
        assert_eq!(last.steps.len(), 64);
        assert_eq!(last.steps[63].status, Status::Success);
        assert_eq!(last.count(Status::Running), 63);
    }

    #[test]
    fn test_new_test_resets_current_step() {
        let mut recorder = Recorder::new("run");
        recorder.start_test("one");
        recorder.start_step("a").unwrap();
        recorder.start_test("two");
        recorder.end_step_success("should not touch test one").unwrap();

        assert_eq!(recorder.run().tests[0].steps[0].status, Status::Running);
        assert!(recorder.run().tests[1].steps.is_empty());
    }

    #[test]
    fn test_lenient_ended_test_still_accepts_steps() {
        let mut recorder = Recorder::new("run");
        recorder.start_test("Login");
        recorder.end_test_success("done", Duration::from_secs(1)).unwrap();
        recorder.start_step("late").unwrap();

        let test = &recorder.run().tests[0];
        assert_eq!(test.status, Status::Success);
        assert_eq!(test.steps.len(), 1);
    }

    #[test]
    fn test_strict_reports_misuse() {
        let mut recorder = Recorder::strict("run");
        assert_eq!(recorder.start_step("orphan"), Err(RecorderError::NoActiveTest));
        assert_eq!(
            recorder.end_test_success("x", Duration::ZERO),
            Err(RecorderError::NoActiveTest)
        );

        recorder.start_test("Login");
        assert_eq!(recorder.end_step_success("x"), Err(RecorderError::NoActiveStep));

        recorder.start_step("Navigate").unwrap();
        recorder.end_step_success("ok").unwrap();
        assert_eq!(
            recorder.end_step_success("again"),
            Err(RecorderError::StepAlreadyEnded("Navigate".into()))
        );

        recorder.end_test_success("done", Duration::ZERO).unwrap();
        assert_eq!(
            recorder.start_step("late"),
            Err(RecorderError::TestAlreadyEnded("Login".into()))
        );
        assert_eq!(
            recorder.end_test_failure("again", Duration::ZERO),
            Err(RecorderError::TestAlreadyEnded("Login".into()))
        );
        assert_eq!(recorder.run().tests[0].steps.len(), 1);
    }

    #[test]
    fn test_engine_label() {
        let recorder = Recorder::new("run").with_engine("firefox");
        assert_eq!(recorder.run().engine.as_deref(), Some("firefox"));
    }
}
