//! uitrace E2E engine
//!
//! This crate records UI test runs and turns them into reports:
//! - Records Tests and Steps of a run with a lenient (or strict) recorder
//! - Renders a self-contained HTML or JSON report per run
//! - Keeps only the newest reports, screenshots and videos
//! - Drives a browser through Playwright via a Node bridge process
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TestRunner                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  cleanup()            -> RetentionManager (blocking thread) │
//! │  for each engine:                                           │
//! │    PageLauncher::launch(engine) -> Box<dyn Page>            │
//! │    run_scenario(kind, page, &mut Recorder)                  │
//! │      └── LoginPage: navigate / login / verify / logout      │
//! │    ReportRenderer::render(&Run) -> report-<ts>.<ext>        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Run ─┬─ Test ─┬─ Step                                      │
//! │       │        └─ Step (screenshot on failure)              │
//! │       └─ Test ...                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod login;
pub mod model;
pub mod page;
pub mod playwright;
pub mod recorder;
pub mod report;
pub mod retention;
pub mod runner;
pub mod scenario;

pub use error::{E2eError, E2eResult};
pub use model::{Run, Status, Step, Test};
pub use page::{LoadState, Page, PageLauncher};
pub use recorder::{Recorder, RecorderError};
pub use report::{Report, ReportFormat, ReportRenderer, Summary};
pub use retention::{
    cleanup_async, CleanupReport, RetentionManager, RetentionPolicy, RetryStrategy,
};
pub use runner::{RunnerConfig, SuiteOutcome, TestRunner};
