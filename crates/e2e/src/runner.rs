//! Suite runner: retention, then every engine in turn, one report each

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};
use uitrace_common::{
    BrowserKind, Config, LoginConfig, ReportFormatKind, RetentionCategory, ScenarioKind,
};

use crate::error::E2eResult;
use crate::page::PageLauncher;
use crate::recorder::Recorder;
use crate::report::{ReportRenderer, Summary};
use crate::retention::{cleanup_async, CleanupReport, RetentionManager, RetentionPolicy};
use crate::scenario::{run_scenario, ScenarioContext};

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub title: String,
    pub engines: Vec<BrowserKind>,
    pub scenarios: Vec<ScenarioKind>,
    pub login: LoginConfig,
    pub reports_dir: PathBuf,
    pub screenshots_dir: PathBuf,
    pub report_format: ReportFormatKind,
    pub embed_screenshots: bool,
    pub strict: bool,

    /// Apply retention before the first engine starts
    pub cleanup: bool,
    pub retention_policy: RetentionPolicy,
    pub retention_categories: Vec<RetentionCategory>,
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.report.title.clone(),
            engines: config.browser.engines.clone(),
            scenarios: config.scenarios(),
            login: config.login.clone(),
            reports_dir: config.artifacts.reports_dir.clone(),
            screenshots_dir: config.artifacts.screenshots_dir.clone(),
            report_format: config.report.format,
            embed_screenshots: config.report.embed_screenshots,
            strict: config.report.strict,
            cleanup: config.retention.enabled,
            retention_policy: RetentionPolicy::from(&config.retention),
            retention_categories: config.retention_categories(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of one engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineOutcome {
    pub engine: BrowserKind,
    pub report_path: PathBuf,
    pub summary: Summary,
    /// The browser could not be started
    pub launch_failed: bool,
}

impl EngineOutcome {
    pub fn passed(&self) -> bool {
        !self.launch_failed && !self.summary.has_failures() && self.summary.running_steps == 0
    }
}

/// Result of a whole run
#[derive(Debug)]
pub struct SuiteOutcome {
    pub engines: Vec<EngineOutcome>,
    /// `None` when cleanup was disabled or could not run
    pub cleanup: Option<CleanupReport>,
    pub duration: Duration,
}

impl SuiteOutcome {
    pub fn passed(&self) -> bool {
        self.engines.iter().all(EngineOutcome::passed)
    }

    pub fn report_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.engines.iter().map(|e| &e.report_path)
    }
}

/// Main test runner
pub struct TestRunner<L> {
    config: RunnerConfig,
    launcher: L,
}

impl<L: PageLauncher> TestRunner<L> {
    pub fn new(config: RunnerConfig, launcher: L) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every scenario on every engine
    pub async fn run(&self) -> E2eResult<SuiteOutcome> {
        let start = Instant::now();

        let cleanup = if self.config.cleanup {
            match self.cleanup().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Artifact cleanup did not run: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Running {} scenario(s) on {} engine(s)...",
            self.config.scenarios.len(),
            self.config.engines.len()
        );

        let mut engines = Vec::with_capacity(self.config.engines.len());
        for &engine in &self.config.engines {
            engines.push(self.run_engine(engine).await?);
        }

        let duration = start.elapsed();
        let passed = engines.iter().filter(|e| e.passed()).count();
        info!(
            "Test Results: {} engine(s) passed, {} failed ({} ms)",
            passed,
            engines.len() - passed,
            duration.as_millis()
        );

        Ok(SuiteOutcome {
            engines,
            cleanup,
            duration,
        })
    }

    /// Apply retention off the async workers
    pub async fn cleanup(&self) -> E2eResult<CleanupReport> {
        let manager = Arc::new(RetentionManager::new(self.config.retention_policy.clone()));
        cleanup_async(manager, self.config.retention_categories.clone()).await
    }

    /// Run all scenarios on one engine and write its report
    pub async fn run_engine(&self, engine: BrowserKind) -> E2eResult<EngineOutcome> {
        let mut recorder = Recorder::new(format!("{} ({})", self.config.title, engine))
            .with_engine(engine.as_str())
            .with_strict(self.config.strict);

        let mut launch_failed = false;
        let outcome = match self.launcher.launch(engine).await {
            Ok(page) => {
                let ctx = ScenarioContext {
                    page: &*page,
                    login: &self.config.login,
                    screenshot_dir: &self.config.screenshots_dir,
                    engine,
                };

                let mut outcome = Ok(());
                for &kind in &self.config.scenarios {
                    if let Err(e) = run_scenario(kind, &ctx, &mut recorder).await {
                        outcome = Err(e);
                        break;
                    }
                }

                if let Err(e) = page.close().await {
                    warn!("Failed to close {} page: {}", engine, e);
                }
                outcome
            }
            Err(e) => {
                error!("Could not launch {}: {}", engine, e);
                launch_failed = true;
                record_launch_failure(&mut recorder, engine, &e.to_string())
            }
        };

        // The report is written even when the recorder rejected a call
        let run = recorder.into_run();
        let renderer = ReportRenderer::for_kind(&self.config.reports_dir, self.config.report_format)
            .embed_screenshots(self.config.embed_screenshots);
        let report_path = renderer.render(&run)?;
        outcome?;

        Ok(EngineOutcome {
            engine,
            report_path,
            summary: Summary::from_run(&run),
            launch_failed,
        })
    }
}

fn record_launch_failure(recorder: &mut Recorder, engine: BrowserKind, reason: &str) -> E2eResult<()> {
    recorder.start_test(format!("Launch {}", engine));
    recorder.start_step("Launch browser")?;
    recorder.end_step_failure(
        format!("Could not launch {}", engine),
        Some(reason.to_string()),
        None,
    )?;
    recorder.end_test_failure("Browser did not start", Duration::ZERO)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_config_from_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.title, "Login test");
        assert_eq!(config.engines, vec![BrowserKind::Chromium]);
        assert_eq!(config.scenarios, vec![ScenarioKind::Login]);
        assert_eq!(config.retention_categories.len(), 3);
        assert_eq!(config.retention_policy.max_attempts, 3);
        assert!(config.cleanup);
    }

    #[test]
    fn test_engine_outcome_passed() {
        let mut outcome = EngineOutcome {
            engine: BrowserKind::Webkit,
            report_path: PathBuf::from("reports/report.html"),
            summary: Summary {
                total_tests: 1,
                total_steps: 3,
                passed_steps: 3,
                failed_steps: 0,
                running_steps: 0,
            },
            launch_failed: false,
        };
        assert!(outcome.passed());

        outcome.summary.running_steps = 1;
        assert!(!outcome.passed());

        outcome.summary.running_steps = 0;
        outcome.launch_failed = true;
        assert!(!outcome.passed());
    }
}
