//! Run Command

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use tracing::debug;
use uitrace_common::{BrowserKind, Config, ReportFormatKind, ScenarioKind};
use uitrace_e2e::playwright::{PlaywrightConfig, PlaywrightLauncher};
use uitrace_e2e::runner::EngineOutcome;
use uitrace_e2e::{RunnerConfig, TestRunner};

use crate::output::{
    print_error, print_info, print_list, print_success, print_warning, status_cell, OutputFormat,
    TableDisplay,
};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Browser engine to run against; repeat for several (chromium, firefox, webkit)
    #[arg(short, long = "engine", value_name = "ENGINE")]
    pub engines: Vec<BrowserKind>,

    /// Scenario to run; repeat for several (login, invalid_login, login_logout)
    #[arg(short, long = "scenario", value_name = "SCENARIO")]
    pub scenarios: Vec<ScenarioKind>,

    /// Run without a visible browser window
    #[arg(long)]
    pub headless: bool,

    /// Report format (html or json)
    #[arg(long)]
    pub format: Option<ReportFormatKind>,

    /// Inline failure screenshots into the report
    #[arg(long)]
    pub embed_screenshots: bool,

    /// Fail on recorder misuse instead of ignoring it
    #[arg(long)]
    pub strict: bool,

    /// Skip deleting old reports, screenshots and videos
    #[arg(long)]
    pub no_cleanup: bool,

    /// Do not record videos
    #[arg(long)]
    pub no_video: bool,
}

impl RunArgs {
    /// Apply command line overrides on top of the file configuration
    pub fn apply(&self, config: &mut Config) {
        if !self.engines.is_empty() {
            config.browser.engines = self.engines.clone();
        }
        if !self.scenarios.is_empty() {
            config.scenarios = self.scenarios.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if self.embed_screenshots {
            config.report.embed_screenshots = true;
        }
        if self.strict {
            config.report.strict = true;
        }
        if self.no_cleanup {
            config.retention.enabled = false;
        }
        if self.no_video {
            config.browser.record_video = false;
        }
    }
}

/// One summary row per engine
#[derive(Serialize)]
pub struct EngineRow {
    pub engine: String,
    pub passed: bool,
    pub tests: usize,
    pub steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub pass_rate: f64,
    pub report: String,
}

impl From<&EngineOutcome> for EngineRow {
    fn from(outcome: &EngineOutcome) -> Self {
        Self {
            engine: outcome.engine.to_string(),
            passed: outcome.passed(),
            tests: outcome.summary.total_tests,
            steps: outcome.summary.total_steps,
            passed_steps: outcome.summary.passed_steps,
            failed_steps: outcome.summary.failed_steps,
            pass_rate: outcome.summary.pass_rate(),
            report: outcome.report_path.display().to_string(),
        }
    }
}

impl TableDisplay for EngineRow {
    fn headers() -> Vec<&'static str> {
        vec!["Engine", "Result", "Tests", "Steps", "Passed", "Failed", "Pass rate", "Report"]
    }

    fn row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.engine),
            status_cell(self.passed, if self.passed { "PASS" } else { "FAIL" }),
            Cell::new(self.tests),
            Cell::new(self.steps),
            Cell::new(self.passed_steps),
            Cell::new(self.failed_steps),
            Cell::new(format!("{:.1}%", self.pass_rate)),
            Cell::new(&self.report),
        ]
    }
}

/// Run the configured scenarios. Returns whether everything passed.
pub async fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> Result<bool> {
    let mut config = Config::load_or_init(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    args.apply(&mut config);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    if PlaywrightLauncher::check_installed().await.is_err() {
        print_warning("Playwright was not found; install it with: npm install playwright && npx playwright install");
    }

    let launcher = PlaywrightLauncher::new(PlaywrightConfig::from_config(&config));
    let runner = TestRunner::new(RunnerConfig::from_config(&config), launcher);
    let outcome = runner.run().await?;

    if let Some(cleanup) = &outcome.cleanup {
        print_info(&format!(
            "Cleanup removed {} old artifact(s), {} left in place",
            cleanup.deleted_count(),
            cleanup.failed_count()
        ));
        for (category, err) in cleanup.errors() {
            print_warning(&format!("Cleanup of {} failed: {}", category, err));
        }
    }

    let rows: Vec<EngineRow> = outcome.engines.iter().map(EngineRow::from).collect();
    print_list(&rows, format);

    if outcome.passed() {
        print_success(&format!(
            "All scenarios passed in {:.1}s",
            outcome.duration.as_secs_f64()
        ));
    } else {
        print_error("Some scenarios failed; see the reports for details");
    }
    Ok(outcome.passed())
}
