//! Cleanup Command

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use uitrace_common::Config;
use uitrace_e2e::retention::{cleanup_async, CategoryOutcome};
use uitrace_e2e::{RetentionManager, RetentionPolicy, RetryStrategy};

use crate::output::{print_list, print_success, print_warning, status_cell, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct CleanupArgs {
    /// Retry busy files after the others and wait on deferred ones without blocking
    #[arg(long)]
    pub requeue: bool,
}

#[derive(Serialize)]
pub struct CategoryRow {
    pub directory: String,
    pub extension: String,
    pub keep: usize,
    pub matched: usize,
    pub deleted: usize,
    pub failed: usize,
    pub error: Option<String>,
}

impl From<&CategoryOutcome> for CategoryRow {
    fn from(outcome: &CategoryOutcome) -> Self {
        let category = &outcome.category;
        let mut row = Self {
            directory: category.directory.display().to_string(),
            extension: category.extension.clone(),
            keep: category.keep,
            matched: 0,
            deleted: 0,
            failed: 0,
            error: None,
        };
        match &outcome.result {
            Ok(report) => {
                row.matched = report.matched;
                row.deleted = report.deleted.len();
                row.failed = report.failed.len();
            }
            Err(e) => row.error = Some(e.to_string()),
        }
        row
    }
}

impl TableDisplay for CategoryRow {
    fn headers() -> Vec<&'static str> {
        vec!["Directory", "Extension", "Keep", "Found", "Deleted", "Left", "Status"]
    }

    fn row(&self) -> Vec<Cell> {
        let status = match &self.error {
            Some(e) => status_cell(false, e),
            None if self.failed > 0 => status_cell(false, "partial"),
            None => status_cell(true, "ok"),
        };
        vec![
            Cell::new(&self.directory),
            Cell::new(&self.extension),
            Cell::new(self.keep),
            Cell::new(self.matched),
            Cell::new(self.deleted),
            Cell::new(self.failed),
            status,
        ]
    }
}

/// Apply the configured retention categories
pub async fn execute(args: CleanupArgs, config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = Config::load_or_init(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let mut policy = RetentionPolicy::from(&config.retention);
    if args.requeue {
        policy.strategy = RetryStrategy::Requeue;
    }
    let categories = config.retention_categories();

    let report = cleanup_async(Arc::new(RetentionManager::new(policy)), categories).await?;

    let rows: Vec<CategoryRow> = report.categories.iter().map(CategoryRow::from).collect();
    print_list(&rows, format);

    for failed in report.reports().flat_map(|r| r.failed.iter()) {
        print_warning(&format!("{} is still in use: {}", failed.path.display(), failed.error));
    }
    print_success(&format!("Removed {} old artifact(s)", report.deleted_count()));
    Ok(())
}
