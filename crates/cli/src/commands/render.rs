//! Render Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use uitrace_common::ReportFormatKind;
use uitrace_e2e::{Report, ReportRenderer};

use crate::output::print_success;

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// JSON report written by `uitrace run --format json`
    pub input: PathBuf,

    /// Output directory (defaults to the directory of the input)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "html")]
    pub format: ReportFormatKind,

    /// Inline failure screenshots into the document
    #[arg(long)]
    pub embed_screenshots: bool,
}

/// Re-render a JSON report
pub fn execute(args: RenderArgs) -> Result<PathBuf> {
    let data = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let mut report: Report = serde_json::from_slice(&data)
        .with_context(|| format!("{} is not a uitrace JSON report", args.input.display()))?;
    report.recompute_summary();

    let out_dir = args.out_dir.unwrap_or_else(|| {
        args.input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let path = ReportRenderer::for_kind(out_dir, args.format)
        .embed_screenshots(args.embed_screenshots)
        .write(report)?;
    print_success(&format!("Report written to {}", path.display()));
    Ok(path)
}
