//! Report rendering
//!
//! Rendering is split in two: [`Report::from_run`] turns a recorded [`Run`]
//! into plain report data (entries plus derived statistics), and a
//! [`ReportFormat`] turns that data into a document. [`ReportRenderer`]
//! writes the document into the reports directory under a fresh
//! `report-YYYYMMDD-HHMMSS.<ext>` name.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uitrace_common::ReportFormatKind;
use uuid::Uuid;

use crate::error::{E2eError, E2eResult};
use crate::model::{Run, Status, Step, Test};

/// Same-second renders get a numeric suffix; give up after this many
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Aggregate step statistics, always derived from the recorded steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_tests: usize,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    /// Steps never ended; counted in the total only
    pub running_steps: usize,
}

impl Summary {
    pub fn from_run(run: &Run) -> Self {
        Self::from_statuses(run.tests.len(), run.steps().map(|s| s.status))
    }

    /// Count step statuses; every status lands in exactly one bucket
    pub fn from_statuses(total_tests: usize, statuses: impl IntoIterator<Item = Status>) -> Self {
        let mut summary = Summary {
            total_tests,
            ..Default::default()
        };
        for status in statuses {
            summary.total_steps += 1;
            match status {
                Status::Success => summary.passed_steps += 1,
                Status::Failure => summary.failed_steps += 1,
                Status::Running => summary.running_steps += 1,
            }
        }
        summary
    }

    /// Passed steps as a percentage of all steps; 0 for a run without steps
    pub fn pass_rate(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        self.passed_steps as f64 / self.total_steps as f64 * 100.0
    }

    pub fn has_failures(&self) -> bool {
        self.failed_steps > 0
    }
}

/// Reference to a failure screenshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotRef {
    pub path: PathBuf,
    /// SHA-256 of the file, when it could be read at render time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
    pub screenshot: Option<ScreenshotRef>,
}

impl From<&Step> for StepEntry {
    fn from(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            status: step.status,
            message: step.message.clone(),
            error: step.error.clone(),
            timestamp: step.timestamp,
            screenshot: step.screenshot.as_ref().map(|path| ScreenshotRef {
                path: path.clone(),
                sha256: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    pub name: String,
    pub status: Status,
    pub message: String,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub duration_ms: Option<u64>,
    pub steps: Vec<StepEntry>,
}

impl From<&Test> for TestEntry {
    fn from(test: &Test) -> Self {
        Self {
            name: test.name.clone(),
            status: test.status,
            message: test.message.clone(),
            started_at: test.started_at,
            ended_at: test.ended_at,
            duration_ms: test.duration.map(|d| d.as_millis() as u64),
            steps: test.steps.iter().map(StepEntry::from).collect(),
        }
    }
}

/// Everything a report document shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub title: String,
    pub engine: Option<String>,
    pub started_at: DateTime<Local>,
    pub generated_at: DateTime<Local>,
    pub summary: Summary,
    pub tests: Vec<TestEntry>,
}

impl Report {
    /// Build report data from a run, stamped with the current time
    pub fn from_run(run: &Run) -> Self {
        Self::from_run_at(run, Local::now())
    }

    pub fn from_run_at(run: &Run, generated_at: DateTime<Local>) -> Self {
        Self {
            run_id: run.id,
            title: run.title.clone(),
            engine: run.engine.clone(),
            started_at: run.started_at,
            generated_at,
            summary: Summary::from_run(run),
            tests: run.tests.iter().map(TestEntry::from).collect(),
        }
    }

    /// Re-derive the summary from the entries (used for reports read back
    /// from JSON)
    pub fn recompute_summary(&mut self) {
        self.summary = Summary::from_statuses(
            self.tests.len(),
            self.tests.iter().flat_map(|t| t.steps.iter().map(|s| s.status)),
        );
    }

    /// Hash every screenshot that still exists on disk
    pub fn attach_screenshot_digests(&mut self) {
        let shots = self
            .tests
            .iter_mut()
            .flat_map(|t| t.steps.iter_mut())
            .filter_map(|s| s.screenshot.as_mut());
        for shot in shots {
            match std::fs::read(&shot.path) {
                Ok(data) => shot.sha256 = Some(hex::encode(Sha256::digest(&data))),
                Err(e) => debug!("Screenshot {} not readable: {}", shot.path.display(), e),
            }
        }
    }
}

/// Options shared by all formats
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Directory the document is written to; links are relative to it
    pub report_dir: &'a Path,
    /// Inline screenshots as data URIs
    pub embed_screenshots: bool,
}

/// Turns report data into a document
pub trait ReportFormat: Send + Sync {
    /// File extension including the leading dot
    fn extension(&self) -> &'static str;

    fn render(&self, report: &Report, ctx: &RenderContext<'_>) -> E2eResult<Vec<u8>>;
}

/// Machine-readable report
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl ReportFormat for JsonFormat {
    fn extension(&self) -> &'static str {
        ".json"
    }

    fn render(&self, report: &Report, _ctx: &RenderContext<'_>) -> E2eResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(report)?)
    }
}

/// Self-contained HTML report
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFormat;

impl ReportFormat for HtmlFormat {
    fn extension(&self) -> &'static str {
        ".html"
    }

    fn render(&self, report: &Report, ctx: &RenderContext<'_>) -> E2eResult<Vec<u8>> {
        let mut html = String::with_capacity(16 * 1024);
        let summary = &report.summary;
        let title = escape_html(&report.title);

        html.push_str(&format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Test report: {title}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="container">
<header>
  <h1>{title}</h1>
  <p class="timestamp">Started {started} &middot; Generated {generated}</p>
"#,
            started = report.started_at.format("%Y-%m-%d %H:%M:%S"),
            generated = report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        ));
        if let Some(engine) = &report.engine {
            html.push_str(&format!(
                "  <p class=\"engine\">Engine: <strong>{}</strong></p>\n",
                escape_html(engine)
            ));
        }
        html.push_str(&format!(
            "  <p class=\"run-id\">Run {}</p>\n</header>\n",
            report.run_id
        ));

        html.push_str(&format!(
            r#"<section class="summary">
  <h2>Summary</h2>
  <div class="stats">
    <div class="stat-box total"><h3>Tests</h3><p>{tests}</p></div>
    <div class="stat-box total"><h3>Steps</h3><p>{total}</p></div>
    <div class="stat-box passed"><h3>Passed</h3><p>{passed}</p></div>
    <div class="stat-box failed"><h3>Failed</h3><p>{failed}</p></div>
    <div class="stat-box running"><h3>Unfinished</h3><p>{running}</p></div>
  </div>
  <div class="progress-container"><div class="progress-bar" style="width: {rate:.1}%"></div></div>
  <p class="pass-rate">Pass rate: {rate:.1}%</p>
</section>
"#,
            tests = summary.total_tests,
            total = summary.total_steps,
            passed = summary.passed_steps,
            failed = summary.failed_steps,
            running = summary.running_steps,
            rate = summary.pass_rate(),
        ));

        html.push_str("<section class=\"test-results\">\n  <h2>Tests</h2>\n");
        if report.tests.is_empty() {
            html.push_str("  <p class=\"empty\">No tests were recorded.</p>\n");
        }
        for test in &report.tests {
            render_test(&mut html, test, ctx);
        }
        html.push_str("</section>\n</div>\n");

        html.push_str(&format!(
            r#"<div id="screenshot-modal" class="screenshot-modal" onclick="this.style.display='none'">
  <img class="modal-content" id="modal-image" alt="screenshot">
</div>
<script>{SCRIPT}</script>
</body>
</html>
"#
        ));

        Ok(html.into_bytes())
    }
}

fn render_test(html: &mut String, test: &TestEntry, ctx: &RenderContext<'_>) {
    let class = status_class(test.status);
    html.push_str(&format!(
        r#"  <div class="test-result {class}">
    <div class="test-header collapsible">
      <span class="test-title">{name}</span>
      <span class="test-status status-{class}">{status}</span>
    </div>
    <div class="content">
      <div class="test-info">
        <div class="test-info-item">Started: <span class="timestamp">{started}</span></div>
        <div class="test-info-item">Duration: <span class="duration">{duration}</span></div>
        <div class="test-info-item">Message: {message}</div>
      </div>
      <div class="test-steps">
"#,
        name = escape_html(&test.name),
        status = test.status,
        started = test.started_at.format("%Y-%m-%d %H:%M:%S"),
        duration = test
            .duration_ms
            .map(format_duration_ms)
            .unwrap_or_else(|| "-".to_string()),
        message = escape_html(&test.message),
    ));

    for step in &test.steps {
        let class = status_class(step.status);
        html.push_str(&format!(
            r#"        <div class="step {class}">
          <div class="step-header">
            <span class="step-name">{name}</span>
            <span class="step-status status-{class}">{status}</span>
          </div>
          <div class="step-details">
            <span class="timestamp">{time}</span>
"#,
            name = escape_html(&step.name),
            status = step.status,
            time = step.timestamp.format("%H:%M:%S%.3f"),
        ));
        if !step.message.is_empty() {
            html.push_str(&format!(
                "            <p class=\"message\">{}</p>\n",
                escape_html(&step.message)
            ));
        }
        if let Some(error) = &step.error {
            html.push_str(&format!(
                "            <div class=\"error\">{}</div>\n",
                escape_html(error)
            ));
        }
        if let Some(shot) = &step.screenshot {
            let src = screenshot_src(shot, ctx);
            html.push_str(&format!(
                r#"            <div class="screenshot-container">
              <img class="screenshot" src="{src}" alt="{alt}" onclick="showScreenshot(this.src)">
              <p class="screenshot-path">{alt}</p>
            </div>
"#,
                src = escape_html(&src),
                alt = escape_html(&shot.path.display().to_string()),
            ));
        }
        html.push_str("          </div>\n        </div>\n");
    }

    html.push_str("      </div>\n    </div>\n  </div>\n");
}

/// Data URI when embedding is requested and the file is readable, else a
/// path relative to the report directory
fn screenshot_src(shot: &ScreenshotRef, ctx: &RenderContext<'_>) -> String {
    if ctx.embed_screenshots {
        match std::fs::read(&shot.path) {
            Ok(data) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(data);
                return format!("data:{};base64,{}", image_mime(&shot.path), encoded);
            }
            Err(e) => warn!(
                "Cannot embed screenshot {}: {}; linking instead",
                shot.path.display(),
                e
            ),
        }
    }
    path_for_report(ctx.report_dir, &shot.path)
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Path relative to the report directory (falls back to the path as given)
pub fn path_for_report(report_dir: &Path, target: &Path) -> String {
    let base = absolutize(report_dir);
    let target_abs = absolutize(target);
    let path = pathdiff::diff_paths(&target_abs, &base).unwrap_or_else(|| target.to_path_buf());
    let rendered = path.display().to_string();
    if cfg!(windows) {
        rendered.replace('\\', "/")
    } else {
        rendered
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn status_class(status: Status) -> &'static str {
    match status {
        Status::Running => "running",
        Status::Success => "success",
        Status::Failure => "failure",
    }
}

fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

/// Escape HTML entities for safe embedding.
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Writes reports into a directory
pub struct ReportRenderer {
    dir: PathBuf,
    format: Box<dyn ReportFormat>,
    embed_screenshots: bool,
}

impl ReportRenderer {
    /// HTML renderer writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: Box::new(HtmlFormat),
            embed_screenshots: false,
        }
    }

    /// Renderer for a configured format
    pub fn for_kind(dir: impl Into<PathBuf>, kind: ReportFormatKind) -> Self {
        let renderer = Self::new(dir);
        match kind {
            ReportFormatKind::Html => renderer,
            ReportFormatKind::Json => renderer.with_format(Box::new(JsonFormat)),
        }
    }

    pub fn with_format(mut self, format: Box<dyn ReportFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn embed_screenshots(mut self, embed: bool) -> Self {
        self.embed_screenshots = embed;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render a run and return the path of the written document
    pub fn render(&self, run: &Run) -> E2eResult<PathBuf> {
        self.write(Report::from_run(run))
    }

    /// Write prepared report data and return the path of the document
    pub fn write(&self, mut report: Report) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|source| E2eError::ArtifactDir {
            path: self.dir.clone(),
            source,
        })?;

        report.attach_screenshot_digests();
        let ctx = RenderContext {
            report_dir: &self.dir,
            embed_screenshots: self.embed_screenshots,
        };
        let bytes = self.format.render(&report, &ctx)?;

        let stamp = report.generated_at.format("%Y%m%d-%H%M%S").to_string();
        let path = self.persist(&bytes, &stamp)?;
        info!("Report written to: {}", path.display());
        Ok(path)
    }

    // The document is written to a temp file first and moved into place
    // without replacing an existing report.
    fn persist(&self, bytes: &[u8], stamp: &str) -> E2eResult<PathBuf> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".report-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let ext = self.format.extension();
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                format!("report-{}{}", stamp, ext)
            } else {
                format!("report-{}-{}{}", stamp, attempt, ext)
            };
            let path = self.dir.join(name);

            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists, trying next name", path.display());
                    tmp = e.file;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(E2eError::Report(format!(
            "no free report name for timestamp {} in {}",
            stamp,
            self.dir.display()
        )))
    }
}

const STYLE: &str = r#"
:root { --success: #28a745; --failure: #dc3545; --running: #17a2b8; --neutral: #6c757d; --light: #f8f9fa; --radius: 8px; --shadow: 0 2px 5px rgba(0,0,0,0.1); }
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; padding: 20px; }
.container { max-width: 1200px; margin: 0 auto; padding: 20px; border-radius: var(--radius); box-shadow: var(--shadow); }
header { text-align: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 1px solid #eee; }
h2 { color: #444; margin: 25px 0 15px; }
.summary { background: var(--light); border-radius: var(--radius); padding: 20px; margin-bottom: 30px; }
.stats { display: flex; flex-wrap: wrap; gap: 15px; margin: 20px 0; }
.stat-box { flex: 1; min-width: 150px; text-align: center; padding: 20px; border-radius: var(--radius); box-shadow: var(--shadow); }
.stat-box p { font-size: 2em; font-weight: bold; }
.stat-box.total { color: var(--neutral); background: #fff; }
.stat-box.passed { color: var(--success); background: rgba(40,167,69,0.1); }
.stat-box.failed { color: var(--failure); background: rgba(220,53,69,0.1); }
.stat-box.running { color: var(--running); background: rgba(23,162,184,0.1); }
.progress-container { background: #e9ecef; border-radius: 10px; height: 10px; overflow: hidden; }
.progress-bar { height: 100%; background: var(--success); }
.test-result { margin-bottom: 25px; padding: 20px; border-radius: var(--radius); box-shadow: var(--shadow); }
.test-header { display: flex; justify-content: space-between; align-items: center; padding-bottom: 10px; border-bottom: 1px solid #eee; cursor: pointer; }
.test-title { font-size: 1.2em; font-weight: bold; }
.test-status, .step-status { padding: 3px 10px; border-radius: 20px; font-weight: bold; font-size: 0.85em; color: #fff; }
.test-info { display: flex; flex-wrap: wrap; gap: 15px; margin: 15px 0; }
.test-info-item { flex: 1; min-width: 150px; }
.step { margin: 10px 0; padding: 15px; border-radius: var(--radius); }
.step-header { display: flex; justify-content: space-between; align-items: center; }
.step-name { font-weight: bold; }
.error { background: rgba(220,53,69,0.1); color: var(--failure); padding: 10px; border-radius: var(--radius); margin-top: 10px; font-family: monospace; white-space: pre-wrap; }
.screenshot-container { margin-top: 15px; text-align: center; }
.screenshot { max-width: 100%; max-height: 300px; border: 1px solid #ddd; border-radius: var(--radius); cursor: pointer; }
.screenshot-modal { display: none; position: fixed; z-index: 1000; inset: 0; background: rgba(0,0,0,0.9); }
.modal-content { margin: 5% auto; display: block; max-width: 90%; max-height: 90%; }
.timestamp, .run-id, .screenshot-path { color: var(--neutral); font-size: 0.9em; }
.duration { font-weight: bold; color: var(--neutral); }
.success { background: rgba(40,167,69,0.05); border-left: 4px solid var(--success); }
.failure { background: rgba(220,53,69,0.05); border-left: 4px solid var(--failure); }
.running { background: rgba(23,162,184,0.05); border-left: 4px solid var(--running); }
.status-success { background: var(--success); }
.status-failure { background: var(--failure); }
.status-running { background: var(--running); }
.collapsed + .content { display: none; }
"#;

const SCRIPT: &str = r#"
function showScreenshot(src) {
  var modal = document.getElementById('screenshot-modal');
  document.getElementById('modal-image').src = src;
  modal.style.display = 'block';
}
document.querySelectorAll('.collapsible').forEach(function (header) {
  header.addEventListener('click', function () { header.classList.toggle('collapsed'); });
});
"#;
