//! Recorder to report tests
//!
//! Records runs by hand and checks the written documents.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, TimeZone};
use tempfile::TempDir;
use uitrace_e2e::report::{HtmlFormat, JsonFormat};
use uitrace_e2e::{Recorder, Report, ReportRenderer, Status};

fn file_name(path: &std::path::Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn failed_navigation_with_screenshot() {
    let dir = TempDir::new().unwrap();
    let mut recorder = Recorder::new("Login test");
    recorder.start_test("Login");
    recorder.start_step("Navigate").unwrap();
    recorder
        .end_step_failure("Could not open the login page", Some("timeout".into()), Some(PathBuf::from("nav.png")))
        .unwrap();
    recorder.end_test_failure("Login failed", Duration::from_millis(1200)).unwrap();

    let report = Report::from_run(recorder.run());
    assert_eq!(report.summary.total_steps, 1);
    assert_eq!(report.summary.passed_steps, 0);
    assert_eq!(report.summary.failed_steps, 1);
    assert_eq!(report.summary.pass_rate(), 0.0);
    assert_eq!(report.tests[0].status, Status::Failure);
    assert_eq!(report.tests[0].duration_ms, Some(1200));

    let path = ReportRenderer::new(dir.path()).render(recorder.run()).unwrap();
    let name = file_name(&path);
    assert!(name.starts_with("report-") && name.ends_with(".html"), "{}", name);

    let html = fs::read_to_string(&path).unwrap();
    assert!(html.contains("nav.png"));
    assert!(html.contains("timeout"));
    assert!(html.contains("1.20s"));
    assert!(html.contains("Pass rate: 0.0%"));
}

#[test]
fn two_successful_steps() {
    let dir = TempDir::new().unwrap();
    let mut recorder = Recorder::new("Login test");
    recorder.start_test("Login");
    for step in ["Navigate", "Submit"] {
        recorder.start_step(step).unwrap();
        recorder.end_step_success(format!("{} done", step)).unwrap();
    }
    recorder.end_test_success("Login passed", Duration::from_millis(800)).unwrap();

    let path = ReportRenderer::new(dir.path()).render(recorder.run()).unwrap();
    let html = fs::read_to_string(&path).unwrap();

    assert!(html.contains("Pass rate: 100.0%"));
    assert!(html.contains("800ms"));
    assert!(!html.contains(r#"<div class="screenshot-container">"#));
    assert!(!html.contains(r#"<img class="screenshot""#));
    assert!(html.find("Navigate done").unwrap() < html.find("Submit done").unwrap());
}

#[test]
fn orphan_steps_leave_an_empty_report() {
    let dir = TempDir::new().unwrap();
    let mut recorder = Recorder::new("Nothing");
    recorder.start_step("orphan").unwrap();
    recorder.end_step_success("ignored").unwrap();

    let report = Report::from_run(recorder.run());
    assert_eq!(report.summary.total_tests, 0);
    assert_eq!(report.summary.total_steps, 0);
    assert_eq!(report.summary.pass_rate(), 0.0);

    let path = ReportRenderer::new(dir.path()).render(recorder.run()).unwrap();
    let html = fs::read_to_string(path).unwrap();
    assert!(html.contains("No tests were recorded."));
}

#[test]
fn unfinished_steps_count_toward_the_total_only() {
    let mut recorder = Recorder::new("run");
    recorder.start_test("Login");
    recorder.start_step("Navigate").unwrap();
    recorder.end_step_success("ok").unwrap();
    recorder.start_step("Submit").unwrap();

    let summary = Report::from_run(recorder.run()).summary;
    assert_eq!(summary.total_steps, 2);
    assert_eq!(summary.passed_steps, 1);
    assert_eq!(summary.running_steps, 1);
    assert_eq!(summary.pass_rate(), 50.0);
}

#[test]
fn same_second_renders_do_not_overwrite() {
    let dir = TempDir::new().unwrap();
    let mut recorder = Recorder::new("run");
    recorder.start_test("Login");

    let at = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
    let renderer = ReportRenderer::new(dir.path());
    let paths: Vec<PathBuf> = (0..3)
        .map(|_| renderer.write(Report::from_run_at(recorder.run(), at)).unwrap())
        .collect();

    let names: Vec<String> = paths.iter().map(|p| file_name(p)).collect();
    assert_eq!(
        names,
        vec![
            "report-20240301-123045.html",
            "report-20240301-123045-2.html",
            "report-20240301-123045-3.html",
        ]
    );
    // no temp files left behind
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[test]
fn embedded_screenshots_are_data_uris() {
    let dir = TempDir::new().unwrap();
    let shot = dir.path().join("shots").join("verify.png");
    fs::create_dir_all(shot.parent().unwrap()).unwrap();
    fs::write(&shot, b"\x89PNG\r\n\x1a\n").unwrap();

    let mut recorder = Recorder::new("run");
    recorder.start_test("Login");
    recorder.start_step("Verify").unwrap();
    recorder.end_step_failure("not logged in", None, Some(shot.clone())).unwrap();

    let path = ReportRenderer::new(dir.path().join("reports"))
        .embed_screenshots(true)
        .render(recorder.run())
        .unwrap();
    let html = fs::read_to_string(path).unwrap();
    assert!(html.contains("src=\"data:image/png;base64,iVBORw0KGgo=\""));
}

#[test]
fn json_report_reads_back_and_renders_as_html() {
    let dir = TempDir::new().unwrap();
    let shot = dir.path().join("fail.png");
    fs::write(&shot, b"png").unwrap();

    let mut recorder = Recorder::new("Login test").with_engine("chromium");
    recorder.start_test("Login");
    recorder.start_step("Navigate").unwrap();
    recorder.end_step_failure("failed", Some("boom".into()), Some(shot)).unwrap();
    recorder.end_test_failure("failed", Duration::from_secs(2)).unwrap();

    let json_path = ReportRenderer::new(dir.path())
        .with_format(Box::new(JsonFormat))
        .render(recorder.run())
        .unwrap();
    assert!(file_name(&json_path).ends_with(".json"));

    let mut report: Report = serde_json::from_slice(&fs::read(&json_path).unwrap()).unwrap();
    let digest = report.tests[0].steps[0].screenshot.as_ref().unwrap().sha256.clone();
    assert_eq!(
        digest.as_deref(),
        Some("8f8cbb7dcf46e0bc7d53265749a6c17d116093a6ba95e442764060c76fd4a86c")
    );

    report.recompute_summary();
    assert_eq!(report.summary.failed_steps, 1);

    let html_path = ReportRenderer::new(dir.path())
        .with_format(Box::new(HtmlFormat))
        .write(report)
        .unwrap();
    let html = fs::read_to_string(html_path).unwrap();
    assert!(html.contains("Engine: <strong>chromium</strong>"));
    assert!(html.contains("boom"));
}
