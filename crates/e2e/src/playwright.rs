//! Playwright browser automation
//!
//! Each page is backed by a long-lived Node process running a small bridge
//! script. Commands go to the bridge as one JSON object per line on stdin,
//! replies come back the same way on stdout, matched by id.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uitrace_common::{BrowserKind, Config};

use crate::error::{E2eError, E2eResult};
use crate::page::{LoadState, Page, PageLauncher};

const BRIDGE_SCRIPT: &str = r#"
const playwright = require('playwright');
const readline = require('readline');

const config = JSON.parse(process.argv[2]);
let browser;
let context;
let page;

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

async function launch() {
  browser = await playwright[config.browser].launch({
    headless: config.headless,
    slowMo: config.slowMo,
  });
  const options = { viewport: { width: config.width, height: config.height } };
  if (config.videoDir) {
    options.recordVideo = { dir: config.videoDir, size: { width: config.width, height: config.height } };
  }
  context = await browser.newContext(options);
  context.setDefaultTimeout(config.timeoutMs);
  page = await context.newPage();
}

async function handle(cmd) {
  switch (cmd.cmd) {
    case 'goto':
      await page.goto(cmd.url);
      return null;
    case 'fill':
      await page.fill(cmd.selector, cmd.value);
      return null;
    case 'click':
      await page.click(cmd.selector);
      return null;
    case 'waitForLoadState':
      await page.waitForLoadState(cmd.state);
      return null;
    case 'waitForSelector':
      await page.waitForSelector(cmd.selector, { state: 'visible', timeout: cmd.timeoutMs });
      return null;
    case 'isVisible':
      return await page.isVisible(cmd.selector);
    case 'screenshot':
      await page.screenshot({ path: cmd.path, fullPage: cmd.fullPage });
      return null;
    case 'elementScreenshot':
      await page.locator(cmd.selector).first().screenshot({ path: cmd.path });
      return null;
    case 'close':
      await context.close();
      await browser.close();
      return null;
    default:
      throw new Error('unknown command: ' + cmd.cmd);
  }
}

(async () => {
  try {
    await launch();
    reply({ id: 0, ok: true });
  } catch (error) {
    reply({ id: 0, ok: false, error: error.message });
    process.exit(1);
  }

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      reply({ id: null, ok: false, error: 'malformed command' });
      continue;
    }
    try {
      const value = await handle(cmd);
      reply({ id: cmd.id, ok: true, value });
    } catch (error) {
      reply({ id: cmd.id, ok: false, error: error.message });
    }
    if (cmd.cmd === 'close') break;
  }
  process.exit(0);
})();
"#;

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Record a video of every page into this directory
    pub video_dir: Option<PathBuf>,

    /// Node executable
    pub node: PathBuf,

    /// Default timeout for page actions
    pub action_timeout: Duration,

    /// Time allowed for the browser to come up
    pub startup_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo_ms: 0,
            viewport_width: 1280,
            viewport_height: 720,
            video_dir: None,
            node: PathBuf::from("node"),
            action_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

impl PlaywrightConfig {
    pub fn from_config(config: &Config) -> Self {
        let (viewport_width, viewport_height) = config.browser.viewport();
        Self {
            headless: config.browser.headless,
            slow_mo_ms: config.browser.slow_mo_ms,
            viewport_width,
            viewport_height,
            video_dir: config
                .browser
                .record_video
                .then(|| config.artifacts.videos_dir.clone()),
            ..Self::default()
        }
    }

    fn launch_options(&self, browser: BrowserKind) -> serde_json::Value {
        serde_json::json!({
            "browser": browser.as_str(),
            "headless": self.headless,
            "slowMo": self.slow_mo_ms,
            "width": self.viewport_width,
            "height": self.viewport_height,
            "videoDir": self.video_dir,
            "timeoutMs": self.action_timeout.as_millis() as u64,
        })
    }
}

/// Launches Playwright-backed pages
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Check if Playwright is installed
    pub async fn check_installed() -> E2eResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }
}

#[async_trait]
impl PageLauncher for PlaywrightLauncher {
    async fn launch(&self, browser: BrowserKind) -> E2eResult<Box<dyn Page>> {
        let page = PlaywrightPage::launch(&self.config, browser).await?;
        Ok(Box::new(page))
    }
}

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
enum BridgeCommand<'a> {
    Goto {
        url: &'a str,
    },
    Fill {
        selector: &'a str,
        value: &'a str,
    },
    Click {
        selector: &'a str,
    },
    WaitForLoadState {
        state: LoadState,
    },
    #[serde(rename_all = "camelCase")]
    WaitForSelector {
        selector: &'a str,
        timeout_ms: u64,
    },
    IsVisible {
        selector: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Screenshot {
        path: &'a Path,
        full_page: bool,
    },
    ElementScreenshot {
        selector: &'a str,
        path: &'a Path,
    },
    Close,
}

impl BridgeCommand<'_> {
    fn action(&self) -> &'static str {
        match self {
            BridgeCommand::Goto { .. } => "navigate",
            BridgeCommand::Fill { .. } => "fill",
            BridgeCommand::Click { .. } => "click",
            BridgeCommand::WaitForLoadState { .. } => "wait for load state",
            BridgeCommand::WaitForSelector { .. } => "wait for selector",
            BridgeCommand::IsVisible { .. } => "is visible",
            BridgeCommand::Screenshot { .. } => "screenshot",
            BridgeCommand::ElementScreenshot { .. } => "element screenshot",
            BridgeCommand::Close => "close",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    error: Option<String>,
}

struct Bridge {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl Bridge {
    /// Read lines until the reply with `id` arrives
    async fn read_reply(&mut self, id: u64) -> E2eResult<BridgeReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("bridge process exited".to_string()))?;

            match serde_json::from_str::<BridgeReply>(&line) {
                Ok(reply) if reply.id == Some(id) => return Ok(reply),
                Ok(reply) => debug!("Dropping stale bridge reply: {:?}", reply),
                Err(_) => debug!("[playwright] {}", line),
            }
        }
    }

    async fn shutdown(&mut self) {
        self.closed = true;
        if let Ok(Ok(status)) = tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            debug!("Playwright bridge exited with {}", status);
            return;
        }

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return;
                }
            }
        }

        // Force kill if still running
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill Playwright bridge: {}", e);
        }
    }
}

/// A page driven through the Playwright bridge
pub struct PlaywrightPage {
    browser: BrowserKind,
    action_timeout: Duration,
    bridge: Mutex<Bridge>,
    _script_dir: TempDir,
}

impl PlaywrightPage {
    /// Start a bridge process and open a page in `browser`
    pub async fn launch(config: &PlaywrightConfig, browser: BrowserKind) -> E2eResult<Self> {
        let script_dir = tempfile::Builder::new().prefix("uitrace-bridge").tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        if let Some(video_dir) = &config.video_dir {
            std::fs::create_dir_all(video_dir).map_err(|source| E2eError::ArtifactDir {
                path: video_dir.clone(),
                source,
            })?;
        }

        let cwd = std::env::current_dir()?;
        debug!("Running Playwright bridge: {}", script_path.display());

        let mut child = Command::new(&config.node)
            .arg(&script_path)
            .arg(config.launch_options(browser).to_string())
            .current_dir(&cwd)
            .env("NODE_PATH", cwd.join("node_modules"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Launch {
                browser: browser.to_string(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout), stderr) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(E2eError::Launch {
                browser: browser.to_string(),
                reason: "bridge stdio not captured".to_string(),
            });
        };

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[playwright] {}", line);
                }
            });
        }

        let mut bridge = Bridge {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
        };

        let ready = match tokio::time::timeout(config.startup_timeout, bridge.read_reply(0)).await {
            Ok(Ok(reply)) if reply.ok => Ok(()),
            Ok(Ok(reply)) => Err(reply.error.unwrap_or_else(|| "unknown error".to_string())),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no response within {:?}", config.startup_timeout)),
        };

        if let Err(reason) = ready {
            bridge.shutdown().await;
            return Err(E2eError::Launch {
                browser: browser.to_string(),
                reason,
            });
        }

        info!("Launched {} ({}x{}, headless: {})",
            browser, config.viewport_width, config.viewport_height, config.headless);

        Ok(Self {
            browser,
            action_timeout: config.action_timeout,
            bridge: Mutex::new(bridge),
            _script_dir: script_dir,
        })
    }

    pub fn browser(&self) -> BrowserKind {
        self.browser
    }

    async fn request(&self, command: BridgeCommand<'_>) -> E2eResult<serde_json::Value> {
        let action = command.action();
        let mut bridge = self.bridge.lock().await;
        if bridge.closed {
            return Err(E2eError::page_action(action, "page is closed"));
        }

        let id = bridge.next_id;
        bridge.next_id += 1;

        let mut line = serde_json::to_string(&Envelope { id, command: &command })?;
        line.push('\n');
        bridge.stdin.write_all(line.as_bytes()).await?;
        bridge.stdin.flush().await?;

        // The bridge enforces the action timeout itself; this only guards
        // against a hung process.
        let deadline = self.action_timeout + Duration::from_secs(5);
        let reply = tokio::time::timeout(deadline, bridge.read_reply(id))
            .await
            .map_err(|_| E2eError::page_action(action, format!("no reply within {:?}", deadline)))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(E2eError::page_action(
                action,
                reply.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Goto { url }).await.map(drop)
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Fill { selector, value }).await.map(drop)
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Click { selector }).await.map(drop)
    }

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.request(BridgeCommand::WaitForLoadState { state }).await.map(drop)
    }

    async fn wait_for_locator(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.request(BridgeCommand::WaitForSelector {
            selector,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
        .map(drop)
    }

    async fn is_visible(&self, selector: &str) -> E2eResult<bool> {
        let value = self.request(BridgeCommand::IsVisible { selector }).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(BridgeCommand::Screenshot { path, full_page }).await.map(drop)
    }

    async fn element_screenshot(&self, selector: &str, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(BridgeCommand::ElementScreenshot { selector, path })
            .await
            .map(drop)
    }

    async fn close(&self) -> E2eResult<()> {
        let result = {
            let bridge = self.bridge.lock().await;
            if bridge.closed {
                return Ok(());
            }
            drop(bridge);
            self.request(BridgeCommand::Close).await.map(drop)
        };

        self.bridge.lock().await.shutdown().await;
        debug!("Closed {} page", self.browser);
        result
    }
}
