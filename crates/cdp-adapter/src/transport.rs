//! Raw DevTools commands routed through a chromiumoxide-managed browser.
//!
//! chromiumoxide owns the websocket, the child process and one flattened
//! session per page target. The pilot addresses pages by target id and never
//! attaches sessions of its own.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Handler, Page};
use chromiumoxide_types::{Command, Method, MethodId};
use futures::StreamExt;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const PAGE_LOOKUP_ATTEMPTS: usize = 10;
const PAGE_LOOKUP_BACKOFF: Duration = Duration::from_millis(100);

/// Where a command is routed: the browser endpoint or the session of a page target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandTarget {
    Browser,
    Page(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// A DevTools method called by name with untyped params.
#[derive(Clone, Debug)]
struct RawCommand {
    method: String,
    params: Value,
}

impl Serialize for RawCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params.serialize(serializer)
    }
}

impl Method for RawCommand {
    fn identifier(&self) -> MethodId {
        self.method.clone().into()
    }
}

impl Command for RawCommand {
    type Response = Value;
}

/// The one browser connection backing a control surface.
pub struct ChromiumTransport {
    browser: Browser,
    pages: Mutex<HashMap<String, Page>>,
    deadline: Duration,
    connected: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl ChromiumTransport {
    /// Attaches to `websocket_url` when configured, otherwise launches Chromium.
    pub async fn launch(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (browser, handler) = match &cfg.websocket_url {
            Some(url) => {
                info!(target: "cdp-transport", %url, "attaching to running browser");
                Browser::connect(url.clone())
                    .await
                    .map_err(|err| launch_error("attach", err))?
            }
            None => {
                let config = launch_config(cfg)?;
                info!(
                    target: "cdp-transport",
                    headless = cfg.headless,
                    width = cfg.window_width,
                    height = cfg.window_height,
                    "launching chromium"
                );
                Browser::launch(config)
                    .await
                    .map_err(|err| launch_error("launch", err))?
            }
        };

        let connected = Arc::new(AtomicBool::new(true));
        let pump = spawn_pump(handler, connected.clone());
        Ok(Self {
            browser,
            pages: Mutex::new(HashMap::new()),
            deadline: Duration::from_millis(cfg.default_deadline_ms),
            connected,
            pump,
        })
    }

    async fn page(&self, target_id: &str) -> Result<Page, AdapterError> {
        if let Some(page) = self.pages.lock().await.get(target_id) {
            return Ok(page.clone());
        }

        // Freshly created targets show up once chromiumoxide has attached them.
        for _ in 0..PAGE_LOOKUP_ATTEMPTS {
            let pages = self
                .browser
                .pages()
                .await
                .map_err(|err| map_cdp_error("Target.getTargets", err))?;
            if let Some(page) = pages
                .into_iter()
                .find(|page| page.target_id().inner() == target_id)
            {
                self.pages
                    .lock()
                    .await
                    .insert(target_id.to_string(), page.clone());
                return Ok(page);
            }
            tokio::time::sleep(PAGE_LOOKUP_BACKOFF).await;
        }

        Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
            .with_hint(format!("tab {target_id} has no attached session"))
            .retriable(true))
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("browser connection closed before {method}")));
        }

        let page = match &target {
            CommandTarget::Browser => None,
            CommandTarget::Page(target_id) => Some(self.page(target_id).await?),
        };
        let command = RawCommand {
            method: method.to_string(),
            params,
        };
        let call = async {
            match &page {
                None => self.browser.execute(command).await,
                Some(page) => page.execute(command).await,
            }
        };

        match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(response)) => Ok(response.result),
            Ok(Err(err)) => {
                if let (CommandTarget::Page(target_id), CdpError::NotFound) = (&target, &err) {
                    self.pages.lock().await.remove(target_id);
                }
                Err(map_cdp_error(method, err))
            }
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(format!(
                    "{method} timed out after {}ms",
                    self.deadline.as_millis()
                ))
                .retriable(true)),
        }
    }
}

impl Drop for ChromiumTransport {
    fn drop(&mut self) {
        // Dropping the browser kills a child we launched.
        self.pump.abort();
    }
}

fn spawn_pump(mut handler: Handler, connected: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                debug!(target: "cdp-transport", %err, "ignoring handler error");
            }
        }
        connected.store(false, Ordering::Relaxed);
        warn!(target: "cdp-transport", "browser connection closed");
    })
}

fn launch_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    check_executable(&cfg.executable)?;
    let profile_dir = prepare_profile_dir(&cfg.user_data_dir)?;

    // No viewport emulation: screenshots must match the real window.
    let mut builder = BrowserConfig::builder()
        .viewport(None)
        .window_size(cfg.window_width, cfg.window_height)
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(LAUNCH_TIMEOUT)
        .user_data_dir(profile_dir)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-popup-blocking")
        .arg("--disable-dev-shm-usage");

    builder = if cfg.headless {
        builder.headless_mode(HeadlessMode::New).arg("--mute-audio")
    } else {
        builder.with_head()
    };
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("browser config error: {err}"))
    })
}

/// An empty path defers the lookup to chromiumoxide.
fn check_executable(executable: &Path) -> Result<(), AdapterError> {
    if executable.as_os_str().is_empty() || executable.exists() {
        return Ok(());
    }
    Err(AdapterError::new(AdapterErrorKind::CdpIo)
        .with_hint(format!("chrome executable not found at {}", executable.display()))
        .with_data(json!({
            "expected": executable,
            "hint": "Set PILOT_CHROME to the full path of chrome/chromium."
        })))
}

/// Resolves the profile against the working directory and creates it.
fn prepare_profile_dir(user_data_dir: &Path) -> Result<PathBuf, AdapterError> {
    let dir = if user_data_dir.is_absolute() {
        user_data_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot resolve profile dir: {err}"))
            })?
            .join(user_data_dir)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("cannot create profile dir {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

fn launch_error(stage: &str, err: CdpError) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!("browser {stage} failed: {err}"))
}

fn map_cdp_error(method: &str, err: CdpError) -> AdapterError {
    let hint = format!("{method}: {err}");
    match err {
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(hint)
            .retriable(true),
        CdpError::NotFound => AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint(hint),
        CdpError::JavascriptException(_) => {
            AdapterError::new(AdapterErrorKind::Script).with_hint(hint)
        }
        CdpError::Chrome(_) | CdpError::Serde(_) => {
            AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
        }
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}
