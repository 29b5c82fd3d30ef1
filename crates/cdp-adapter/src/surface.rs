//! The browser control surface consumed by the agent, and its CDP implementation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pilot_core_types::{Coordinate, TabHandle, ViewportSize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::keys::{KeyChord, KeyDefinition, Modifier};
use crate::metrics;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClickKind {
    Left,
    Right,
    Middle,
    Double,
}

/// Everything the agent needs from a browser. Calls are request/response and
/// none of them is assumed idempotent. One surface backs exactly one agent.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    /// Inner size of the active tab's viewport in CSS pixels.
    async fn viewport_size(&self) -> Result<ViewportSize, AdapterError>;
    /// Encoded image of the active tab's viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, AdapterError>;
    async fn list_open_tabs(&self) -> Result<Vec<TabHandle>, AdapterError>;
    async fn active_tab(&self) -> Result<TabHandle, AdapterError>;
    async fn switch_to_tab(&self, handle: &TabHandle) -> Result<(), AdapterError>;
    async fn move_mouse(&self, to: Coordinate) -> Result<(), AdapterError>;
    /// Relative move from the current pointer position, clamped at the origin.
    async fn move_mouse_by(&self, dx: i32, dy: i32) -> Result<(), AdapterError>;
    /// Clicks at the current pointer position.
    async fn click(&self, kind: ClickKind) -> Result<(), AdapterError>;
    /// Presses at the current pointer position and releases at `to`.
    async fn drag_to(&self, to: Coordinate) -> Result<(), AdapterError>;
    async fn send_keys(&self, chords: &[KeyChord]) -> Result<(), AdapterError>;
    async fn scroll_by(&self, delta_y: i32) -> Result<(), AdapterError>;
    /// Evaluates a JavaScript expression in the active tab and returns its JSON value.
    async fn execute_script(&self, script: &str) -> Result<Value, AdapterError>;
}

#[derive(Debug, Default)]
struct SurfaceState {
    /// Target id of the active tab.
    current: Option<String>,
    pointer: (f64, f64),
}

/// [`ControlSurface`] over the Chromium DevTools Protocol.
pub struct CdpControlSurface {
    transport: Arc<dyn CdpTransport>,
    state: Mutex<SurfaceState>,
}

impl CdpControlSurface {
    pub fn with_transport(transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    /// Launches (or attaches to) Chromium and focuses its first page.
    pub async fn connect(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let transport = ChromiumTransport::launch(&cfg).await?;
        let surface = Self::with_transport(Arc::new(transport));
        surface.attach_initial().await?;
        Ok(surface)
    }

    /// Focuses the first open page, creating a blank one when none exists.
    pub async fn attach_initial(&self) -> Result<TabHandle, AdapterError> {
        let handle = match self.page_targets().await?.into_iter().next() {
            Some(handle) => handle,
            None => {
                let created = self
                    .send(
                        CommandTarget::Browser,
                        "Target.createTarget",
                        json!({ "url": "about:blank" }),
                    )
                    .await?;
                let target_id = created
                    .get("targetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AdapterError::new(AdapterErrorKind::Internal)
                            .with_hint("Target.createTarget returned no targetId")
                    })?;
                TabHandle::new(target_id)
            }
        };
        self.switch_to_tab(&handle).await?;
        Ok(handle)
    }

    /// Loads `url` in the active tab.
    pub async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        let response = self
            .send_to_tab("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error_text}"))
                .with_data(json!({ "url": url })));
        }
        info!(%url, "navigated");
        Ok(())
    }

    async fn page_targets(&self) -> Result<Vec<TabHandle>, AdapterError> {
        let response = self
            .send(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let infos = response
            .get("targetInfos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(infos
            .iter()
            .filter(|info| info.get("type").and_then(Value::as_str) == Some("page"))
            .filter(|info| {
                !info
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .starts_with("devtools://")
            })
            .filter_map(|info| info.get("targetId").and_then(Value::as_str))
            .map(TabHandle::new)
            .collect())
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        metrics::record_command(method);
        let start = Instant::now();
        match self.transport.send_command(target, method, params).await {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn send_to_tab(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let target_id = self.state.lock().await.current.clone().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("no tab attached for {method}"))
        })?;
        self.send(CommandTarget::Page(target_id), method, params)
            .await
    }

    async fn pointer(&self) -> (f64, f64) {
        self.state.lock().await.pointer
    }

    async fn set_pointer(&self, x: f64, y: f64) {
        self.state.lock().await.pointer = (x, y);
    }

    async fn dispatch_mouse(
        &self,
        event: &str,
        (x, y): (f64, f64),
        button: &str,
        click_count: u32,
    ) -> Result<(), AdapterError> {
        let buttons = match (event, button) {
            ("mouseReleased", _) => 0,
            (_, "left") => 1,
            (_, "right") => 2,
            (_, "middle") => 4,
            _ => 0,
        };
        self.send_to_tab(
            "Input.dispatchMouseEvent",
            json!({
                "type": event,
                "x": x,
                "y": y,
                "button": button,
                "buttons": buttons,
                "clickCount": click_count,
                "pointerType": "mouse",
            }),
        )
        .await
        .map(|_| ())
    }

    async fn dispatch_key(
        &self,
        event: &str,
        def: &KeyDefinition,
        modifiers: i64,
        with_text: bool,
    ) -> Result<(), AdapterError> {
        let mut payload = json!({
            "type": event,
            "key": def.key,
            "code": def.code,
            "windowsVirtualKeyCode": def.key_code,
            "nativeVirtualKeyCode": def.key_code,
            "modifiers": modifiers,
        });
        if with_text {
            if let Some(text) = &def.text {
                payload["text"] = json!(text);
                payload["unmodifiedText"] = json!(text);
            }
        }
        self.send_to_tab("Input.dispatchKeyEvent", payload)
            .await
            .map(|_| ())
    }

    async fn press_chord(&self, chord: &KeyChord) -> Result<(), AdapterError> {
        if chord.is_plain_text() {
            return self
                .send_to_tab("Input.insertText", json!({ "text": chord.plain_text() }))
                .await
                .map(|_| ());
        }

        let mut held = 0;
        for modifier in &chord.modifiers {
            held |= modifier.cdp_bit();
            self.dispatch_key("rawKeyDown", &modifier.definition(), held, false)
                .await?;
        }

        // Text is only produced when no command modifier (ctrl/alt/meta) is held.
        let produces_text = (held & !Modifier::Shift.cdp_bit()) == 0;
        for key in &chord.keys {
            let def = key.definition();
            let down = if produces_text && def.text.is_some() {
                "keyDown"
            } else {
                "rawKeyDown"
            };
            self.dispatch_key(down, &def, held, produces_text).await?;
            self.dispatch_key("keyUp", &def, held, false).await?;
        }

        for modifier in chord.release_order() {
            held &= !modifier.cdp_bit();
            self.dispatch_key("keyUp", &modifier.definition(), held, false)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ControlSurface for CdpControlSurface {
    async fn viewport_size(&self) -> Result<ViewportSize, AdapterError> {
        let value = self
            .execute_script("({ width: window.innerWidth, height: window.innerHeight })")
            .await?;
        let read = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_f64)
                .map(|v| v.max(1.0).round() as u32)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint(format!("viewport probe returned no {field}"))
                        .with_data(value.clone())
                })
        };
        Ok(ViewportSize::new(read("width")?, read("height")?))
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send_to_tab("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = response
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    async fn list_open_tabs(&self) -> Result<Vec<TabHandle>, AdapterError> {
        self.page_targets().await
    }

    async fn active_tab(&self) -> Result<TabHandle, AdapterError> {
        self.state
            .lock()
            .await
            .current
            .as_deref()
            .map(TabHandle::new)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint("no tab attached")
            })
    }

    async fn switch_to_tab(&self, handle: &TabHandle) -> Result<(), AdapterError> {
        self.send(
            CommandTarget::Browser,
            "Target.activateTarget",
            json!({ "targetId": handle.as_str() }),
        )
        .await?;

        debug!(tab = %handle, "switched tab");
        self.state.lock().await.current = Some(handle.as_str().to_string());
        Ok(())
    }

    async fn move_mouse(&self, to: Coordinate) -> Result<(), AdapterError> {
        let point = (f64::from(to.x), f64::from(to.y));
        self.dispatch_mouse("mouseMoved", point, "none", 0).await?;
        self.set_pointer(point.0, point.1).await;
        Ok(())
    }

    async fn move_mouse_by(&self, dx: i32, dy: i32) -> Result<(), AdapterError> {
        let (x, y) = self.pointer().await;
        let target = Coordinate::new(
            (x + f64::from(dx)).max(0.0).round() as u32,
            (y + f64::from(dy)).max(0.0).round() as u32,
        );
        self.move_mouse(target).await
    }

    async fn click(&self, kind: ClickKind) -> Result<(), AdapterError> {
        let point = self.pointer().await;
        let (button, presses) = match kind {
            ClickKind::Left => ("left", 1),
            ClickKind::Right => ("right", 1),
            ClickKind::Middle => ("middle", 1),
            ClickKind::Double => ("left", 2),
        };
        for click_count in 1..=presses {
            self.dispatch_mouse("mousePressed", point, button, click_count)
                .await?;
            self.dispatch_mouse("mouseReleased", point, button, click_count)
                .await?;
        }
        Ok(())
    }

    async fn drag_to(&self, to: Coordinate) -> Result<(), AdapterError> {
        let start = self.pointer().await;
        let end = (f64::from(to.x), f64::from(to.y));
        self.dispatch_mouse("mousePressed", start, "left", 1).await?;
        self.dispatch_mouse("mouseMoved", end, "left", 0).await?;
        self.dispatch_mouse("mouseReleased", end, "left", 1).await?;
        self.set_pointer(end.0, end.1).await;
        Ok(())
    }

    async fn send_keys(&self, chords: &[KeyChord]) -> Result<(), AdapterError> {
        for chord in chords {
            debug!(chord = %chord, "sending keys");
            self.press_chord(chord).await?;
        }
        Ok(())
    }

    async fn scroll_by(&self, delta_y: i32) -> Result<(), AdapterError> {
        let (x, y) = self.pointer().await;
        self.send_to_tab(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseWheel",
                "x": x,
                "y": y,
                "deltaX": 0,
                "deltaY": delta_y,
                "pointerType": "mouse",
            }),
        )
        .await
        .map(|_| ())
    }

    async fn execute_script(&self, script: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_to_tab(
                "Runtime.evaluate",
                json!({
                    "expression": script,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::Script)
                .with_hint(message)
                .with_data(details.clone()));
        }

        Ok(response
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }
}
