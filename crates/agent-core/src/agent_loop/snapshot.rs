//! Point-in-time browser snapshots and the stable tab id registry.

use std::collections::HashMap;
use std::time::Duration;

use cdp_adapter::{AdapterError, ControlSurface};
use pilot_core_types::{BrowserState, Coordinate, ScrollIndicator, Tab, TabHandle, ViewportSize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::AgentError;

/// Reads the title and URL of the attached tab.
pub const TAB_META_SCRIPT: &str = "({ title: document.title, url: location.href })";

/// Installs the pointer listener once per document and arms it.
pub const PROBE_INSTALL_SCRIPT: &str = r#"(() => {
  if (!window.__pilotPointer) {
    window.__pilotPointer = { seen: false, x: 0, y: 0 };
    document.addEventListener('mousemove', (e) => {
      window.__pilotPointer = { seen: true, x: e.clientX, y: e.clientY };
    }, { capture: true, passive: true });
  }
  window.__pilotPointer.seen = false;
  return true;
})()"#;

/// Last pointer position seen since the probe was armed, or null.
pub const PROBE_READ_SCRIPT: &str =
    "(() => { const p = window.__pilotPointer; return p && p.seen ? [p.x, p.y] : null; })()";

/// `[offset, height]` as fractions of the full page height.
pub const SCROLL_SCRIPT: &str = "(() => { const h = Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0, 1); return [window.pageYOffset / h, window.innerHeight / h]; })()";

/// Probe nudge in CSS pixels.
const PROBE_NUDGE: i32 = 3;

/// Assigns each tab handle an integer id the first time it is seen. Ids start
/// at 0, only grow, and are never reused even after the tab closes.
#[derive(Debug, Default, Clone)]
pub struct TabRegistry {
    ids: HashMap<TabHandle, u32>,
    next: u32,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle's id and whether this call assigned it.
    pub fn observe(&mut self, handle: &TabHandle) -> (u32, bool) {
        if let Some(id) = self.ids.get(handle) {
            return (*id, false);
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(handle.clone(), id);
        (id, true)
    }

    pub fn stable_id(&self, handle: &TabHandle) -> Option<u32> {
        self.ids.get(handle).copied()
    }

    pub fn handle_for(&self, stable_id: u32) -> Option<&TabHandle> {
        self.ids
            .iter()
            .find(|(_, id)| **id == stable_id)
            .map(|(handle, _)| handle)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Builds [`BrowserState`] values from the control surface.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    probe_settle: Duration,
    last_mouse: Option<Coordinate>,
}

impl SnapshotBuilder {
    pub fn new(probe_settle: Duration) -> Self {
        Self {
            probe_settle,
            last_mouse: None,
        }
    }

    /// Captures tabs, viewport, pointer, scroll position and a screenshot.
    /// The active tab is the same before and after the call, even on error.
    pub async fn capture(
        &mut self,
        surface: &dyn ControlSurface,
        registry: &mut TabRegistry,
    ) -> Result<BrowserState, AgentError> {
        let active = surface.active_tab().await?;
        let handles = surface.list_open_tabs().await?;

        let mut attached = active.clone();
        let described = async {
            let mut tabs = Vec::with_capacity(handles.len());
            for handle in &handles {
                if *handle != attached {
                    surface.switch_to_tab(handle).await?;
                    attached = handle.clone();
                }
                let meta = surface.execute_script(TAB_META_SCRIPT).await?;
                let (stable_id, is_new) = registry.observe(handle);
                tabs.push(Tab {
                    handle: handle.clone(),
                    url: string_field(&meta, "url"),
                    title: string_field(&meta, "title"),
                    is_active: *handle == active,
                    is_new,
                    stable_id,
                });
            }
            Ok::<_, AdapterError>(tabs)
        }
        .await;

        if attached != active {
            surface.switch_to_tab(&active).await?;
        }
        let tabs = described?;

        let viewport = surface.viewport_size().await?;
        let mouse = self.probe_mouse(surface, viewport).await?;
        let scroll = read_scroll(surface).await?;
        let screenshot = surface.capture_screenshot().await?;

        debug!(
            tabs = tabs.len(),
            width = viewport.width,
            height = viewport.height,
            mouse = %mouse,
            "captured browser state"
        );
        self.last_mouse = Some(mouse);

        Ok(BrowserState {
            screenshot,
            viewport,
            scroll,
            tabs,
            active_tab: active,
            mouse,
        })
    }

    /// Arms a mousemove listener, nudges the pointer out and back, then reads
    /// where the page saw it.
    async fn probe_mouse(
        &self,
        surface: &dyn ControlSurface,
        viewport: ViewportSize,
    ) -> Result<Coordinate, AgentError> {
        surface.execute_script(PROBE_INSTALL_SCRIPT).await?;
        surface.move_mouse_by(PROBE_NUDGE, PROBE_NUDGE).await?;
        surface.move_mouse_by(-PROBE_NUDGE, -PROBE_NUDGE).await?;
        if !self.probe_settle.is_zero() {
            tokio::time::sleep(self.probe_settle).await;
        }

        let observed = surface.execute_script(PROBE_READ_SCRIPT).await?;
        let point = match pair(&observed) {
            Some((x, y)) => Coordinate::new(to_pixel(x), to_pixel(y)),
            None => {
                let fallback = self.last_mouse.unwrap_or_default();
                warn!(fallback = %fallback, "pointer probe saw no mousemove");
                fallback
            }
        };

        Ok(Coordinate::new(
            point.x.min(viewport.width),
            point.y.min(viewport.height),
        ))
    }
}

async fn read_scroll(surface: &dyn ControlSurface) -> Result<ScrollIndicator, AgentError> {
    let value = surface.execute_script(SCROLL_SCRIPT).await?;
    Ok(match pair(&value) {
        Some((offset, height)) => ScrollIndicator::new(offset, height),
        None => {
            warn!(value = %value, "unexpected scroll metrics");
            ScrollIndicator::full_page()
        }
    })
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn pair(value: &Value) -> Option<(f64, f64)> {
    let items = value.as_array()?;
    match items.as_slice() {
        [a, b] => Some((a.as_f64()?, b.as_f64()?)),
        _ => None,
    }
}

fn to_pixel(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}
