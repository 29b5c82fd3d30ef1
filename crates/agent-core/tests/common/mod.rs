//! In-memory browser used by the agent-core integration tests.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Mutex;

use agent_core::agent_loop::snapshot::{
    PROBE_INSTALL_SCRIPT, PROBE_READ_SCRIPT, SCROLL_SCRIPT, TAB_META_SCRIPT,
};
use agent_core::planner::{ContentBlock, PlannerReply};
use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, ClickKind, ControlSurface, KeyChord};
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use pilot_core_types::{Coordinate, TabHandle, ViewportSize};
use serde_json::{json, Value};

#[derive(Clone, Debug)]
pub struct FakeTab {
    pub handle: TabHandle,
    pub url: String,
    pub title: String,
}

#[derive(Debug)]
struct Inner {
    tabs: Vec<FakeTab>,
    active: usize,
    viewport: ViewportSize,
    pointer: (i64, i64),
    probe_armed: bool,
    probe_seen: Option<(i64, i64)>,
    probe_works: bool,
    scroll: (f64, f64),
    fail_on: Option<String>,
    calls: Vec<String>,
}

/// Records every call as a short string such as `click:left` or `switch:B`.
#[derive(Debug)]
pub struct FakeBrowser {
    inner: Mutex<Inner>,
}

impl FakeBrowser {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tabs: vec![FakeTab {
                    handle: TabHandle::new("A"),
                    url: "https://example.com/".into(),
                    title: "Example".into(),
                }],
                active: 0,
                viewport: ViewportSize::new(width, height),
                pointer: (0, 0),
                probe_armed: false,
                probe_seen: None,
                probe_works: true,
                scroll: (0.0, 0.5),
                fail_on: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn open_tab(&self, handle: &str, url: &str, title: &str) {
        self.inner.lock().unwrap().tabs.push(FakeTab {
            handle: TabHandle::new(handle),
            url: url.into(),
            title: title.into(),
        });
    }

    pub fn close_tab(&self, handle: &str) {
        let mut inner = self.inner.lock().unwrap();
        let active = inner.tabs[inner.active].handle.clone();
        inner.tabs.retain(|tab| tab.handle.as_str() != handle);
        inner.active = inner
            .tabs
            .iter()
            .position(|tab| tab.handle == active)
            .unwrap_or(0);
    }

    pub fn activate(&self, handle: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.active = inner
            .tabs
            .iter()
            .position(|tab| tab.handle.as_str() == handle)
            .expect("unknown tab");
    }

    pub fn active_handle(&self) -> TabHandle {
        let inner = self.inner.lock().unwrap();
        inner.tabs[inner.active].handle.clone()
    }

    pub fn set_probe_works(&self, works: bool) {
        self.inner.lock().unwrap().probe_works = works;
    }

    pub fn set_pointer(&self, x: i64, y: i64) {
        self.inner.lock().unwrap().pointer = (x, y);
    }

    pub fn pointer(&self) -> (i64, i64) {
        self.inner.lock().unwrap().pointer
    }

    /// The next call whose record starts with `prefix` fails with a CDP error.
    pub fn fail_on(&self, prefix: &str) {
        self.inner.lock().unwrap().fail_on = Some(prefix.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Calls that change the page, without the snapshot bookkeeping.
    pub fn actions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                ["click:", "move:", "drag:", "keys:", "scroll:"]
                    .iter()
                    .any(|prefix| call.starts_with(prefix))
            })
            .collect()
    }

    fn record(&self, call: String) -> Result<(), AdapterError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(prefix) = inner.fail_on.clone() {
            if call.starts_with(&prefix) {
                inner.fail_on = None;
                return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("element not interactable"));
            }
        }
        inner.calls.push(call);
        Ok(())
    }

    fn move_pointer(&self, x: i64, y: i64) {
        let mut inner = self.inner.lock().unwrap();
        let x = x.clamp(0, inner.viewport.width as i64);
        let y = y.clamp(0, inner.viewport.height as i64);
        inner.pointer = (x, y);
        if inner.probe_armed && inner.probe_works {
            inner.probe_seen = Some((x, y));
        }
    }
}

#[async_trait]
impl ControlSurface for FakeBrowser {
    async fn viewport_size(&self) -> Result<ViewportSize, AdapterError> {
        self.record("viewport".into())?;
        Ok(self.inner.lock().unwrap().viewport)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        self.record("screenshot".into())?;
        let viewport = self.inner.lock().unwrap().viewport;
        Ok(png(viewport.width, viewport.height))
    }

    async fn list_open_tabs(&self) -> Result<Vec<TabHandle>, AdapterError> {
        self.record("tabs".into())?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tabs
            .iter()
            .map(|tab| tab.handle.clone())
            .collect())
    }

    async fn active_tab(&self) -> Result<TabHandle, AdapterError> {
        self.record("active".into())?;
        Ok(self.active_handle())
    }

    async fn switch_to_tab(&self, handle: &TabHandle) -> Result<(), AdapterError> {
        self.record(format!("switch:{}", handle))?;
        let mut inner = self.inner.lock().unwrap();
        match inner.tabs.iter().position(|tab| tab.handle == *handle) {
            Some(index) => {
                inner.active = index;
                Ok(())
            }
            None => Err(AdapterError::new(AdapterErrorKind::TargetNotFound)),
        }
    }

    async fn move_mouse(&self, to: Coordinate) -> Result<(), AdapterError> {
        self.record(format!("move:{},{}", to.x, to.y))?;
        self.move_pointer(to.x as i64, to.y as i64);
        Ok(())
    }

    async fn move_mouse_by(&self, dx: i32, dy: i32) -> Result<(), AdapterError> {
        self.record(format!("nudge:{},{}", dx, dy))?;
        let (x, y) = self.pointer();
        self.move_pointer(x + dx as i64, y + dy as i64);
        Ok(())
    }

    async fn click(&self, kind: ClickKind) -> Result<(), AdapterError> {
        let name = match kind {
            ClickKind::Left => "left",
            ClickKind::Right => "right",
            ClickKind::Middle => "middle",
            ClickKind::Double => "double",
        };
        self.record(format!("click:{}", name))
    }

    async fn drag_to(&self, to: Coordinate) -> Result<(), AdapterError> {
        self.record(format!("drag:{},{}", to.x, to.y))?;
        self.move_pointer(to.x as i64, to.y as i64);
        Ok(())
    }

    async fn send_keys(&self, chords: &[KeyChord]) -> Result<(), AdapterError> {
        let rendered: Vec<String> = chords
            .iter()
            .map(|chord| {
                if chord.is_plain_text() {
                    chord.plain_text()
                } else {
                    chord.to_string()
                }
            })
            .collect();
        self.record(format!("keys:{}", rendered.join(" ")))
    }

    async fn scroll_by(&self, delta_y: i32) -> Result<(), AdapterError> {
        self.record(format!("scroll:{}", delta_y))
    }

    async fn execute_script(&self, script: &str) -> Result<Value, AdapterError> {
        let mut inner = self.inner.lock().unwrap();
        let value = if script == TAB_META_SCRIPT {
            let tab = &inner.tabs[inner.active];
            json!({ "title": tab.title, "url": tab.url })
        } else if script == PROBE_INSTALL_SCRIPT {
            inner.probe_armed = true;
            inner.probe_seen = None;
            json!(true)
        } else if script == PROBE_READ_SCRIPT {
            match inner.probe_seen {
                Some((x, y)) => json!([x, y]),
                None => Value::Null,
            }
        } else if script == SCROLL_SCRIPT {
            json!([inner.scroll.0, inner.scroll.1])
        } else {
            Value::Null
        };
        inner.calls.push("script".into());
        Ok(value)
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([250, 250, 250, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

pub fn reply(content: Vec<ContentBlock>) -> PlannerReply {
    PlannerReply {
        content,
        usage: None,
    }
}

pub fn computer(id: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: "computer".into(),
        input,
    }
}

pub fn tool(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input,
    }
}
