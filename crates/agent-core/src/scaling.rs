//! Conversion between browser viewport pixels and the planner's canvas.
//!
//! The planner perceives every screenshot at a bounded resolution. A viewport
//! is aspect-fit into that canvas and every coordinate crossing the boundary
//! goes through [`Scaling`]. Both directions use integer round-half-up so the
//! round-trip error stays within one pixel per axis while the scale factor
//! is at most 2.

use pilot_core_types::{Coordinate, ViewportSize};
use serde::{Deserialize, Serialize};

/// Upper bound for the image size the planner is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerCanvas {
    pub width: u32,
    pub height: u32,
}

impl PlannerCanvas {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for PlannerCanvas {
    fn default() -> Self {
        Self::new(1280, 800)
    }
}

/// Aspect-fit mapping for one viewport size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scaling {
    browser: ViewportSize,
    planner: ViewportSize,
}

impl Scaling {
    /// Fits `viewport` into `canvas`, preserving its aspect ratio. One planner
    /// dimension always equals the canvas bound; small viewports are scaled up.
    pub fn fit(viewport: ViewportSize, canvas: PlannerCanvas) -> Self {
        let browser = ViewportSize::new(viewport.width.max(1), viewport.height.max(1));
        let (bw, bh) = (browser.width as u64, browser.height as u64);
        let (cw, ch) = (canvas.width.max(1) as u64, canvas.height.max(1) as u64);

        let (w, h) = if bw * ch >= bh * cw {
            (cw, round_div(bh * cw, bw).clamp(1, ch))
        } else {
            (round_div(bw * ch, bh).clamp(1, cw), ch)
        };

        Self {
            browser,
            planner: ViewportSize::new(w as u32, h as u32),
        }
    }

    pub fn browser_size(&self) -> ViewportSize {
        self.browser
    }

    pub fn planner_size(&self) -> ViewportSize {
        self.planner
    }

    /// Browser pixels per planner pixel, per axis.
    pub fn ratio(&self) -> (f64, f64) {
        (
            self.browser.width as f64 / self.planner.width as f64,
            self.browser.height as f64 / self.planner.height as f64,
        )
    }

    pub fn to_planner_space(&self, point: Coordinate) -> Coordinate {
        Coordinate::new(
            rescale(point.x, self.planner.width, self.browser.width),
            rescale(point.y, self.planner.height, self.browser.height),
        )
    }

    pub fn to_browser_space(&self, point: Coordinate) -> Coordinate {
        Coordinate::new(
            rescale(point.x, self.browser.width, self.planner.width),
            rescale(point.y, self.browser.height, self.planner.height),
        )
    }
}

/// `round(value * to / from)` clamped to `[1, to]`.
fn rescale(value: u32, to: u32, from: u32) -> u32 {
    let scaled = round_div(value as u64 * to as u64, from as u64);
    scaled.clamp(1, to as u64) as u32
}

/// Integer division rounding halves up.
fn round_div(num: u64, den: u64) -> u64 {
    (2 * num + den) / (2 * den)
}
