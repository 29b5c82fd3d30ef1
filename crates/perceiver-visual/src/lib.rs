//! Visual Perceiver - prepares browser screenshots for a vision planner
//!
//! Screenshots are normalized to the viewport size, marked with a scrollbar
//! indicator and a cursor glyph, then resized to the planner canvas.

pub mod annotate;
pub mod errors;
pub mod render;

// Re-exports
pub use annotate::ScreenshotAnnotator;
pub use errors::VisualError;
pub use render::{render_for_planner, PlannerImage, RenderRequest};
