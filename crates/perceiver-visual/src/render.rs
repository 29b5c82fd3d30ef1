//! Screenshot preparation pipeline for the planner.
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageOutputFormat};
use pilot_core_types::{Coordinate, ScrollIndicator, ViewportSize};

use crate::annotate::ScreenshotAnnotator;
use crate::errors::VisualError;

/// Inputs for one planner-ready image.
#[derive(Clone, Copy, Debug)]
pub struct RenderRequest {
    /// Browser viewport in CSS pixels; the raw capture may be larger on HiDPI screens.
    pub viewport: ViewportSize,
    /// Browser-space pointer position.
    pub mouse: Coordinate,
    pub scroll: ScrollIndicator,
    /// Planner canvas size the image is delivered at.
    pub target: ViewportSize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannerImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes `raw`, normalizes it to the viewport size, annotates it and
/// resizes it to the planner canvas.
pub fn render_for_planner(
    raw: &[u8],
    request: &RenderRequest,
    annotator: &ScreenshotAnnotator,
) -> Result<PlannerImage, VisualError> {
    if request.target.width == 0 || request.target.height == 0 {
        return Err(VisualError::InvalidInput(format!(
            "planner canvas must be non-empty, got {}x{}",
            request.target.width, request.target.height
        )));
    }

    let mut image = image::load_from_memory(raw)?.to_rgba8();

    let viewport = request.viewport;
    if viewport.width > 0
        && viewport.height > 0
        && image.dimensions() != (viewport.width, viewport.height)
    {
        image = imageops::resize(&image, viewport.width, viewport.height, FilterType::Triangle);
    }

    let marked = annotator.annotate(&image, request.mouse, request.scroll);

    let resized = if marked.dimensions() == (request.target.width, request.target.height) {
        marked
    } else {
        imageops::resize(
            &marked,
            request.target.width,
            request.target.height,
            FilterType::Lanczos3,
        )
    };

    let (width, height) = resized.dimensions();
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(resized).write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;

    tracing::trace!(width, height, bytes = png.len(), "rendered planner screenshot");
    Ok(PlannerImage { png, width, height })
}
