//! Scrollbar and cursor overlay.
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use pilot_core_types::{Coordinate, ScrollIndicator};

/// Below this size (either axis) the overlay geometry degenerates.
pub const MIN_ANNOTATABLE_PX: u32 = 20;
pub const SCROLLBAR_WIDTH: u32 = 10;
/// 70% opaque mid-gray.
pub const SCROLLBAR_COLOR: Rgba<u8> = Rgba([128, 128, 128, 179]);

/// Arrow outline relative to its tip, which sits on the mouse position.
const ARROW: [(i32, i32); 7] = [(0, 0), (0, 16), (4, 12), (7, 19), (9, 18), (6, 11), (11, 11)];

#[derive(Clone, Debug)]
pub struct ScreenshotAnnotator {
    pub scrollbar_width: u32,
    pub scrollbar_color: Rgba<u8>,
    pub cursor_fill: Rgba<u8>,
    pub cursor_outline: Rgba<u8>,
}

impl Default for ScreenshotAnnotator {
    fn default() -> Self {
        Self {
            scrollbar_width: SCROLLBAR_WIDTH,
            scrollbar_color: SCROLLBAR_COLOR,
            cursor_fill: Rgba([0, 0, 0, 255]),
            cursor_outline: Rgba([255, 255, 255, 255]),
        }
    }
}

impl ScreenshotAnnotator {
    /// Returns a copy of `image` with the scrollbar and cursor drawn on it.
    /// `mouse` must be in the image's own pixel space. Images smaller than
    /// [`MIN_ANNOTATABLE_PX`] come back unchanged.
    pub fn annotate(
        &self,
        image: &RgbaImage,
        mouse: Coordinate,
        scroll: ScrollIndicator,
    ) -> RgbaImage {
        let mut marked = image.clone();
        if image.width() < MIN_ANNOTATABLE_PX || image.height() < MIN_ANNOTATABLE_PX {
            tracing::debug!(
                width = image.width(),
                height = image.height(),
                "screenshot too small to annotate"
            );
            return marked;
        }
        self.draw_scrollbar(&mut marked, scroll);
        self.draw_cursor(&mut marked, mouse);
        marked
    }

    fn draw_scrollbar(&self, image: &mut RgbaImage, scroll: ScrollIndicator) {
        let (width, height) = image.dimensions();
        let bar_width = self.scrollbar_width.min(width);
        let top = ((f64::from(height) * scroll.offset).floor() as u32).min(height);
        let bar_height = ((f64::from(height) * scroll.height).floor() as u32).min(height - top);

        for y in top..top + bar_height {
            for x in width - bar_width..width {
                image.get_pixel_mut(x, y).blend(&self.scrollbar_color);
            }
        }
    }

    fn draw_cursor(&self, image: &mut RgbaImage, mouse: Coordinate) {
        let tip = (mouse.x as i32, mouse.y as i32);
        let points: Vec<Point<i32>> = ARROW
            .iter()
            .map(|(dx, dy)| Point::new(tip.0 + dx, tip.1 + dy))
            .collect();
        draw_polygon_mut(image, &points, self.cursor_fill);

        for (i, start) in points.iter().enumerate() {
            let end = points[(i + 1) % points.len()];
            draw_line_segment_mut(
                image,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                self.cursor_outline,
            );
        }
    }
}
