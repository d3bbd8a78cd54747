//! Page geometry.
//!
//! Page space is in points with a bottom-left origin and y growing upwards.
//! Surfaces are addressed in pixels with a top-left origin and y growing
//! downwards. Every conversion between the two goes through a [`PageViewport`].

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub page_width: f32,
    pub page_height: f32,
    pub scale: f32,
}

impl PageViewport {
    pub fn new(page_width: f32, page_height: f32, scale: f32) -> Self {
        Self {
            page_width,
            page_height,
            scale,
        }
    }

    pub fn width(&self) -> f32 {
        self.page_width * self.scale
    }

    pub fn height(&self) -> f32 {
        self.page_height * self.scale
    }

    pub fn pixel_width(&self) -> u32 {
        self.width().round().max(1.0) as u32
    }

    pub fn pixel_height(&self) -> u32 {
        self.height().round().max(1.0) as u32
    }

    pub fn convert_point(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, (self.page_height - y) * self.scale)
    }

    /// Converts `[x0, y0, x1, y1]` in page space to `[left, top, right, bottom]`
    /// in viewport space.
    pub fn convert_rect(&self, rect: [f32; 4]) -> [f32; 4] {
        let (ax, ay) = self.convert_point(rect[0], rect[1]);
        let (bx, by) = self.convert_point(rect[2], rect[3]);
        [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub display: PageViewport,
    pub device: PageViewport,
    pub pixel_ratio: f32,
}

impl PageGeometry {
    pub fn fit_to_width(
        page_width: f32,
        page_height: f32,
        layout_width: f32,
        device_pixel_ratio: f32,
        max_pixel_ratio: f32,
    ) -> Self {
        let display_scale = if page_width > 0.0 {
            layout_width / page_width
        } else {
            1.0
        };
        let pixel_ratio = capped_pixel_ratio(device_pixel_ratio, max_pixel_ratio);
        Self {
            display: PageViewport::new(page_width, page_height, display_scale),
            device: PageViewport::new(page_width, page_height, display_scale * pixel_ratio),
            pixel_ratio,
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.device.pixel_width(), self.device.pixel_height())
    }

    pub fn css_size(&self) -> (f32, f32) {
        (self.display.width(), self.display.height())
    }
}

pub fn capped_pixel_ratio(ratio: f32, max: f32) -> f32 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 1.0;
    }
    ratio.min(max.max(1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    /// Rounds `[left, top, right, bottom]` outwards and clamps it to the surface.
    pub fn from_bounds(bounds: [f32; 4], width: u32, height: u32) -> Option<Self> {
        if bounds.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let clamp_x = |v: f32| v.clamp(0.0, width as f32) as u32;
        let clamp_y = |v: f32| v.clamp(0.0, height as f32) as u32;
        let rect = Self {
            x0: clamp_x(bounds[0].floor()),
            y0: clamp_y(bounds[1].floor()),
            x1: clamp_x(bounds[2].ceil()),
            y1: clamp_y(bounds[3].ceil()),
        };
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) as f32 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_to_width_separates_layout_from_raster() {
        // US letter at 800 CSS px wide on a 2x display.
        let geometry = PageGeometry::fit_to_width(612.0, 792.0, 800.0, 2.0, 3.0);
        let (css_w, css_h) = geometry.css_size();
        let (px_w, px_h) = geometry.pixel_size();

        assert!((css_w - 800.0).abs() < 1e-3);
        assert_eq!(px_w, (css_w * 2.0).round() as u32);
        assert_eq!(px_h, (css_h * 2.0).round() as u32);
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let geometry = PageGeometry::fit_to_width(612.0, 792.0, 400.0, 4.5, 3.0);
        assert_eq!(geometry.pixel_ratio, 3.0);
        assert_eq!(geometry.pixel_size().0, 1200);
        assert_eq!(capped_pixel_ratio(f32::NAN, 3.0), 1.0);
        assert_eq!(capped_pixel_ratio(0.75, 3.0), 0.75);
    }

    #[test]
    fn convert_rect_flips_the_y_axis() {
        let viewport = PageViewport::new(100.0, 200.0, 2.0);
        // A glyph band sitting 10pt above the bottom edge.
        let rect = viewport.convert_rect([10.0, 10.0, 30.0, 22.0]);
        assert_eq!(rect, [20.0, 356.0, 60.0, 380.0]);
    }

    #[test]
    fn pixel_rect_is_clamped_to_surface() {
        let rect = PixelRect::from_bounds([-5.0, 2.2, 12.5, 40.0], 10, 20).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x0: 0,
                y0: 2,
                x1: 10,
                y1: 20
            }
        );
        assert!(PixelRect::from_bounds([5.0, 5.0, 5.0, 9.0], 10, 10).is_none());
    }
}
