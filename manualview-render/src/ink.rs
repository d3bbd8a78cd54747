use manualview_core::{Color, Surface};

use crate::page::PageRenderUnit;

#[derive(Debug, Clone, Copy)]
struct Stroke {
    page: u32,
    last: (f32, f32),
    color: Color,
}

/// Freehand drawing state. A stroke keeps the color it started with and only
/// extends on the page it began on.
#[derive(Debug, Clone)]
pub struct InkState {
    enabled: bool,
    color: Color,
    width: f32,
    stroke: Option<Stroke>,
}

impl InkState {
    pub fn new(color: Color, width: f32) -> Self {
        Self {
            enabled: false,
            color,
            width,
            stroke: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn set_mode(&mut self, enabled: bool, color: Color) {
        self.enabled = enabled;
        self.color = color;
        if !enabled {
            self.stroke = None;
        }
    }

    pub fn begin(&mut self, unit: &PageRenderUnit, x: f32, y: f32) {
        if !self.enabled {
            return;
        }
        self.stroke = Some(Stroke {
            page: unit.page,
            last: unit.css_to_surface(x, y),
            color: self.color,
        });
    }

    pub fn extend(&mut self, unit: &mut PageRenderUnit, x: f32, y: f32) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(stroke) = self.stroke.as_mut() else {
            return false;
        };
        if stroke.page != unit.page {
            return false;
        }
        let to = unit.css_to_surface(x, y);
        let width = self.width * unit.ink().pixel_ratio();
        let painted = stroke_segment(unit.ink_mut(), stroke.last, to, width, stroke.color);
        stroke.last = to;
        painted
    }

    pub fn end(&mut self) {
        self.stroke = None;
    }
}

/// Paints a round-capped segment of `width` pixels. Returns whether any pixel was touched.
pub fn stroke_segment(
    surface: &mut Surface,
    from: (f32, f32),
    to: (f32, f32),
    width: f32,
    color: Color,
) -> bool {
    let radius = (width / 2.0).max(0.5);
    let min_x = (from.0.min(to.0) - radius).floor().max(0.0);
    let min_y = (from.1.min(to.1) - radius).floor().max(0.0);
    let max_x = (from.0.max(to.0) + radius).ceil().min(surface.width as f32);
    let max_y = (from.1.max(to.1) + radius).ceil().min(surface.height as f32);
    if min_x >= max_x || min_y >= max_y {
        return false;
    }

    let mut painted = false;
    for py in min_y as u32..max_y as u32 {
        for px in min_x as u32..max_x as u32 {
            let center = (px as f32 + 0.5, py as f32 + 0.5);
            if distance_to_segment(center, from, to) <= radius {
                surface.blend_pixel(px, py, color);
                painted = true;
            }
        }
    }
    painted
}

fn distance_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use manualview_core::PageGeometry;

    const BLUE: Color = Color::rgb(0, 0, 255);
    const RED: Color = Color::rgb(255, 0, 0);

    fn unit(page: u32) -> PageRenderUnit {
        PageRenderUnit::allocate(page, PageGeometry::fit_to_width(100.0, 100.0, 100.0, 2.0, 3.0))
    }

    #[test]
    fn disabled_ink_paints_nothing() {
        let mut ink = InkState::new(RED, 3.0);
        let mut page = unit(1);
        ink.begin(&page, 10.0, 10.0);
        assert!(!ink.extend(&mut page, 50.0, 50.0));
        assert!(page.ink().is_blank());
    }

    #[test]
    fn stroke_keeps_its_starting_color() {
        let mut ink = InkState::new(RED, 3.0);
        ink.set_mode(true, BLUE);
        let mut page = unit(1);

        ink.begin(&page, 10.0, 10.0);
        ink.set_mode(true, RED);
        assert!(ink.extend(&mut page, 40.0, 10.0));
        ink.end();

        // (25, 10) CSS is (50, 20) on a 2x surface.
        assert_eq!(page.ink().pixel(50, 20), Some([0, 0, 255, 255]));
        assert!(page.raster().pixel(50, 20) == Some([255, 255, 255, 255]));
    }

    #[test]
    fn stroke_width_scales_with_pixel_ratio() {
        let mut ink = InkState::new(RED, 3.0);
        ink.set_mode(true, RED);
        let mut page = unit(1);
        ink.begin(&page, 10.0, 50.0);
        ink.extend(&mut page, 90.0, 50.0);

        // 3 CSS px at 2x is a 6 px band around y = 100.
        assert!(page.ink().pixel(100, 97).is_some_and(|px| px[3] != 0));
        assert!(page.ink().pixel(100, 102).is_some_and(|px| px[3] != 0));
        assert_eq!(page.ink().pixel(100, 110), Some([0, 0, 0, 0]));
    }

    #[test]
    fn moves_on_another_page_are_ignored() {
        let mut ink = InkState::new(RED, 3.0);
        ink.set_mode(true, RED);
        let first = unit(1);
        let mut second = unit(2);
        ink.begin(&first, 10.0, 10.0);
        assert!(!ink.extend(&mut second, 20.0, 20.0));
        assert!(second.ink().is_blank());
    }

    #[test]
    fn disabling_drops_the_active_stroke() {
        let mut ink = InkState::new(RED, 3.0);
        ink.set_mode(true, RED);
        let page = unit(1);
        ink.begin(&page, 10.0, 10.0);
        assert!(ink.is_stroking());
        ink.set_mode(false, RED);
        assert!(!ink.is_stroking());
    }
}
