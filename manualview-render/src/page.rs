use anyhow::{Context, Result};
use manualview_core::{
    Color, DocumentBackend, PageGeometry, PixelRect, RenderRequest, SearchMatch, Surface,
};

const PAPER: Color = Color::rgb(0xFF, 0xFF, 0xFF);

/// One page's layer stack: raster at the bottom, search highlight above it, ink on top.
///
/// All three surfaces are allocated together from the page's device viewport and
/// always share pixel dimensions.
#[derive(Debug)]
pub struct PageRenderUnit {
    pub page: u32,
    pub geometry: PageGeometry,
    raster: Surface,
    highlight: Surface,
    ink: Surface,
    failure: Option<String>,
}

impl PageRenderUnit {
    pub fn allocate(page: u32, geometry: PageGeometry) -> Self {
        let (width, height) = geometry.pixel_size();
        let (css_width, css_height) = geometry.css_size();
        Self {
            page,
            geometry,
            raster: Surface::filled(width, height, css_width, css_height, PAPER),
            highlight: Surface::transparent(width, height, css_width, css_height),
            ink: Surface::transparent(width, height, css_width, css_height),
            failure: None,
        }
    }

    pub fn rasterize(&mut self, backend: &dyn DocumentBackend) -> Result<()> {
        let request = RenderRequest {
            page_index: self.page as usize - 1,
            width: self.raster.width,
            height: self.raster.height,
        };
        let image = backend
            .render_page(request)
            .with_context(|| format!("failed to render page {}", self.page))?;
        self.raster.copy_from_image(&image);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn raster(&self) -> &Surface {
        &self.raster
    }

    pub fn highlight(&self) -> &Surface {
        &self.highlight
    }

    pub fn ink(&self) -> &Surface {
        &self.ink
    }

    pub(crate) fn ink_mut(&mut self) -> &mut Surface {
        &mut self.ink
    }

    pub fn css_to_surface(&self, x: f32, y: f32) -> (f32, f32) {
        let ratio = self.ink.pixel_ratio();
        (x * ratio, y * ratio)
    }

    pub fn clear_highlight(&mut self) {
        self.highlight.clear();
    }

    pub fn highlight_match(&mut self, found: &SearchMatch, color: Color) -> Option<PixelRect> {
        self.highlight.clear();
        let bounds = self.geometry.device.convert_rect(found.glyph_rect());
        let rect = PixelRect::from_bounds(bounds, self.highlight.width, self.highlight.height)?;
        self.highlight.fill_rect(rect, color);
        Some(rect)
    }

    pub fn composite(&self) -> Surface {
        let mut out = self.raster.clone();
        out.composite(&self.highlight);
        out.composite(&self.ink);
        out
    }
}
