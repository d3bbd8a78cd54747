use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

pub mod config;
pub mod error;
pub mod favorites;
pub mod geometry;
pub mod protocol;
pub mod search;
pub mod share;
pub mod source;

pub use config::{InkConfig, ViewerConfig};
pub use error::ViewerError;
pub use geometry::{PageGeometry, PageViewport, PixelRect};
pub use protocol::{bridge, EngineEvent, EnginePort, HostCommand, HostPort, NavDirection, PointerPhase};
pub use search::{MatchList, SearchMatch, SearchSummary};
pub use source::{DocumentId, DocumentSource};

/// A run of text as extracted from a page, in glyph space (points, bottom-left origin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    /// `[a, b, c, d, e, f]`: `(e, f)` is the baseline origin, `(a, b)` the
    /// direction text advances in and `(c, d)` the direction it rises in.
    /// Only the directions are used; `width` and `height` carry the size.
    pub transform: [f32; 6],
    pub width: f32,
    pub height: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            text: text.into(),
            transform: [1.0, 0.0, 0.0, 1.0, x, y],
            width,
            height,
        }
    }

    pub fn with_transform(mut self, transform: [f32; 6]) -> Self {
        self.transform = transform;
        self
    }

    pub fn origin(&self) -> (f32, f32) {
        (self.transform[4], self.transform[5])
    }

    pub fn point_at(&self, along: f32, up: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.transform;
        let (ax, ay) = unit_or(a, b, (1.0, 0.0));
        let (ux, uy) = unit_or(c, d, (0.0, 1.0));
        (e + ax * along + ux * up, f + ay * along + uy * up)
    }
}

fn unit_or(x: f32, y: f32, fallback: (f32, f32)) -> (f32, f32) {
    let len = x.hypot(y);
    if len > f32::EPSILON {
        (x / len, y / len)
    } else {
        fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02X}{:02X}{:02X}{:02X}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl FromStr for Color {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViewerError::InvalidColor(s.to_owned());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }
}

#[derive(Clone, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub css_width: f32,
    pub css_height: f32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("css_width", &self.css_width)
            .field("css_height", &self.css_height)
            .finish_non_exhaustive()
    }
}

impl Surface {
    pub fn transparent(width: u32, height: u32, css_width: f32, css_height: f32) -> Self {
        Self {
            width,
            height,
            css_width,
            css_height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn filled(width: u32, height: u32, css_width: f32, css_height: f32, color: Color) -> Self {
        let mut surface = Self::transparent(width, height, css_width, css_height);
        for px in surface.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color.to_array());
        }
        surface
    }

    pub fn pixel_ratio(&self) -> f32 {
        if self.css_width > 0.0 {
            self.width as f32 / self.css_width
        } else {
            1.0
        }
    }

    pub fn same_dimensions(&self, other: &Surface) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }

    pub fn painted_pixels(&self) -> usize {
        self.pixels.chunks_exact(4).filter(|px| px[3] != 0).count()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let mut out = [0; 4];
        out.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(out)
    }

    pub fn blend_pixel(&mut self, x: u32, y: u32, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        blend_over(&mut self.pixels[idx..idx + 4], color.to_array());
    }

    pub fn fill_rect(&mut self, rect: PixelRect, color: Color) {
        let x1 = rect.x1.min(self.width);
        let y1 = rect.y1.min(self.height);
        for y in rect.y0.min(y1)..y1 {
            for x in rect.x0.min(x1)..x1 {
                self.blend_pixel(x, y, color);
            }
        }
    }

    pub fn copy_from_image(&mut self, image: &RenderImage) {
        let width = self.width.min(image.width) as usize;
        let height = self.height.min(image.height) as usize;
        let dst_stride = self.width as usize * 4;
        let src_stride = image.width as usize * 4;
        for row in 0..height {
            let dst = row * dst_stride;
            let src = row * src_stride;
            if src + width * 4 > image.pixels.len() {
                break;
            }
            self.pixels[dst..dst + width * 4].copy_from_slice(&image.pixels[src..src + width * 4]);
        }
    }

    /// Source-over composite of `layer` onto this surface. Dimensions must match.
    pub fn composite(&mut self, layer: &Surface) {
        if !self.same_dimensions(layer) {
            return;
        }
        let stride = self.width as usize * 4;
        if stride == 0 {
            return;
        }
        self.pixels
            .par_chunks_mut(stride)
            .zip(layer.pixels.par_chunks(stride))
            .for_each(|(dst_row, src_row)| {
                for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                    if src[3] != 0 {
                        blend_over(dst, [src[0], src[1], src[2], src[3]]);
                    }
                }
            });
    }

    pub fn into_image(self) -> RenderImage {
        RenderImage {
            width: self.width,
            height: self.height,
            pixels: self.pixels,
        }
    }
}

fn blend_over(pixel: &mut [u8], color: [u8; 4]) {
    let alpha = color[3] as f32 / 255.0;
    let inv = 1.0 - alpha;
    for channel in 0..3 {
        pixel[channel] = ((pixel[channel] as f32 * inv) + (color[channel] as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    let dst_alpha = pixel[3] as f32 / 255.0;
    pixel[3] = ((alpha + dst_alpha * inv) * 255.0).round().clamp(0.0, 255.0) as u8;
}

pub struct Frame<'a> {
    pub page: u32,
    pub total: u32,
    pub image: &'a Surface,
}

pub trait Presenter: Send {
    fn present(&mut self, frame: &Frame<'_>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _frame: &Frame<'_>) -> Result<()> {
        Ok(())
    }
}

pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> usize;
    fn page_size(&self, page_index: usize) -> Result<(f32, f32)>;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
    fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parses_and_prints_hex() {
        let red: Color = "#FF0000".parse().unwrap();
        assert_eq!(red, Color::rgb(255, 0, 0));
        assert_eq!(red.to_string(), "#FF0000");

        let highlight: Color = "#ffff0066".parse().unwrap();
        assert_eq!(highlight, Color::rgba(255, 255, 0, 0x66));
        assert_eq!(highlight.to_string(), "#FFFF0066");

        assert!("red".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
    }

    #[test]
    fn composite_blends_translucent_layer_over_raster() {
        let mut raster = Surface::filled(2, 1, 2.0, 1.0, Color::rgb(255, 255, 255));
        let mut layer = Surface::transparent(2, 1, 2.0, 1.0);
        layer.blend_pixel(0, 0, Color::rgb(0, 0, 255));

        raster.composite(&layer);

        assert_eq!(raster.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(raster.pixel(1, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn copy_from_image_clips_to_surface() {
        let mut surface = Surface::transparent(1, 1, 1.0, 1.0);
        let image = RenderImage {
            width: 2,
            height: 2,
            pixels: vec![10, 20, 30, 255, 0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255],
        };
        surface.copy_from_image(&image);
        assert_eq!(surface.pixel(0, 0), Some([10, 20, 30, 255]));
    }

    #[test]
    fn pixel_ratio_follows_css_size() {
        let surface = Surface::transparent(1600, 2070, 800.0, 1035.0);
        assert!((surface.pixel_ratio() - 2.0).abs() < f32::EPSILON);
    }
}
