use std::fs;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use manualview_core::{
    DocumentBackend, DocumentProvider, DocumentSource, RenderImage, RenderRequest, TextRun,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIBRARY_ENV: &str = "MANUALVIEW_PDFIUM_LIBRARY";

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentBackend>> {
        let bytes = match source {
            DocumentSource::Bytes(bytes) => bytes.clone(),
            DocumentSource::Locator(locator) => match source.local_path() {
                Some(path) => {
                    fs::read(&path).with_context(|| format!("failed to read {:?}", path))?
                }
                None => bail!("cannot fetch remote document {locator}"),
            },
        };
        let document = PdfiumDocument::load(Arc::clone(&self.pdfium), bytes)?;
        Ok(Arc::new(document))
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<PdfDocument<'static>>,
    page_count: usize,
    #[allow(dead_code)]
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn load(pdfium: Arc<Pdfium>, bytes: Vec<u8>) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|err| anyhow!("failed to decode document: {err}"))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Both live in this
        // struct and `document` is declared first, so it is dropped while the bindings
        // are still alive.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let page_count = usize::from(document.pages().len());
        debug!(page_count, "document decoded");
        Ok(Self {
            document: Mutex::new(document),
            page_count,
            pdfium,
        })
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_index))?;
        f(&page)
    }
}

impl DocumentBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page_index: usize) -> Result<(f32, f32)> {
        self.with_page(page_index, |page| Ok((page.width().value, page.height().value)))
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        self.with_page(request.page_index, |page| {
            let config = PdfRenderConfig::new()
                .set_target_width(request.width as Pixels)
                .set_target_height(request.height as Pixels);
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            let image = bitmap.as_image().to_rgba8();
            let (width, height) = (image.width(), image.height());
            Ok(RenderImage {
                width,
                height,
                pixels: image.into_raw(),
            })
        })
    }

    fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>> {
        self.with_page(page_index, |page| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let runs = text
                .segments()
                .iter()
                .map(|segment| {
                    let bounds = segment.bounds();
                    TextRun::new(
                        segment.text(),
                        bounds.left().value,
                        bounds.bottom().value,
                        bounds.right().value - bounds.left().value,
                        bounds.top().value - bounds.bottom().value,
                    )
                })
                .collect();
            Ok(runs)
        })
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(PDFIUM_LIBRARY_ENV).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!("failed to load pdfium from {}: {}", path, err);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
