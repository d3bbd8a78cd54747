//! The viewer engine: decodes a document, renders every page into its layer
//! stack, runs text search, and records ink. It talks to the host only through
//! [`EngineEvent`]s and [`HostCommand`]s.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Result;
use manualview_core::search::{is_searchable, matches_on_page};
use manualview_core::{
    bridge, Color, DocumentBackend, DocumentProvider, DocumentSource, EngineEvent, EnginePort,
    Frame, HostCommand, HostPort, MatchList, NavDirection, NullPresenter, PageGeometry,
    PointerPhase, Presenter, SearchMatch, Surface, TextRun, ViewerConfig, ViewerError,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub mod ink;
pub mod layout;
pub mod page;
#[cfg(feature = "pdf")]
pub mod pdfium;

pub use ink::InkState;
pub use layout::PageFlow;
pub use page::PageRenderUnit;
#[cfg(feature = "pdf")]
pub use pdfium::PdfiumProvider;

pub trait EventSink: Send {
    fn publish(&mut self, event: EngineEvent);
}

impl EventSink for EnginePort {
    fn publish(&mut self, event: EngineEvent) {
        if let Err(err) = self.emit(&event) {
            debug!(%err, ?event, "host is gone; dropping event");
        }
    }
}

impl EventSink for Vec<EngineEvent> {
    fn publish(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

pub struct RenderEngine {
    provider: Arc<dyn DocumentProvider>,
    config: ViewerConfig,
    presenter: Box<dyn Presenter>,
    backend: Option<Arc<dyn DocumentBackend>>,
    total: u32,
    loaded: bool,
    pages: Vec<PageRenderUnit>,
    flow: PageFlow,
    text: HashMap<u32, Vec<TextRun>>,
    matches: MatchList,
    highlighted: Option<u32>,
    ink: InkState,
    dirty: bool,
}

impl RenderEngine {
    pub fn new(provider: Arc<dyn DocumentProvider>, config: ViewerConfig) -> Self {
        let flow = PageFlow::new(config.page_gap, config.viewport_height);
        let ink = InkState::new(config.ink.color, config.ink.width);
        Self {
            provider,
            config,
            presenter: Box::new(NullPresenter),
            backend: None,
            total: 0,
            loaded: false,
            pages: Vec::new(),
            flow,
            text: HashMap::new(),
            matches: MatchList::default(),
            highlighted: None,
            ink,
            dirty: false,
        }
    }

    pub fn with_presenter(mut self, presenter: Box<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn spawn(self) -> (HostPort, JoinHandle<()>) {
        let (host, port) = bridge();
        let handle = tokio::spawn(self.run(port));
        (host, handle)
    }

    pub async fn run(mut self, mut port: EnginePort) {
        port.publish(EngineEvent::Ready);
        while let Some(command) = port.next_command().await {
            if self.handle(command, &mut port).await.is_break() {
                break;
            }
        }
        self.teardown();
    }

    pub async fn handle(
        &mut self,
        command: HostCommand,
        sink: &mut dyn EventSink,
    ) -> ControlFlow<()> {
        match command {
            HostCommand::InitPdf { data } => match DocumentSource::try_from(data) {
                Ok(source) => {
                    if self.initialize(&source, sink).await.is_ok() {
                        self.render_all(sink).await;
                    }
                }
                Err(err) => self.load_failed(err.to_string(), sink),
            },
            HostCommand::Search { query } => self.search(&query, sink).await,
            HostCommand::SearchNext => self.next_match(sink),
            HostCommand::SearchPrev => self.previous_match(sink),
            HostCommand::ToggleDraw { enabled, color } => self.set_draw_mode(enabled, color),
            HostCommand::Nav { dir, count } => self.nav(dir, count, sink),
            HostCommand::Scroll { offset } => self.scroll(offset, sink),
            HostCommand::Pointer { phase, page, x, y } => self.pointer(phase, page, x, y),
            HostCommand::Close => {
                info!("close requested");
                return ControlFlow::Break(());
            }
        }
        self.present();
        ControlFlow::Continue(())
    }

    /// Decodes `source`. A second call after a successful load is ignored.
    #[instrument(skip(self, source, sink), fields(document = %source.id()))]
    pub async fn initialize(
        &mut self,
        source: &DocumentSource,
        sink: &mut dyn EventSink,
    ) -> Result<u32, ViewerError> {
        if self.backend.is_some() {
            warn!("document already initialized; ignoring");
            return Ok(self.total);
        }
        match self.provider.open(source).await {
            Ok(backend) => {
                self.total = backend.page_count() as u32;
                self.backend = Some(backend);
                info!(pages = self.total, "document opened");
                Ok(self.total)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                self.load_failed(reason.clone(), sink);
                Err(ViewerError::Decode(reason))
            }
        }
    }

    fn load_failed(&mut self, reason: String, sink: &mut dyn EventSink) {
        warn!(%reason, "failed to open document");
        sink.publish(EngineEvent::LoadFailed { reason });
    }

    /// Renders pages 1..=N in order. Each finished page is announced with
    /// `page_changed`; a page that cannot be rendered gets `page_failed` and the
    /// rest still render. `loaded` follows the last page.
    pub async fn render_all(&mut self, sink: &mut dyn EventSink) {
        let Some(backend) = self.backend.clone() else {
            debug!("render requested without a document");
            return;
        };
        if self.loaded {
            return;
        }

        for index in 0..self.total as usize {
            let page = index as u32 + 1;
            let geometry = match backend.page_size(index) {
                Ok((width, height)) if width > 0.0 && height > 0.0 => PageGeometry::fit_to_width(
                    width,
                    height,
                    self.config.layout_width,
                    self.config.device_pixel_ratio,
                    self.config.max_pixel_ratio,
                ),
                Ok(size) => {
                    self.page_failed(page, format!("page has no area: {size:?}"), sink);
                    continue;
                }
                Err(err) => {
                    self.page_failed(page, format!("{err:#}"), sink);
                    continue;
                }
            };

            let mut unit = PageRenderUnit::allocate(page, geometry);
            let rendered = unit.rasterize(backend.as_ref());
            self.flow.push(page, geometry.display.height());
            match rendered {
                Ok(()) => {
                    self.pages.push(unit);
                    debug!(page, total = self.total, "page rendered");
                    sink.publish(EngineEvent::PageChanged {
                        page,
                        total: self.total,
                    });
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    unit.mark_failed(reason.clone());
                    self.pages.push(unit);
                    self.page_failed(page, reason, sink);
                }
            }

            if self.flow.len() == 1 {
                self.flow.settle();
                self.dirty = true;
                self.present();
            }
            tokio::task::yield_now().await;
        }

        self.loaded = true;
        self.flow.settle();
        info!(pages = self.total, "document loaded");
        sink.publish(EngineEvent::Loaded { total: self.total });
    }

    fn page_failed(&mut self, page: u32, reason: String, sink: &mut dyn EventSink) {
        warn!(page, %reason, "page could not be rendered");
        sink.publish(EngineEvent::PageFailed { page, reason });
    }

    /// Finds every run containing `query` across all pages, in page order, and
    /// shows the first one. Queries shorter than the configured minimum are ignored.
    #[instrument(skip(self, sink))]
    pub async fn search(&mut self, query: &str, sink: &mut dyn EventSink) {
        if !is_searchable(query, self.config.min_query_len) {
            debug!("query too short; ignoring");
            return;
        }
        let Some(backend) = self.backend.clone() else {
            debug!("search requested without a document");
            return;
        };
        sink.publish(EngineEvent::SearchStart {
            query: query.to_owned(),
        });

        self.clear_highlight();
        let mut found = Vec::new();
        for page in 1..=self.total {
            match self.page_text(backend.as_ref(), page) {
                Ok(runs) => found.extend(matches_on_page(page, runs, query)),
                Err(err) => warn!(page, "failed to read page text: {err:#}"),
            }
            tokio::task::yield_now().await;
        }

        info!(matches = found.len(), "search finished");
        self.matches = MatchList::new(query, found);
        if let Some(first) = self.matches.current().cloned() {
            self.show_match(&first, sink);
        }
        self.dirty = true;
        self.publish_search_result(sink);
    }

    pub fn next_match(&mut self, sink: &mut dyn EventSink) {
        let Some(found) = self.matches.advance().cloned() else {
            return;
        };
        self.show_match(&found, sink);
        self.publish_search_result(sink);
    }

    pub fn previous_match(&mut self, sink: &mut dyn EventSink) {
        let Some(found) = self.matches.retreat().cloned() else {
            return;
        };
        self.show_match(&found, sink);
        self.publish_search_result(sink);
    }

    fn page_text(&mut self, backend: &dyn DocumentBackend, page: u32) -> Result<&[TextRun]> {
        if !self.text.contains_key(&page) {
            let runs = backend.text_runs(page as usize - 1)?;
            self.text.insert(page, runs);
        }
        Ok(self.text.get(&page).map(Vec::as_slice).unwrap_or_default())
    }

    fn publish_search_result(&self, sink: &mut dyn EventSink) {
        let summary = self.matches.summary();
        sink.publish(EngineEvent::SearchResult {
            count: summary.count,
            index: summary.index,
        });
    }

    fn clear_highlight(&mut self) {
        if let Some(page) = self.highlighted.take() {
            if let Some(unit) = self.unit_mut(page) {
                unit.clear_highlight();
            }
        }
    }

    fn show_match(&mut self, found: &SearchMatch, sink: &mut dyn EventSink) {
        self.clear_highlight();
        if let Some(page) = self.flow.center_on(found.page) {
            sink.publish(EngineEvent::VisiblePageChanged { page });
        }
        let color = self.config.highlight;
        if let Some(unit) = self.unit_mut(found.page) {
            if unit.highlight_match(found, color).is_none() {
                debug!(page = found.page, "match lies outside the page");
            }
            self.highlighted = Some(found.page);
        }
        self.dirty = true;
    }

    pub fn set_draw_mode(&mut self, enabled: bool, color: Color) {
        info!(enabled, %color, "draw mode");
        self.ink.set_mode(enabled, color);
        self.flow.set_locked(enabled);
    }

    pub fn pointer(&mut self, phase: PointerPhase, page: u32, x: f32, y: f32) {
        match phase {
            PointerPhase::Up => self.ink.end(),
            PointerPhase::Down => {
                if let Some(idx) = self.unit_index(page) {
                    self.ink.begin(&self.pages[idx], x, y);
                }
            }
            PointerPhase::Move => {
                if let Some(idx) = self.unit_index(page) {
                    if self.ink.extend(&mut self.pages[idx], x, y) {
                        self.dirty = true;
                    }
                }
            }
        }
    }

    pub fn scroll(&mut self, offset: f32, sink: &mut dyn EventSink) {
        if let Some(page) = self.flow.scroll_by_user(offset) {
            sink.publish(EngineEvent::VisiblePageChanged { page });
            self.dirty = true;
        }
    }

    pub fn nav(&mut self, dir: NavDirection, count: u32, sink: &mut dyn EventSink) {
        let changed = self.flow.step(matches!(dir, NavDirection::Next), count);
        if let Some(page) = changed {
            sink.publish(EngineEvent::VisiblePageChanged { page });
            self.dirty = true;
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn pages(&self) -> &[PageRenderUnit] {
        &self.pages
    }

    pub fn page(&self, page: u32) -> Option<&PageRenderUnit> {
        self.unit_index(page).map(|idx| &self.pages[idx])
    }

    pub fn matches(&self) -> &MatchList {
        &self.matches
    }

    pub fn ink(&self) -> &InkState {
        &self.ink
    }

    pub fn flow(&self) -> &PageFlow {
        &self.flow
    }

    pub fn visible_page(&self) -> Option<u32> {
        self.flow.visible_page()
    }

    pub fn composite(&self, page: u32) -> Option<Surface> {
        self.page(page).map(PageRenderUnit::composite)
    }

    fn unit_index(&self, page: u32) -> Option<usize> {
        self.pages.iter().position(|unit| unit.page == page)
    }

    fn unit_mut(&mut self, page: u32) -> Option<&mut PageRenderUnit> {
        self.pages.iter_mut().find(|unit| unit.page == page)
    }

    fn present(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        let Some(page) = self.flow.visible_page() else {
            return;
        };
        let Some(image) = self.composite(page) else {
            return;
        };
        let frame = Frame {
            page,
            total: self.total,
            image: &image,
        };
        if let Err(err) = self.presenter.present(&frame) {
            warn!(page, "failed to present page: {err:#}");
        }
    }

    pub fn teardown(&mut self) {
        if self.backend.take().is_some() {
            info!("releasing document");
        }
        self.pages.clear();
        self.text.clear();
        self.flow.clear();
        self.matches = MatchList::default();
        self.highlighted = None;
        self.ink.end();
        self.loaded = false;
        self.total = 0;
    }
}
