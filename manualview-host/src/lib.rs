use std::collections::VecDeque;

use manualview_core::source::acquire;
use manualview_core::{
    Color, DocumentSource, EngineEvent, HostCommand, HostPort, InkConfig, NavDirection,
    PointerPhase, ViewerConfig, ViewerError,
};
use tracing::{debug, info, warn};

pub mod terminal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    Inactive,
    Searching { query: String },
    ShowingResults { query: String, count: usize, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    Search { query: String },
    SearchNext,
    SearchPrev,
    NextPage { count: usize },
    PrevPage { count: usize },
    ScrollTo { offset: f32 },
    /// One wheel notch; moves a page unless drawing holds the view still.
    Wheel { dir: NavDirection },
    ToggleDraw,
    CycleColor,
    Pointer { phase: PointerPhase, page: u32, x: f32, y: f32 },
    Close,
}

pub struct ViewerHost {
    port: HostPort,
    min_query_len: usize,
    ink: InkConfig,
    document: Option<DocumentSource>,
    init_sent: bool,
    pending: VecDeque<HostCommand>,
    phase: Phase,
    current_page: Option<u32>,
    visible_page: Option<u32>,
    total: Option<u32>,
    failed_pages: Vec<(u32, String)>,
    search: SearchState,
    drawing: bool,
    color: Color,
}

impl ViewerHost {
    pub fn new(port: HostPort, config: &ViewerConfig) -> Self {
        Self {
            port,
            min_query_len: config.min_query_len,
            ink: config.ink.clone(),
            document: None,
            init_sent: false,
            pending: VecDeque::new(),
            phase: Phase::Idle,
            current_page: None,
            visible_page: None,
            total: None,
            failed_pages: Vec::new(),
            search: SearchState::Inactive,
            drawing: false,
            color: config.ink.color,
        }
    }

    pub fn open(&mut self, source: DocumentSource) {
        if self.phase != Phase::Idle {
            warn!(phase = ?self.phase, "document already opened; ignoring");
            return;
        }
        info!(document = %source.id(), "opening document");
        self.document = Some(source);
        self.phase = Phase::Loading;
    }

    pub fn open_locator(&mut self, locator: &str) -> Result<(), ViewerError> {
        match acquire(locator) {
            Ok(source) => {
                self.open(source);
                Ok(())
            }
            Err(err) => {
                warn!(%err, locator, "failed to acquire document");
                self.phase = Phase::Error(err.to_string());
                Err(err)
            }
        }
    }

    pub fn apply(&mut self, action: HostAction) -> Result<(), ViewerError> {
        match action {
            HostAction::Search { query } => self.search(&query),
            HostAction::SearchNext => self.dispatch(HostCommand::SearchNext),
            HostAction::SearchPrev => self.dispatch(HostCommand::SearchPrev),
            HostAction::NextPage { count } => self.nav(NavDirection::Next, count),
            HostAction::PrevPage { count } => self.nav(NavDirection::Prev, count),
            HostAction::ScrollTo { offset } => self.dispatch(HostCommand::Scroll { offset }),
            HostAction::Wheel { dir } => self.wheel(dir),
            HostAction::ToggleDraw => self.set_drawing(!self.drawing),
            HostAction::CycleColor => self.cycle_color(),
            HostAction::Pointer { phase, page, x, y } => self.pointer(phase, page, x, y),
            HostAction::Close => self.close(),
        }
    }

    pub fn search(&mut self, query: &str) -> Result<(), ViewerError> {
        let query = query.trim();
        if query.chars().count() < self.min_query_len {
            debug!(query, "query too short; not searching");
            return Ok(());
        }
        self.dispatch(HostCommand::Search {
            query: query.to_owned(),
        })
    }

    pub fn nav(&mut self, dir: NavDirection, count: usize) -> Result<(), ViewerError> {
        let count = u32::try_from(count).unwrap_or(u32::MAX).max(1);
        self.dispatch(HostCommand::Nav { dir, count })
    }

    pub fn wheel(&mut self, dir: NavDirection) -> Result<(), ViewerError> {
        if self.drawing {
            debug!(?dir, "scrolling is locked while drawing");
            return Ok(());
        }
        self.nav(dir, 1)
    }

    pub fn set_drawing(&mut self, enabled: bool) -> Result<(), ViewerError> {
        self.drawing = enabled;
        self.dispatch(HostCommand::ToggleDraw {
            enabled,
            color: self.color,
        })
    }

    pub fn cycle_color(&mut self) -> Result<(), ViewerError> {
        self.color = self.ink.next_color(self.color);
        if self.drawing {
            self.set_drawing(true)?;
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: Color) -> Result<(), ViewerError> {
        self.color = color;
        if self.drawing {
            self.set_drawing(true)?;
        }
        Ok(())
    }

    pub fn pointer(
        &mut self,
        phase: PointerPhase,
        page: u32,
        x: f32,
        y: f32,
    ) -> Result<(), ViewerError> {
        if page == 0 || self.total.is_some_and(|total| page > total) {
            return Err(ViewerError::PageOutOfRange(page));
        }
        if !self.drawing {
            return Ok(());
        }
        self.dispatch(HostCommand::Pointer { phase, page, x, y })
    }

    pub fn close(&mut self) -> Result<(), ViewerError> {
        self.pending.clear();
        info!("closing viewer");
        self.port.send(&HostCommand::Close)
    }

    fn dispatch(&mut self, command: HostCommand) -> Result<(), ViewerError> {
        if self.init_sent {
            self.port.send(&command)
        } else {
            debug!(?command, "engine not ready; queueing");
            self.pending.push_back(command);
            Ok(())
        }
    }

    pub fn pump(&mut self) -> Result<usize, ViewerError> {
        let mut handled = 0;
        while let Some(event) = self.port.try_recv()? {
            self.handle_event(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        let event = self.port.recv().await?;
        if let Err(err) = self.handle_event(event.clone()) {
            warn!(%err, "failed to handle engine event");
        }
        Some(event)
    }

    pub fn handle_event(&mut self, event: EngineEvent) -> Result<(), ViewerError> {
        match event {
            EngineEvent::Ready => self.on_ready()?,
            EngineEvent::Loaded { total } => {
                self.total = Some(total);
                if self.phase == Phase::Loading {
                    self.phase = Phase::Ready;
                }
            }
            EngineEvent::PageChanged { page, total } => {
                self.current_page = Some(page);
                self.total = Some(total);
            }
            EngineEvent::PageFailed { page, reason } => {
                warn!(page, %reason, "page failed to render");
                self.failed_pages.push((page, reason));
            }
            EngineEvent::LoadFailed { reason } => {
                warn!(%reason, "document failed to load");
                self.phase = Phase::Error(reason);
            }
            EngineEvent::SearchStart { query } => {
                self.search = SearchState::Searching { query };
            }
            EngineEvent::SearchResult { count, index } => {
                let query = match &self.search {
                    SearchState::Searching { query } | SearchState::ShowingResults { query, .. } => {
                        query.clone()
                    }
                    SearchState::Inactive => String::new(),
                };
                self.search = SearchState::ShowingResults {
                    query,
                    count,
                    index,
                };
            }
            EngineEvent::VisiblePageChanged { page } => self.visible_page = Some(page),
        }
        Ok(())
    }

    fn on_ready(&mut self) -> Result<(), ViewerError> {
        if self.init_sent {
            return Ok(());
        }
        let Some(document) = self.document.take() else {
            debug!("engine ready before a document was opened");
            return Ok(());
        };
        self.port.send(&HostCommand::init_pdf(document))?;
        self.init_sent = true;
        while let Some(command) = self.pending.pop_front() {
            self.port.send(&command)?;
        }
        Ok(())
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// The page the user is looking at: the visible page once known, otherwise
    /// the most recently rendered one.
    pub fn current_page(&self) -> Option<u32> {
        self.visible_page.or(self.current_page)
    }

    pub fn total(&self) -> Option<u32> {
        self.total
    }

    pub fn failed_pages(&self) -> &[(u32, String)] {
        &self.failed_pages
    }

    pub fn search_state(&self) -> &SearchState {
        &self.search
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn header_subtitle(&self) -> String {
        let show = |value: Option<u32>| value.map_or_else(|| "-".to_owned(), |v| v.to_string());
        format!("Page {} of {}", show(self.current_page()), show(self.total))
    }

    pub fn search_status(&self) -> Option<String> {
        match &self.search {
            SearchState::Inactive => None,
            SearchState::Searching { .. } => Some("searching".to_owned()),
            SearchState::ShowingResults { count: 0, .. } => Some("not found".to_owned()),
            SearchState::ShowingResults { count, index, .. } => Some(format!("{index}/{count}")),
        }
    }

    pub fn status_line(&self) -> String {
        let mut line = match &self.phase {
            Phase::Error(_) => "could not load document".to_owned(),
            Phase::Loading => format!("{} (loading)", self.header_subtitle()),
            _ => self.header_subtitle(),
        };
        if let Some(status) = self.search_status() {
            line.push_str(&format!("  search: {status}"));
        }
        if self.drawing {
            line.push_str(&format!("  draw {}", self.color));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use manualview_core::{
        bridge, DocumentBackend, DocumentProvider, EnginePort, RenderImage, RenderRequest, TextRun,
    };
    use manualview_render::RenderEngine;
    use tempfile::tempdir;

    fn host() -> (ViewerHost, EnginePort) {
        let (port, engine) = bridge();
        (ViewerHost::new(port, &ViewerConfig::default()), engine)
    }

    fn document() -> DocumentSource {
        DocumentSource::Bytes(b"%PDF-1.7".to_vec())
    }

    async fn nothing_sent(engine: &mut EnginePort) -> bool {
        tokio::time::timeout(Duration::from_millis(20), engine.next_command())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn commands_wait_for_ready_and_follow_init() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.search("torque").unwrap();
        host.set_drawing(true).unwrap();
        assert!(nothing_sent(&mut engine).await);

        host.handle_event(EngineEvent::Ready).unwrap();

        assert!(matches!(
            engine.next_command().await,
            Some(HostCommand::InitPdf { .. })
        ));
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::Search {
                query: "torque".into()
            })
        );
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::ToggleDraw {
                enabled: true,
                color: Color::rgb(255, 0, 0)
            })
        );
    }

    #[tokio::test]
    async fn init_is_sent_exactly_once() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.handle_event(EngineEvent::Ready).unwrap();
        host.handle_event(EngineEvent::Ready).unwrap();
        host.open(document());

        assert!(matches!(
            engine.next_command().await,
            Some(HostCommand::InitPdf { .. })
        ));
        assert!(nothing_sent(&mut engine).await);
    }

    #[test]
    fn phases_follow_engine_events() {
        let (mut host, _engine) = host();
        assert_eq!(host.phase(), &Phase::Idle);
        host.open(document());
        assert!(host.is_loading());

        host.handle_event(EngineEvent::Loaded { total: 3 }).unwrap();
        assert_eq!(host.phase(), &Phase::Ready);

        host.handle_event(EngineEvent::LoadFailed {
            reason: "bad xref".into(),
        })
        .unwrap();
        assert_eq!(host.phase(), &Phase::Error("bad xref".into()));
        assert_eq!(host.status_line(), "could not load document");
    }

    #[test]
    fn missing_file_puts_host_in_error_state() {
        let dir = tempdir().unwrap();
        let (mut host, _engine) = host();
        let missing = dir.path().join("missing.pdf");
        assert!(host.open_locator(missing.to_str().unwrap()).is_err());
        assert!(matches!(host.phase(), Phase::Error(_)));
    }

    #[test]
    fn subtitle_tracks_rendered_then_visible_page() {
        let (mut host, _engine) = host();
        assert_eq!(host.header_subtitle(), "Page - of -");

        host.handle_event(EngineEvent::PageChanged { page: 1, total: 3 })
            .unwrap();
        assert_eq!(host.header_subtitle(), "Page 1 of 3");
        host.handle_event(EngineEvent::PageChanged { page: 3, total: 3 })
            .unwrap();
        assert_eq!(host.header_subtitle(), "Page 3 of 3");

        host.handle_event(EngineEvent::VisiblePageChanged { page: 2 })
            .unwrap();
        assert_eq!(host.header_subtitle(), "Page 2 of 3");
    }

    #[test]
    fn search_status_reflects_results() {
        let (mut host, _engine) = host();
        assert_eq!(host.search_status(), None);

        host.handle_event(EngineEvent::SearchStart {
            query: "torque".into(),
        })
        .unwrap();
        assert_eq!(host.search_status().as_deref(), Some("searching"));

        host.handle_event(EngineEvent::SearchResult { count: 3, index: 2 })
            .unwrap();
        assert_eq!(host.search_status().as_deref(), Some("2/3"));
        assert_eq!(
            host.search_state(),
            &SearchState::ShowingResults {
                query: "torque".into(),
                count: 3,
                index: 2
            }
        );

        host.handle_event(EngineEvent::SearchResult { count: 0, index: 0 })
            .unwrap();
        assert_eq!(host.search_status().as_deref(), Some("not found"));
    }

    #[tokio::test]
    async fn short_queries_and_idle_pointers_are_not_sent() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.handle_event(EngineEvent::Ready).unwrap();
        engine.next_command().await;

        host.search("to").unwrap();
        host.pointer(PointerPhase::Down, 1, 5.0, 5.0).unwrap();
        assert!(nothing_sent(&mut engine).await);

        host.handle_event(EngineEvent::Loaded { total: 2 }).unwrap();
        assert!(matches!(
            host.pointer(PointerPhase::Down, 3, 5.0, 5.0),
            Err(ViewerError::PageOutOfRange(3))
        ));
    }

    #[tokio::test]
    async fn cycling_color_while_drawing_resends_mode() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.handle_event(EngineEvent::Ready).unwrap();
        engine.next_command().await;

        host.cycle_color().unwrap();
        assert!(nothing_sent(&mut engine).await);
        assert_eq!(host.color(), Color::rgb(0, 255, 0));

        host.apply(HostAction::ToggleDraw).unwrap();
        host.apply(HostAction::CycleColor).unwrap();
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::ToggleDraw {
                enabled: true,
                color: Color::rgb(0, 255, 0)
            })
        );
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::ToggleDraw {
                enabled: true,
                color: Color::rgb(0, 0, 255)
            })
        );
    }

    #[tokio::test]
    async fn wheel_is_held_while_drawing() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.handle_event(EngineEvent::Ready).unwrap();
        engine.next_command().await;

        host.set_drawing(true).unwrap();
        engine.next_command().await;
        host.apply(HostAction::Wheel {
            dir: NavDirection::Next,
        })
        .unwrap();
        assert!(nothing_sent(&mut engine).await);

        host.set_drawing(false).unwrap();
        engine.next_command().await;
        host.apply(HostAction::Wheel {
            dir: NavDirection::Next,
        })
        .unwrap();
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::Nav {
                dir: NavDirection::Next,
                count: 1
            })
        );
    }

    #[tokio::test]
    async fn page_count_prefix_travels_as_one_command() {
        let (mut host, mut engine) = host();
        host.open(document());
        host.handle_event(EngineEvent::Ready).unwrap();
        engine.next_command().await;

        host.apply(HostAction::NextPage { count: usize::MAX }).unwrap();
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::Nav {
                dir: NavDirection::Next,
                count: u32::MAX
            })
        );
        assert!(nothing_sent(&mut engine).await);

        host.apply(HostAction::PrevPage { count: 0 }).unwrap();
        assert_eq!(
            engine.next_command().await,
            Some(HostCommand::Nav {
                dir: NavDirection::Prev,
                count: 1
            })
        );
    }

    #[test]
    fn failed_pages_are_recorded_without_moving_the_subtitle() {
        let (mut host, _engine) = host();
        host.handle_event(EngineEvent::PageChanged { page: 1, total: 3 })
            .unwrap();
        host.handle_event(EngineEvent::PageFailed {
            page: 2,
            reason: "bad content stream".into(),
        })
        .unwrap();

        assert_eq!(host.failed_pages(), &[(2, "bad content stream".to_owned())]);
        assert_eq!(host.header_subtitle(), "Page 1 of 3");
    }

    struct Manual;

    impl DocumentBackend for Manual {
        fn page_count(&self) -> usize {
            3
        }

        fn page_size(&self, _page_index: usize) -> Result<(f32, f32)> {
            Ok((612.0, 792.0))
        }

        fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
            Ok(RenderImage {
                width: request.width,
                height: request.height,
                pixels: vec![255; (request.width * request.height * 4) as usize],
            })
        }

        fn text_runs(&self, page_index: usize) -> Result<Vec<TextRun>> {
            let text = match page_index {
                1 => "Torque Specification",
                _ => "General notes",
            };
            Ok(vec![TextRun::new(text, 72.0, 700.0, 200.0, 12.0)])
        }
    }

    struct ManualProvider;

    #[async_trait]
    impl DocumentProvider for ManualProvider {
        async fn open(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentBackend>> {
            match source {
                DocumentSource::Bytes(_) => Ok(Arc::new(Manual)),
                DocumentSource::Locator(locator) => Err(anyhow!("cannot fetch {locator}")),
            }
        }
    }

    #[tokio::test]
    async fn end_to_end_search_scenario() {
        let config = ViewerConfig {
            layout_width: 100.0,
            viewport_height: 100.0,
            device_pixel_ratio: 1.0,
            ..ViewerConfig::default()
        };
        let (port, engine) = RenderEngine::new(Arc::new(ManualProvider), config.clone()).spawn();
        let mut host = ViewerHost::new(port, &config);
        host.open(document());
        host.search("torque").unwrap();

        while !matches!(host.search_state(), SearchState::ShowingResults { .. }) {
            host.next_event().await.unwrap();
        }
        assert_eq!(host.phase(), &Phase::Ready);
        assert_eq!(host.search_status().as_deref(), Some("1/1"));
        assert_eq!(host.header_subtitle(), "Page 2 of 3");

        host.apply(HostAction::SearchNext).unwrap();
        host.next_event().await.unwrap();
        assert_eq!(host.search_status().as_deref(), Some("1/1"));

        host.search("xyz123").unwrap();
        while host.search_status().as_deref() != Some("not found") {
            host.next_event().await.unwrap();
        }

        host.close().unwrap();
        while host.next_event().await.is_some() {}
        engine.await.unwrap();
        assert!(host.pump().is_err());
    }
}
