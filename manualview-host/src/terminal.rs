use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use manualview_core::{Frame, NavDirection, PointerPhase, Presenter, Surface};
use parking_lot::Mutex;
use png::{BitDepth, ColorType, Encoder};

use crate::HostAction;

pub fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, width, height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;
    Ok(buffer)
}

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }

    /// Largest cell box that shows a `width`×`height` image undistorted inside
    /// `columns`×`rows` cells of `cell_width`×`cell_height` pixels.
    pub fn fit(
        width: u32,
        height: u32,
        columns: u32,
        rows: u32,
        cell_width: f32,
        cell_height: f32,
    ) -> Self {
        if width == 0 || height == 0 || cell_width <= 0.0 || cell_height <= 0.0 {
            return Self::clamped(columns, rows);
        }
        let aspect = height as f32 / width as f32;
        let rows_for_width = (columns as f32 * cell_width * aspect / cell_height).floor() as u32;
        if rows_for_width <= rows {
            Self::clamped(columns, rows_for_width)
        } else {
            let columns_for_height = (rows as f32 * cell_height / aspect / cell_width).floor() as u32;
            Self::clamped(columns_for_height, rows)
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn draw(&mut self, image: &Surface, params: DrawParams) -> Result<()> {
        let buffer = encode_png(image.width, image.height, &image.pixels)?;
        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    pub fn status_line(&mut self, row: u16, label: &str) -> Result<()> {
        crossterm::queue!(
            &mut self.writer,
            cursor::MoveTo(0, row),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(&mut self.writer, label)?;
        Ok(())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: u32,
    pub params: DrawParams,
    pub css_width: f32,
    pub css_height: f32,
}

impl Placement {
    pub fn to_page(&self, column: u16, row: u16) -> Option<(u32, f32, f32)> {
        let (column, row) = (column as u32, row as u32);
        if column >= self.params.columns || row >= self.params.rows {
            return None;
        }
        let x = (column as f32 + 0.5) / self.params.columns as f32 * self.css_width;
        let y = (row as f32 + 0.5) / self.params.rows as f32 * self.css_height;
        Some((self.page, x, y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl Viewport {
    pub fn query() -> Result<Self> {
        let (columns, rows) = crossterm::terminal::size()?;
        let (cell_width, cell_height) = match crossterm::terminal::window_size() {
            Ok(size) if size.width > 0 && size.height > 0 && size.columns > 0 && size.rows > 0 => (
                size.width as f32 / size.columns as f32,
                size.height as f32 / size.rows as f32,
            ),
            _ => (8.0, 16.0),
        };
        Ok(Self {
            columns,
            rows,
            cell_width,
            cell_height,
        })
    }

    pub fn page_rows(&self) -> u32 {
        self.rows.saturating_sub(1).max(1) as u32
    }
}

pub struct KittyPresenter<W: Write + Send> {
    renderer: Arc<Mutex<KittyRenderer<W>>>,
    viewport: Arc<Mutex<Viewport>>,
    placement: Arc<Mutex<Option<Placement>>>,
}

impl<W: Write + Send> KittyPresenter<W> {
    pub fn new(
        renderer: Arc<Mutex<KittyRenderer<W>>>,
        viewport: Arc<Mutex<Viewport>>,
        placement: Arc<Mutex<Option<Placement>>>,
    ) -> Self {
        Self {
            renderer,
            viewport,
            placement,
        }
    }
}

impl<W: Write + Send> Presenter for KittyPresenter<W> {
    fn present(&mut self, frame: &Frame<'_>) -> Result<()> {
        let viewport = *self.viewport.lock();
        let params = DrawParams::fit(
            frame.image.width,
            frame.image.height,
            viewport.columns as u32,
            viewport.page_rows(),
            viewport.cell_width,
            viewport.cell_height,
        );

        let mut renderer = self.renderer.lock();
        renderer.begin_sync_update()?;
        crossterm::queue!(renderer.writer(), cursor::MoveTo(0, 0))?;
        renderer.draw(frame.image, params)?;
        renderer.end_sync_update()?;

        *self.placement.lock() = Some(Placement {
            page: frame.page,
            params,
            css_width: frame.image.css_width,
            css_height: frame.image.css_height,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Action(HostAction),
    Pointer { phase: PointerPhase, column: u16, row: u16 },
    BeginSearch,
    SearchQueryChanged { query: String },
    SearchCancel,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    search_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.search_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Search => self.map_key_search(key),
            },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Action(HostAction::NextPage { count })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let count = self.take_count();
                UiEvent::Action(HostAction::PrevPage { count })
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Search);
                UiEvent::BeginSearch
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Action(HostAction::SearchNext)
            }
            (KeyCode::Char('N'), modifiers)
                if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
            {
                self.reset_count();
                UiEvent::Action(HostAction::SearchPrev)
            }
            (KeyCode::Char('d'), _) => {
                self.reset_count();
                UiEvent::Action(HostAction::ToggleDraw)
            }
            (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Action(HostAction::CycleColor)
            }
            (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_search(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::SearchCancel
            }
            (KeyCode::Enter, _) => {
                let query = self.search_buffer.clone();
                self.set_mode(InputMode::Normal);
                UiEvent::Action(HostAction::Search { query })
            }
            (KeyCode::Backspace, _) => {
                self.search_buffer.pop();
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.search_buffer.push(c);
                UiEvent::SearchQueryChanged {
                    query: self.search_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let phase = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => PointerPhase::Down,
            MouseEventKind::Drag(MouseButton::Left) => PointerPhase::Move,
            MouseEventKind::Up(MouseButton::Left) => PointerPhase::Up,
            MouseEventKind::ScrollDown => {
                return UiEvent::Action(HostAction::Wheel {
                    dir: NavDirection::Next,
                })
            }
            MouseEventKind::ScrollUp => {
                return UiEvent::Action(HostAction::Wheel {
                    dir: NavDirection::Prev,
                })
            }
            _ => return UiEvent::None,
        };
        UiEvent::Pointer {
            phase,
            column: mouse.column,
            row: mouse.row,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if matches!(self.mode, InputMode::Search) {
            return Some(format!("/{}", self.search_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}
