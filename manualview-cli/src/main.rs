use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::{cursor, terminal};
use directories::ProjectDirs;
use manualview_core::config::project_dirs;
use manualview_core::favorites::{Favorites, FileKeyValueStore, KeyValueStore, ManualId};
use manualview_core::share::{share_document, ShareSink, SharedFile};
use manualview_core::source::acquire;
use manualview_core::{DocumentProvider, PointerPhase, ViewerConfig, ViewerError};
use manualview_host::terminal::{
    EventMapper, KittyPresenter, KittyRenderer, Placement, UiEvent, Viewport,
};
use manualview_host::ViewerHost;
use manualview_render::{PdfiumProvider, RenderEngine};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "manualview",
    version,
    about = "Viewer and annotator for equipment manuals"
)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Width pages are laid out at, in CSS pixels
    #[arg(long, global = true)]
    width: Option<f32>,

    /// Device pixel ratio to render at
    #[arg(long = "pixel-ratio", global = true)]
    pixel_ratio: Option<f32>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Open a manual in the terminal viewer
    View {
        /// Path, file:// URL or remote URL of the PDF
        file: String,
    },
    /// Search a manual and print where the query occurs
    Search { file: String, query: String },
    /// Render every page to PNG
    Export {
        file: String,
        #[arg(long)]
        out: PathBuf,
        /// Highlight the first match of this query in the exported pages
        #[arg(long)]
        highlight: Option<String>,
    },
    /// Copy a manual to the share directory
    Share { file: PathBuf },
    /// Manage favorite manuals
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },
}

#[derive(Debug, Subcommand)]
enum FavoritesCommand {
    List,
    Add { id: ManualId },
    Remove { id: ManualId },
    Toggle { id: ManualId },
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs =
        project_dirs().ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let interactive = matches!(args.command, CliCommand::View { .. });
    let _log_guard = init_logging(&project_dirs, !interactive)?;

    let mut config = ViewerConfig::load(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.layout_width = width;
    }
    if let Some(ratio) = args.pixel_ratio {
        config.device_pixel_ratio = ratio;
    }

    match args.command {
        CliCommand::View { file } => view(&file, config).await,
        CliCommand::Search { file, query } => search(&file, &query, config).await,
        CliCommand::Export {
            file,
            out,
            highlight,
        } => export(&file, &out, highlight.as_deref(), config).await,
        CliCommand::Share { file } => share(&file, &project_dirs),
        CliCommand::Favorites { action } => favorites(action, &project_dirs),
    }
}

fn provider() -> Result<Arc<dyn DocumentProvider>> {
    Ok(Arc::new(PdfiumProvider::new()?))
}

async fn view(file: &str, config: ViewerConfig) -> Result<()> {
    let provider = provider()?;
    let viewport = Arc::new(Mutex::new(Viewport::query()?));
    let placement: Arc<Mutex<Option<Placement>>> = Arc::new(Mutex::new(None));

    let _raw = RawModeGuard::new()?;
    let renderer = Arc::new(Mutex::new(KittyRenderer::new(io::stdout())));
    renderer.lock().clear_all()?;

    let presenter = KittyPresenter::new(
        Arc::clone(&renderer),
        Arc::clone(&viewport),
        Arc::clone(&placement),
    );
    let (port, engine) = RenderEngine::new(provider, config.clone())
        .with_presenter(Box::new(presenter))
        .spawn();
    let mut host = ViewerHost::new(port, &config);
    host.open_locator(file)
        .with_context(|| format!("failed to open {file}"))?;

    let mut mapper = EventMapper::new();
    let mut shown_status = String::new();

    loop {
        if let Err(err) = host.pump() {
            warn!(%err, "engine stopped");
            break;
        }

        let status = match mapper.pending_input() {
            Some(pending) => format!("{}  {}", host.status_line(), pending),
            None => host.status_line(),
        };
        if status != shown_status {
            let row = viewport.lock().rows.saturating_sub(1);
            renderer.lock().status_line(row, &status)?;
            shown_status = status;
        }

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let ev = event::read()?;
        if let Event::Resize(columns, rows) = ev {
            let mut viewport = viewport.lock();
            viewport.columns = columns;
            viewport.rows = rows;
            shown_status.clear();
            continue;
        }

        match mapper.map_event(ev) {
            UiEvent::Action(action) => {
                if let Err(err) = host.apply(action) {
                    warn!(%err, "failed to forward action");
                }
            }
            UiEvent::Pointer { phase, column, row } => {
                let placed = *placement.lock();
                let target = placed.and_then(|p| p.to_page(column, row)).or_else(|| {
                    // Releasing outside the page still ends the stroke.
                    placed
                        .filter(|_| phase == PointerPhase::Up)
                        .map(|p| (p.page, 0.0, 0.0))
                });
                if let Some((page, x, y)) = target {
                    if let Err(err) = host.pointer(phase, page, x, y) {
                        debug!(%err, "pointer outside the document");
                    }
                }
            }
            UiEvent::Quit => break,
            UiEvent::BeginSearch
            | UiEvent::SearchQueryChanged { .. }
            | UiEvent::SearchCancel
            | UiEvent::None => {}
        }
    }

    if let Err(err) = host.close() {
        debug!(%err, "engine already gone");
    }
    engine.await.context("engine task failed")?;
    renderer.lock().clear_all()?;
    Ok(())
}

async fn search(file: &str, query: &str, config: ViewerConfig) -> Result<()> {
    let source = acquire(file)?;
    let mut engine = RenderEngine::new(provider()?, config);
    let mut events = Vec::new();
    engine.initialize(&source, &mut events).await?;
    engine.search(query, &mut events).await;

    let matches = engine.matches();
    if matches.is_empty() {
        println!("not found");
        return Ok(());
    }
    println!("{} matches", matches.len());
    for found in matches.matches() {
        println!("page {}: {}", found.page, found.run.text.trim());
    }
    Ok(())
}

async fn export(
    file: &str,
    out: &Path,
    highlight: Option<&str>,
    config: ViewerConfig,
) -> Result<()> {
    let source = acquire(file)?;
    let mut engine = RenderEngine::new(provider()?, config);
    let mut events = Vec::new();
    engine.initialize(&source, &mut events).await?;
    engine.render_all(&mut events).await;
    if let Some(query) = highlight {
        engine.search(query, &mut events).await;
    }

    fs::create_dir_all(out).with_context(|| format!("failed to create {:?}", out))?;
    for unit in engine.pages() {
        if let Some(reason) = unit.failure() {
            warn!(page = unit.page, %reason, "exporting blank page");
        }
        let surface = unit.composite();
        let path = out.join(format!("page-{:03}.png", unit.page));
        let image = image::RgbaImage::from_raw(surface.width, surface.height, surface.pixels)
            .ok_or_else(|| anyhow!("page {} has an inconsistent buffer", unit.page))?;
        image
            .save(&path)
            .with_context(|| format!("failed to write {:?}", path))?;
        println!("{}", path.display());
    }
    info!(pages = engine.pages().len(), "export finished");
    Ok(())
}

struct PrintSink;

impl ShareSink for PrintSink {
    fn share(&self, file: &SharedFile) -> Result<(), ViewerError> {
        println!("{} ({})", file.path.display(), file.mime);
        Ok(())
    }
}

fn share(file: &Path, project_dirs: &ProjectDirs) -> Result<()> {
    let share_dir = project_dirs.cache_dir().join("share");
    share_document(file, &share_dir, &PrintSink)?;
    Ok(())
}

fn favorites(action: FavoritesCommand, project_dirs: &ProjectDirs) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(
        project_dirs.data_local_dir().join("storage"),
    )?);
    let mut favorites = Favorites::load(store)?;
    match action {
        FavoritesCommand::List => {}
        FavoritesCommand::Add { id } => favorites.add(id)?,
        FavoritesCommand::Remove { id } => favorites.remove(id)?,
        FavoritesCommand::Toggle { id } => {
            let now = favorites.toggle(id)?;
            println!("{id} {}", if now { "added" } else { "removed" });
            return Ok(());
        }
    }
    for id in favorites.ids() {
        println!("{id}");
    }
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "manualview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // The viewer owns the terminal, so it only logs to the file.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
