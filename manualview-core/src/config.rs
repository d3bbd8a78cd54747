use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Color, ViewerError};

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "manualview", "manualview")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InkConfig {
    pub width: f32,
    pub color: Color,
    pub palette: Vec<Color>,
}

impl Default for InkConfig {
    fn default() -> Self {
        Self {
            width: 3.0,
            color: Color::rgb(0xFF, 0x00, 0x00),
            palette: vec![
                Color::rgb(0xFF, 0x00, 0x00),
                Color::rgb(0x00, 0xFF, 0x00),
                Color::rgb(0x00, 0x00, 0xFF),
                Color::rgb(0xFF, 0xFF, 0x00),
                Color::rgb(0x00, 0x00, 0x00),
            ],
        }
    }
}

impl InkConfig {
    pub fn next_color(&self, current: Color) -> Color {
        match self.palette.iter().position(|c| *c == current) {
            Some(idx) => self.palette[(idx + 1) % self.palette.len()],
            None => self.palette.first().copied().unwrap_or(current),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub layout_width: f32,
    pub viewport_height: f32,
    pub device_pixel_ratio: f32,
    pub max_pixel_ratio: f32,
    pub page_gap: f32,
    pub min_query_len: usize,
    pub highlight: Color,
    pub ink: InkConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            layout_width: 800.0,
            viewport_height: 1000.0,
            device_pixel_ratio: 2.0,
            max_pixel_ratio: 3.0,
            page_gap: 8.0,
            min_query_len: 3,
            highlight: Color::rgba(0xFF, 0xFF, 0x00, 0x66),
            ink: InkConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads `path`, or the default location when `None`. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ViewerError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            debug!(?path, "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|source| ViewerError::Config { path, source })
    }
}
