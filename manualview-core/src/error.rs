use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("could not load document: {0}")]
    Decode(String),

    #[error("could not read document from {locator}")]
    Acquire {
        locator: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid document source: {0}")]
    InvalidSource(String),

    #[error("page {0} is out of range")]
    PageOutOfRange(u32),

    #[error("invalid color {0:?}")]
    InvalidColor(String),

    #[error("the document could not be shared")]
    Share(#[source] io::Error),

    #[error("failed to read configuration at {path:?}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode message")]
    Encode(#[from] serde_json::Error),

    #[error("the other side of the viewer bridge has gone away")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] io::Error),
}
