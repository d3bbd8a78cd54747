use std::fmt;
use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use crate::ViewerError;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c6a52-8d4e-5b1f-9a37-c2e81d5b7f04").expect("valid namespace UUID")
});

const DATA_URL_PREFIX: &str = "data:application/pdf;base64,";

/// Where a document comes from: its bytes, or somewhere the backend can read it from.
///
/// On the wire both travel as a single string. Bytes become a base64 `data:` URL,
/// anything else is passed through as a locator.
#[derive(Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Locator(String),
}

impl DocumentSource {
    pub fn id(&self) -> DocumentId {
        match self {
            DocumentSource::Bytes(bytes) => Uuid::new_v5(&DOCUMENT_NAMESPACE, bytes),
            DocumentSource::Locator(locator) => {
                Uuid::new_v5(&DOCUMENT_NAMESPACE, locator.as_bytes())
            }
        }
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            DocumentSource::Bytes(_) => None,
            DocumentSource::Locator(locator) => local_path(locator),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            DocumentSource::Locator(locator) => write!(f, "Locator({locator:?})"),
        }
    }
}

impl TryFrom<String> for DocumentSource {
    type Error = ViewerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(rest) = value.strip_prefix("data:") {
            let (_, payload) = rest
                .split_once(";base64,")
                .ok_or_else(|| ViewerError::InvalidSource("data URL is not base64".into()))?;
            let bytes = BASE64
                .decode(payload.trim())
                .map_err(|err| ViewerError::InvalidSource(err.to_string()))?;
            return Ok(DocumentSource::Bytes(bytes));
        }
        if value.trim().is_empty() {
            return Err(ViewerError::InvalidSource("empty locator".into()));
        }
        Ok(DocumentSource::Locator(value))
    }
}

impl From<DocumentSource> for String {
    fn from(source: DocumentSource) -> Self {
        match source {
            DocumentSource::Bytes(bytes) => format!("{DATA_URL_PREFIX}{}", BASE64.encode(bytes)),
            DocumentSource::Locator(locator) => locator,
        }
    }
}

fn local_path(locator: &str) -> Option<PathBuf> {
    match Url::parse(locator) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(locator)),
    }
}

/// Turns a locator into something the engine can decode without filesystem access.
///
/// Local documents are read into memory; remote locators are passed through untouched.
#[instrument]
pub fn acquire(locator: &str) -> Result<DocumentSource, ViewerError> {
    let Some(path) = local_path(locator) else {
        debug!("remote locator, handing it to the engine as-is");
        return Ok(DocumentSource::Locator(locator.to_owned()));
    };
    let bytes = fs::read(&path).map_err(|source| ViewerError::Acquire {
        locator: locator.to_owned(),
        source,
    })?;
    debug!(bytes = bytes.len(), "read local document");
    Ok(DocumentSource::Bytes(bytes))
}
