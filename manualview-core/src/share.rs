use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::ViewerError;

pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    pub path: PathBuf,
    pub mime: &'static str,
}

pub trait ShareSink {
    fn share(&self, file: &SharedFile) -> Result<(), ViewerError>;
}

pub fn export_for_share(document: &Path, share_dir: &Path) -> Result<SharedFile, ViewerError> {
    let file_name = document
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("manual.pdf"));
    let target = share_dir.join(file_name);

    let copied = fs::create_dir_all(share_dir).and_then(|_| fs::copy(document, &target));
    if let Err(err) = copied {
        warn!(?err, ?document, "failed to stage document for sharing");
        return Err(ViewerError::Share(err));
    }

    info!(path = ?target, "document staged for sharing");
    Ok(SharedFile {
        path: target,
        mime: PDF_MIME,
    })
}

pub fn share_document(
    document: &Path,
    share_dir: &Path,
    sink: &dyn ShareSink,
) -> Result<SharedFile, ViewerError> {
    let shared = export_for_share(document, share_dir)?;
    sink.share(&shared)?;
    Ok(shared)
}
