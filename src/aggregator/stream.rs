use axum::body::{Body, Bytes};
use futures::{future, stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::control::BoxedStream;
use crate::error::AppError;

/// Stream one file from disk
pub async fn file_body(path: &Path) -> Result<Body, AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::FileUnavailable(format!("{}: {}", path.display(), e)))?;
    Ok(Body::from_stream(ReaderStream::new(file)))
}

/// Stream several files back to back, each preceded by a
/// `---- file {name} ----` header. Files that cannot be opened are skipped.
pub fn concatenated_body(files: Vec<PathBuf>) -> Body {
    let chunks = stream::iter(files)
        .then(|path| async move {
            match tokio::fs::File::open(&path).await {
                Ok(file) => {
                    let header = Bytes::from(format!("\n---- file {} ----\n", path.display()));
                    Some(
                        stream::once(future::ready(Ok::<_, std::io::Error>(header)))
                            .chain(ReaderStream::new(file)),
                    )
                }
                Err(e) => {
                    warn!(file = ?path, error = %e, "Skipping unreadable log file");
                    None
                }
            }
        })
        .filter_map(future::ready)
        .flatten();

    Body::from_stream(chunks)
}

/// Relay a control connection's reply as it arrives
pub fn ipc_body(stream: BoxedStream) -> Body {
    Body::from_stream(ReaderStream::new(stream))
}

/// Newline-separated file names
pub fn file_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}
