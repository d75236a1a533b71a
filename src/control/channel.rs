use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{ControlCommand, Subsystem, MAX_REQUEST_LEN};
use super::transport::{BoxedStream, IpcListener, LocalEndpoint};
use crate::error::{Error, Result};

const LIVENESS_TIMEOUT: Duration = Duration::from_millis(200);
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// What a handler sends back for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Stream the file's bytes instead of a text reply
    File(PathBuf),
}

/// Executes parsed commands for one subsystem
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    fn subsystem(&self) -> Subsystem;

    async fn handle(&self, command: ControlCommand) -> Result<Reply>;
}

/// A bound control endpoint with its accept loop.
///
/// Connections are served strictly one at a time: one request, one reply,
/// then close. Dropping the channel stops the loop and removes the marker.
#[derive(Debug)]
pub struct ControlChannel {
    marker: PathBuf,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ControlChannel {
    /// Bind `{dir}/{subsystem}_{module}.sock` and start serving `handler`.
    ///
    /// An existing marker is dialed first: a live peer makes this fail with a
    /// transport error, a stale marker is removed and replaced.
    pub async fn bind(
        handler: Arc<dyn CommandHandler>,
        module: &str,
        dir: &Path,
        transport: Arc<dyn LocalEndpoint>,
        read_timeout: Duration,
    ) -> Result<Self> {
        if module.trim().is_empty() {
            return Err(Error::Configuration("Required module name".to_string()));
        }

        let subsystem = handler.subsystem();
        let marker = subsystem.marker_path(dir, module);

        if marker.exists() {
            match tokio::time::timeout(LIVENESS_TIMEOUT, transport.dial(&marker)).await {
                Ok(Ok(_)) => {
                    return Err(Error::Transport(format!(
                        "{} is already served by a live process",
                        marker.display()
                    )));
                }
                _ => {
                    debug!(marker = ?marker, "Removing stale control endpoint");
                    transport.remove(&marker)?;
                }
            }
        }

        let listener = transport.listen(&marker).await?;
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(accept_loop(
            listener,
            handler,
            read_timeout,
            cancel.clone(),
            marker.clone(),
            transport.clone(),
        ));

        info!(
            marker = ?marker,
            subsystem = %subsystem,
            transport = transport.name(),
            "Control channel listening"
        );

        Ok(Self {
            marker,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Stop accepting and wait until the marker is removed
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    mut listener: Box<dyn IpcListener>,
    handler: Arc<dyn CommandHandler>,
    read_timeout: Duration,
    cancel: CancellationToken,
    marker: PathBuf,
    transport: Arc<dyn LocalEndpoint>,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                warn!(marker = ?marker, error = %e, "Control channel accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let served = AssertUnwindSafe(serve_connection(stream, handler.as_ref(), read_timeout))
            .catch_unwind();

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = served => match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(marker = ?marker, error = %e, "Control connection failed"),
                Err(panic) => error!(marker = ?marker, panic = ?panic, "Control handler panicked"),
            },
        }
    }

    if let Err(e) = transport.remove(&marker) {
        warn!(marker = ?marker, error = %e, "Failed to remove control endpoint");
    }
    debug!(marker = ?marker, "Control channel stopped");
}

async fn serve_connection(
    mut stream: BoxedStream,
    handler: &dyn CommandHandler,
    read_timeout: Duration,
) -> std::io::Result<()> {
    let mut buf = [0u8; MAX_REQUEST_LEN];
    let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no control request received",
            ))
        }
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let request = request.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if request.is_empty() {
        return Ok(());
    }

    let subsystem = handler.subsystem();
    let reply = match ControlCommand::parse(request) {
        Ok(command) => {
            let verb = command.verb();
            let result = handler.handle(command).await;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            crate::metrics::record_control_command(subsystem.as_str(), verb, outcome);
            result
        }
        Err(e) => {
            crate::metrics::record_control_command(subsystem.as_str(), "unknown", "error");
            Err(e.into())
        }
    };

    match reply {
        Ok(Reply::Text(text)) => stream.write_all(text.as_bytes()).await?,
        Ok(Reply::File(path)) => match tokio::fs::File::open(&path).await {
            Ok(mut file) => {
                tokio::io::copy(&mut file, &mut stream).await?;
            }
            Err(e) => {
                let message = format!("ERR {}", Error::io(&path, e));
                stream.write_all(message.as_bytes()).await?;
            }
        },
        Err(e) => {
            debug!(subsystem = %subsystem, request, error = %e, "Control command failed");
            stream.write_all(format!("ERR {}", e).as_bytes()).await?;
        }
    }

    stream.shutdown().await
}
