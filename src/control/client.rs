use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::transport::{BoxedStream, LocalEndpoint};
use crate::error::{Error, Result};

/// Dials control endpoints and exchanges one request per connection
#[derive(Debug, Clone)]
pub struct ControlClient {
    transport: Arc<dyn LocalEndpoint>,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(transport: Arc<dyn LocalEndpoint>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn transport(&self) -> &Arc<dyn LocalEndpoint> {
        &self.transport
    }

    /// Send `request` and read the whole reply, bounded by the client timeout
    pub async fn send(&self, marker: &Path, request: &str) -> Result<String> {
        let exchange = async {
            let mut stream = self.open_stream(marker, request).await?;
            let mut response = Vec::new();
            match stream.read_to_end(&mut response).await {
                Ok(_) => {}
                // Named pipes report the server closing as a broken pipe
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(Error::Transport(format!(
                        "read from {} failed: {}",
                        marker.display(),
                        e
                    )))
                }
            }
            Ok(String::from_utf8_lossy(&response).into_owned())
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "{} did not reply within {}ms",
                    marker.display(),
                    self.timeout.as_millis()
                ))
            })?
    }

    /// Dial, send `request` and hand back the stream for the caller to read.
    ///
    /// Only dialing and sending are bounded by the timeout; reading a
    /// streamed reply is left to the caller.
    pub async fn open_stream(&self, marker: &Path, request: &str) -> Result<BoxedStream> {
        let connect = async {
            let mut stream = self.transport.dial(marker).await?;
            stream.write_all(request.as_bytes()).await.map_err(|e| {
                Error::Transport(format!("write to {} failed: {}", marker.display(), e))
            })?;
            stream.flush().await.map_err(|e| {
                Error::Transport(format!("write to {} failed: {}", marker.display(), e))
            })?;
            Ok(stream)
        };

        tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "{} did not accept within {}ms",
                    marker.display(),
                    self.timeout.as_millis()
                ))
            })?
    }
}
