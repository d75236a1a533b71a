//! Local IPC transport behind the control channels.
//!
//! Every endpoint is addressed by a marker path in the shared base directory
//! (`{dir}/log_{module}.sock`). On Unix the marker is the socket itself; on
//! Windows it is a plain file that makes the endpoint discoverable, and the
//! byte stream runs over the named pipe `\\.\pipe\{stem}.pipe`.

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Bidirectional byte stream accepted from or dialed to an endpoint
pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IpcStream for T {}

pub type BoxedStream = Box<dyn IpcStream>;

#[async_trait]
pub trait IpcListener: Send {
    async fn accept(&mut self) -> std::io::Result<BoxedStream>;
}

/// Listen, dial and remove operations for one platform's IPC primitive
#[async_trait]
pub trait LocalEndpoint: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn listen(&self, marker: &Path) -> Result<Box<dyn IpcListener>>;

    async fn dial(&self, marker: &Path) -> Result<BoxedStream>;

    /// Remove the marker. Missing markers are not an error.
    fn remove(&self, marker: &Path) -> Result<()>;
}

/// Transport for the current platform
pub fn platform_transport() -> Arc<dyn LocalEndpoint> {
    #[cfg(unix)]
    {
        Arc::new(unix::UnixSocketTransport)
    }

    #[cfg(windows)]
    {
        Arc::new(windows::NamedPipeTransport)
    }
}

fn remove_marker(marker: &Path) -> Result<()> {
    match std::fs::remove_file(marker) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(marker, e)),
    }
}

#[cfg(unix)]
pub use unix::UnixSocketTransport;

#[cfg(unix)]
mod unix {
    use super::*;
    use tokio::net::{UnixListener, UnixStream};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct UnixSocketTransport;

    struct SocketListener(UnixListener);

    #[async_trait]
    impl IpcListener for SocketListener {
        async fn accept(&mut self) -> std::io::Result<BoxedStream> {
            let (stream, _) = self.0.accept().await?;
            Ok(Box::new(stream))
        }
    }

    #[async_trait]
    impl LocalEndpoint for UnixSocketTransport {
        fn name(&self) -> &'static str {
            "unix-socket"
        }

        async fn listen(&self, marker: &Path) -> Result<Box<dyn IpcListener>> {
            let listener = UnixListener::bind(marker).map_err(|e| {
                Error::Transport(format!("cannot listen on {}: {}", marker.display(), e))
            })?;
            Ok(Box::new(SocketListener(listener)))
        }

        async fn dial(&self, marker: &Path) -> Result<BoxedStream> {
            let stream = UnixStream::connect(marker).await.map_err(|e| {
                Error::Transport(format!("dial {} failed: {}", marker.display(), e))
            })?;
            Ok(Box::new(stream))
        }

        fn remove(&self, marker: &Path) -> Result<()> {
            remove_marker(marker)
        }
    }
}

#[cfg(windows)]
pub use windows::NamedPipeTransport;

#[cfg(windows)]
mod windows {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct NamedPipeTransport;

    /// `\\.\pipe\{stem}.pipe` for a marker `{dir}/{stem}.sock`
    pub fn pipe_name(marker: &Path) -> String {
        let stem = marker
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(r"\\.\pipe\{}.pipe", stem)
    }

    struct PipeListener {
        name: String,
        next: NamedPipeServer,
    }

    #[async_trait]
    impl IpcListener for PipeListener {
        async fn accept(&mut self) -> std::io::Result<BoxedStream> {
            self.next.connect().await?;
            let server = ServerOptions::new().create(&self.name)?;
            let connected = std::mem::replace(&mut self.next, server);
            Ok(Box::new(connected))
        }
    }

    #[async_trait]
    impl LocalEndpoint for NamedPipeTransport {
        fn name(&self) -> &'static str {
            "named-pipe"
        }

        async fn listen(&self, marker: &Path) -> Result<Box<dyn IpcListener>> {
            let name = pipe_name(marker);
            let next = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&name)
                .map_err(|e| Error::Transport(format!("cannot listen on {}: {}", name, e)))?;
            std::fs::File::create(marker).map_err(|e| Error::io(marker, e))?;
            Ok(Box::new(PipeListener { name, next }))
        }

        async fn dial(&self, marker: &Path) -> Result<BoxedStream> {
            let name = pipe_name(marker);
            let client = ClientOptions::new()
                .open(&name)
                .map_err(|e| Error::Transport(format!("dial {} failed: {}", name, e)))?;
            Ok(Box::new(client))
        }

        fn remove(&self, marker: &Path) -> Result<()> {
            remove_marker(marker)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listen_dial_remove() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("log_svc.sock");
        let transport = platform_transport();

        let mut listener = transport.listen(&marker).await.unwrap();
        let server = tokio::spawn(async move {
            let mut stream = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let mut client = transport.dial(&marker).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut echoed = Vec::new();
        client.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, b"ping");
        server.await.unwrap();

        transport.remove(&marker).unwrap();
        assert!(!marker.exists());
        transport.remove(&marker).unwrap();
    }

    #[tokio::test]
    async fn test_dial_missing_endpoint() {
        let dir = TempDir::new().unwrap();
        let transport = platform_transport();
        let result = transport.dial(&dir.path().join("log_none.sock")).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
