//! A listener whose accept backlog is already full.
//!
//! New connects fail with `WouldBlock` until something accepts, which is how
//! a live but overloaded daemon looks to a non-blocking client on Linux.
//! Other Unixes refuse the connect instead, so this fixture is Linux-only.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::{UnixListener, UnixSocket, UnixStream};
use tokio::task::JoinHandle;

/// Connects made while filling the queue before giving up.
const MAX_FILL: usize = 1024;

/// A Unix socket that never accepts until told to.
pub struct FullBacklog {
    socket_path: PathBuf,
    listener: Arc<UnixListener>,
    held: Vec<UnixStream>,
    drain: Option<JoinHandle<()>>,
    _temp_dir: TempDir,
}

impl FullBacklog {
    /// Bind with the smallest backlog and connect until the kernel pushes
    /// back with `WouldBlock`.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("busy.sock");

        let socket = UnixSocket::new_stream().expect("failed to create socket");
        socket.bind(&socket_path).expect("failed to bind busy socket");
        let listener = socket.listen(1).expect("failed to listen");

        let mut held = Vec::new();
        loop {
            match UnixStream::connect(&socket_path).await {
                Ok(stream) => held.push(stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("unexpected connect error while filling backlog: {e}"),
            }
            assert!(held.len() < MAX_FILL, "backlog never filled");
        }
        tracing::debug!(queued = held.len(), "Backlog full");

        Self {
            socket_path,
            listener: Arc::new(listener),
            held,
            drain: None,
            _temp_dir: temp_dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connections sitting in the queue.
    pub fn queued(&self) -> usize {
        self.held.len()
    }

    /// Start accepting (and holding) connections after `delay`.
    pub fn drain_after(&mut self, delay: Duration) {
        let listener = Arc::clone(&self.listener);
        self.drain = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut accepted = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                accepted.push(stream);
            }
        }));
    }
}

impl Drop for FullBacklog {
    fn drop(&mut self) {
        if let Some(handle) = self.drain.take() {
            handle.abort();
        }
    }
}
