//! Raw daemon: answers every request with a fixed byte string.
//!
//! Useful when a test needs to control the exact bytes on the wire, or to
//! inspect the request head the client actually sent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// Upper bound on a captured request head.
const MAX_HEAD: usize = 64 * 1024;

/// A Unix-socket endpoint that writes `response` to each connection, then
/// closes it.
pub struct RawDaemon {
    socket_path: PathBuf,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl RawDaemon {
    pub async fn start(response: impl Into<Vec<u8>>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("raw.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind raw socket");

        let response: Arc<[u8]> = Arc::from(response.into());
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let accepted = Arc::clone(&accepted);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let response = Arc::clone(&response);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        if let Err(e) = answer(stream, &response, &requests).await {
                            tracing::debug!(error = %e, "Raw daemon connection failed");
                        }
                    });
                }
            })
        };

        Self {
            socket_path,
            accepted,
            requests,
            handle,
            _temp_dir: temp_dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Request heads received so far, lossily decoded.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|reqs| {
                reqs.iter()
                    .map(|r| String::from_utf8_lossy(r).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for RawDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer(
    mut stream: UnixStream,
    response: &[u8],
    requests: &Mutex<Vec<Vec<u8>>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_HEAD {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    if let Ok(mut reqs) = requests.lock() {
        reqs.push(head);
    }

    stream.write_all(response).await?;
    stream.shutdown().await
}
