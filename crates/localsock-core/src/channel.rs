//! Local IPC channels for the HTTP transport.
//!
//! A daemon on the same machine is addressed by a filesystem path (Unix
//! domain socket) or a pipe name (Windows named pipe). Both are exposed as a
//! [`LocalStream`] byte stream, and the [`LocalChannel`] trait abstracts over
//! how that stream is opened so the transport never branches on the OS itself.
//!
//! ## Selection
//!
//! ```text
//!  PlatformSelector ──▶ Platform ──▶ Box<dyn LocalChannel>
//!   (fn() -> Platform)     │
//!                          ├── Posix   ──▶ DomainSocketChannel ──▶ LocalStream::DomainSocket
//!                          └── Windows ──▶ NamedPipeChannel    ──▶ LocalStream::NamedPipe
//! ```

mod domain_socket;
mod named_pipe;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::BoxFuture;

pub use domain_socket::DomainSocketChannel;
pub use named_pipe::NamedPipeChannel;

#[cfg(not(any(unix, windows)))]
compile_error!("localsock needs a unix or windows target for its local channels");

// ── Address ─────────────────────────────────────────────────────────────

/// Where the daemon listens: a socket path on POSIX, a pipe name on Windows.
///
/// Immutable once built; clones share the same backing string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress(Arc<str>);

impl ChannelAddress {
    /// Wrap a path or pipe name.
    pub fn new(address: impl Into<String>) -> Self {
        Self(Arc::from(address.into()))
    }

    /// The address as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address interpreted as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&*self.0)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelAddress {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&Path> for ChannelAddress {
    fn from(p: &Path) -> Self {
        Self::new(p.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ChannelAddress {
    fn from(p: PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

impl From<&PathBuf> for ChannelAddress {
    fn from(p: &PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

// ── Platform selection ──────────────────────────────────────────────────

/// The operating-system family that decides which channel is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Unix domain sockets.
    Posix,
    /// Windows named pipes.
    Windows,
}

/// Decides the platform at connect time.
///
/// [`Platform::current`] is the default; tests and embedders may inject a
/// different function.
pub type PlatformSelector = fn() -> Platform;

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    /// The channel implementation for this platform.
    pub fn channel(self) -> Box<dyn LocalChannel> {
        match self {
            Platform::Posix => Box::new(DomainSocketChannel),
            Platform::Windows => Box::new(NamedPipeChannel),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Posix => write!(f, "posix"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

// ── Channel trait ───────────────────────────────────────────────────────

/// A way of opening a byte stream to a local endpoint.
pub trait LocalChannel: Send + Sync {
    /// Human-readable name of this channel (e.g. "domain-socket").
    fn name(&self) -> &str;

    /// Whether this channel can be opened on the current build target.
    fn available(&self) -> bool;

    /// Connect to `address`.
    ///
    /// There is no deadline: the call waits for the OS handshake to finish.
    /// Failures are the OS error, unchanged.
    fn connect<'a>(
        &'a self,
        address: &'a ChannelAddress,
    ) -> BoxFuture<'a, io::Result<LocalStream>>;

    /// Whether `err` from [`connect`](Self::connect) means the endpoint
    /// exists but cannot take another client yet.
    ///
    /// Callers with a connect deadline retry such errors until it expires.
    fn is_busy(&self, _err: &io::Error) -> bool {
        false
    }
}

/// Error returned when a channel is asked to connect on a target that lacks it.
pub(crate) fn unsupported(channel: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{channel} channels are not supported on this platform"),
    )
}

// ── Stream ──────────────────────────────────────────────────────────────

/// A connected local byte stream.
#[derive(Debug)]
pub enum LocalStream {
    /// Connected Unix domain socket.
    #[cfg(unix)]
    DomainSocket(tokio::net::UnixStream),
    /// Connected Windows named pipe client.
    #[cfg(windows)]
    NamedPipe(tokio::net::windows::named_pipe::NamedPipeClient),
}

impl LocalStream {
    /// The platform family this stream belongs to.
    pub fn platform(&self) -> Platform {
        match self {
            #[cfg(unix)]
            LocalStream::DomainSocket(_) => Platform::Posix,
            #[cfg(windows)]
            LocalStream::NamedPipe(_) => Platform::Windows,
        }
    }
}

impl AsyncRead for LocalStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => Pin::new(p).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => Pin::new(p).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => Pin::new(p).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => s.is_write_vectored(),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => p.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => Pin::new(s).poll_flush(cx),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => Pin::new(p).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            LocalStream::DomainSocket(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(windows)]
            LocalStream::NamedPipe(p) => Pin::new(p).poll_shutdown(cx),
        }
    }
}
