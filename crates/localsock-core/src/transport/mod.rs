//! HTTP transport over a local channel.
//!
//! The HTTP/1.1 engine (`hyper::client::conn::http1`) expects a routable host,
//! a port and a connected socket. Here the host is the fixed
//! [`PseudoHost`] `docker://localhost`, the port comes from a scheme-selective
//! resolver, the address is always loopback, and the socket is a
//! [`LocalStream`](crate::channel::LocalStream) to the daemon's socket path or
//! pipe name.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ execute  ┌───────────────────┐ acquire ┌─────────────────────┐
//! │  caller   │─────────▶│     Transport     │────────▶│  ConnectionManager  │
//! └───────────┘          │ (PseudoHost bound)│         │  (single slot)      │
//!                        └───────────────────┘         └──────────┬──────────┘
//!                                                                 │ route
//!                             ┌───────────────────┬───────────────┼───────────────┐
//!                             ▼                   ▼               ▼               │
//!                     LoopbackResolver  LocalSchemePortResolver  Registry         │
//!                       (127.0.0.1)          (docker → 2376)      │               │
//!                                                                 ▼               │
//!                                                       LocalSocketFactory        │
//!                                                       (PlatformSelector)        │
//!                                                                 │ LocalStream   │
//!                                                                 ▼               │
//!                                                       hyper http1 handshake ◀───┘
//! ```

pub mod client;
pub mod host;
pub mod manager;
pub mod resolver;
pub mod socket;

pub use client::{Transport, TransportBuilder};
pub use host::{LOCAL_HOST_URI, LOCAL_PORT, LOCAL_SCHEME, PseudoHost, Route};
pub use manager::{ConnectionManager, Lease, Registry};
pub use resolver::{AddressResolver, LocalSchemePortResolver, LoopbackResolver, PortResolver};
pub use socket::{ConnectContext, ConnectionSocketFactory, LocalSocketFactory};

/// Errors from the local HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening or using the local channel failed. The OS error is kept as is.
    #[error("local channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pseudo-host: {0}")]
    InvalidHost(String),

    #[error("no socket factory registered for scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("no address resolved for host {0:?}")]
    UnresolvedAddress(String),

    #[error("no port resolved for scheme {0:?}")]
    UnresolvedPort(String),

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("request failed: {0}")]
    Http(#[source] hyper::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),
}

impl TransportError {
    /// The underlying OS error, when the failure came from the local channel.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            TransportError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }
}
