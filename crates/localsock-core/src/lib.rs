#![deny(unsafe_code)]

//! localsock core transport.
//!
//! Lets a network-oriented HTTP/1.1 client talk to a daemon that is only
//! reachable through a Unix domain socket (POSIX) or a named pipe (Windows).
//! The client machinery still sees a host, a port and a resolvable address;
//! those are fixed fictions, and the bytes travel over the local channel.

use std::future::Future;
use std::pin::Pin;

/// Boxed, `Send` future returned by the async methods of [`LocalChannel`] and
/// [`transport::ConnectionSocketFactory`].
///
/// Both traits are held as trait objects (`Box<dyn LocalChannel>` per
/// platform, `Arc<dyn ConnectionSocketFactory>` per scheme in the registry),
/// so their methods cannot return `impl Future`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Local IPC channels: domain sockets, named pipes, and platform selection.
pub mod channel;
/// HTTP transport bound to a local channel.
pub mod transport;

pub use channel::{ChannelAddress, LocalChannel, LocalStream, Platform, PlatformSelector};
pub use transport::{ConnectionManager, PseudoHost, Transport, TransportBuilder, TransportError};

// Request and response types in the public API come from these crates.
pub use http_body_util;
pub use hyper;
