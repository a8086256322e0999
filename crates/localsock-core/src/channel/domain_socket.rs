//! Unix domain socket channel.

use std::io;

use crate::BoxFuture;

use super::{ChannelAddress, LocalChannel, LocalStream};

/// Opens a [`tokio::net::UnixStream`] to a socket path.
///
/// On non-Unix targets [`available()`](LocalChannel::available) is `false`
/// and connecting fails with [`io::ErrorKind::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainSocketChannel;

impl LocalChannel for DomainSocketChannel {
    fn name(&self) -> &str {
        "domain-socket"
    }

    fn available(&self) -> bool {
        cfg!(unix)
    }

    fn connect<'a>(
        &'a self,
        address: &'a ChannelAddress,
    ) -> BoxFuture<'a, io::Result<LocalStream>> {
        Box::pin(connect_domain_socket(address))
    }

    /// A full accept backlog fails the non-blocking connect with `EAGAIN`.
    fn is_busy(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::WouldBlock
    }
}

#[cfg(unix)]
async fn connect_domain_socket(address: &ChannelAddress) -> io::Result<LocalStream> {
    tracing::debug!(channel = "domain-socket", address = %address, "Connecting");
    let stream = tokio::net::UnixStream::connect(address.as_path()).await?;
    Ok(LocalStream::DomainSocket(stream))
}

#[cfg(not(unix))]
async fn connect_domain_socket(_address: &ChannelAddress) -> io::Result<LocalStream> {
    Err(super::unsupported("domain-socket"))
}
