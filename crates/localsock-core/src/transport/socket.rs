//! Socket factories: how the connection manager obtains a connected stream.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, trace};

use crate::BoxFuture;
use crate::channel::{ChannelAddress, LocalChannel, LocalStream, Platform, PlatformSelector};

use super::host::{PseudoHost, Route};

/// Pause between connect attempts while the endpoint is busy.
const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Per-connection data handed to a socket factory.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    pub route: Route,
    pub connection_id: u64,
}

/// Creates and connects sockets for one scheme.
///
/// Connection happens in two phases: [`create_socket`](Self::create_socket)
/// returns a stream, [`connect_socket`](Self::connect_socket) is then given
/// the route's timeout and addresses to finish the job.
pub trait ConnectionSocketFactory: Send + Sync {
    fn create_socket<'a>(
        &'a self,
        context: &'a ConnectContext,
    ) -> BoxFuture<'a, io::Result<LocalStream>>;

    fn connect_socket<'a>(
        &'a self,
        connect_timeout: Option<Duration>,
        socket: LocalStream,
        host: &'a PseudoHost,
        remote_address: SocketAddr,
        local_address: Option<SocketAddr>,
        context: &'a ConnectContext,
    ) -> BoxFuture<'a, io::Result<LocalStream>>;
}

/// Socket factory bound to one local channel address.
///
/// The stream is fully connected by `create_socket`; `connect_socket` hands it
/// back untouched. A connect deadline, when wanted, is configured here with
/// [`with_connect_timeout`](Self::with_connect_timeout) and applies to
/// `create_socket`.
///
/// Without a deadline every connect error, including a busy endpoint, is
/// returned at once. With one, a busy endpoint (full accept backlog, pipe
/// instances all taken) is retried until the deadline expires, which then
/// fails with [`io::ErrorKind::TimedOut`].
#[derive(Debug, Clone)]
pub struct LocalSocketFactory {
    address: ChannelAddress,
    selector: PlatformSelector,
    connect_timeout: Option<Duration>,
}

impl LocalSocketFactory {
    /// Factory for `address`, selecting the channel for the current platform.
    pub fn new(address: impl Into<ChannelAddress>) -> Self {
        Self {
            address: address.into(),
            selector: Platform::current,
            connect_timeout: None,
        }
    }

    /// Builder: replace the platform selector.
    pub fn with_selector(mut self, selector: PlatformSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Builder: bound the channel connect. `None` waits indefinitely.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    async fn open(&self, context: &ConnectContext) -> io::Result<LocalStream> {
        let platform = (self.selector)();
        let channel = platform.channel();
        debug!(
            connection_id = context.connection_id,
            platform = %platform,
            channel = channel.name(),
            address = %self.address,
            "Opening local channel"
        );

        let Some(limit) = self.connect_timeout else {
            return channel.connect(&self.address).await;
        };

        tokio::time::timeout(limit, connect_until_ready(channel.as_ref(), &self.address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out after {limit:?}", self.address),
                )
            })?
    }
}

/// Connect, retrying while the channel reports the endpoint busy.
///
/// Only used under a deadline; the caller bounds the loop.
async fn connect_until_ready(
    channel: &dyn LocalChannel,
    address: &ChannelAddress,
) -> io::Result<LocalStream> {
    loop {
        match channel.connect(address).await {
            Err(e) if channel.is_busy(&e) => {
                trace!(channel = channel.name(), address = %address, "Endpoint busy, retrying");
                tokio::time::sleep(BUSY_RETRY_INTERVAL).await;
            }
            result => return result,
        }
    }
}

impl ConnectionSocketFactory for LocalSocketFactory {
    fn create_socket<'a>(
        &'a self,
        context: &'a ConnectContext,
    ) -> BoxFuture<'a, io::Result<LocalStream>> {
        Box::pin(self.open(context))
    }

    fn connect_socket<'a>(
        &'a self,
        _connect_timeout: Option<Duration>,
        socket: LocalStream,
        _host: &'a PseudoHost,
        _remote_address: SocketAddr,
        _local_address: Option<SocketAddr>,
        _context: &'a ConnectContext,
    ) -> BoxFuture<'a, io::Result<LocalStream>> {
        // Already connected by create_socket.
        Box::pin(std::future::ready(Ok(socket)))
    }
}
