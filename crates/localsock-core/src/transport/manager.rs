//! Single-slot connection manager.
//!
//! There is exactly one real endpoint behind the pseudo-host, so the manager
//! keeps at most one connection and lends it to one caller at a time. Other
//! callers wait on the slot. A [`Lease`] frees the slot when dropped, whatever
//! path the caller took out of the exchange.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::TransportError;
use super::host::{PseudoHost, Route};
use super::resolver::{AddressResolver, PortResolver, default_port};
use super::socket::{ConnectContext, ConnectionSocketFactory};

// ── Registry ────────────────────────────────────────────────────────────

/// Scheme name to socket factory.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, Arc<dyn ConnectionSocketFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register `factory` for `scheme` (case-insensitive).
    pub fn register(
        mut self,
        scheme: &str,
        factory: Arc<dyn ConnectionSocketFactory>,
    ) -> Self {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
        self
    }

    pub fn lookup(&self, scheme: &str) -> Option<Arc<dyn ConnectionSocketFactory>> {
        self.factories.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

// ── Connection ──────────────────────────────────────────────────────────

/// One handshaken HTTP/1 connection over a local stream.
struct Connection {
    id: u64,
    route: Route,
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    live: Arc<AtomicUsize>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!(connection_id = self.id, "Closed local connection");
    }
}

// ── Manager ─────────────────────────────────────────────────────────────

/// Hands out the single connection to the local endpoint.
pub struct ConnectionManager {
    registry: Registry,
    address_resolver: Arc<dyn AddressResolver>,
    port_resolver: Arc<dyn PortResolver>,
    keep_alive: bool,
    slot: Arc<Mutex<Option<Connection>>>,
    next_id: AtomicU64,
    opened: AtomicU64,
    reused: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl ConnectionManager {
    /// Create a manager. Keep-alive is on by default.
    pub fn new(
        registry: Registry,
        address_resolver: Arc<dyn AddressResolver>,
        port_resolver: Arc<dyn PortResolver>,
    ) -> Self {
        Self {
            registry,
            address_resolver,
            port_resolver,
            keep_alive: true,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Builder: keep the connection in the slot between exchanges.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Compute the bookkeeping route for `host`.
    ///
    /// Fails if no factory handles the scheme, or no port can be found for it.
    pub fn route(&self, host: &PseudoHost) -> Result<Route, TransportError> {
        if self.registry.lookup(host.scheme()).is_none() {
            return Err(TransportError::UnsupportedScheme(host.scheme().to_string()));
        }

        let ip = self
            .address_resolver
            .resolve(host.hostname())
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::UnresolvedAddress(host.hostname().to_string()))?;

        let port = host
            .port()
            .or_else(|| self.port_resolver.resolve(host.scheme()))
            .or_else(|| default_port(host.scheme()))
            .ok_or_else(|| TransportError::UnresolvedPort(host.scheme().to_string()))?;

        Ok(Route {
            host: host.clone(),
            address: (ip, port).into(),
        })
    }

    /// Lease the connection for `host`, opening one if needed.
    ///
    /// Waits while another caller holds the lease.
    ///
    /// An idle connection is reused only if it is still open when checked.
    /// The daemon may still close it between that check and the request; the
    /// request then fails with [`TransportError::Http`] and the connection is
    /// discarded, so the next call opens a fresh one.
    pub async fn acquire(&self, host: &PseudoHost) -> Result<Lease, TransportError> {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;
        let route = self.route(host)?;

        if let Some(mut idle) = slot.take() {
            if idle.route == route
                && idle.sender.ready().await.is_ok()
                && !idle.sender.is_closed()
            {
                self.reused.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id = idle.id, route = %route, "Reusing idle connection");
                return Ok(self.lease(slot, idle));
            }
            debug!(connection_id = idle.id, "Discarding stale connection");
        }

        let connection = self.open(route).await?;
        Ok(self.lease(slot, connection))
    }

    fn lease(&self, slot: OwnedMutexGuard<Option<Connection>>, connection: Connection) -> Lease {
        Lease {
            slot,
            connection: Some(connection),
            reusable: false,
            keep_alive: self.keep_alive,
        }
    }

    async fn open(&self, route: Route) -> Result<Connection, TransportError> {
        let factory = self
            .registry
            .lookup(route.host.scheme())
            .ok_or_else(|| TransportError::UnsupportedScheme(route.host.scheme().to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let context = ConnectContext {
            route: route.clone(),
            connection_id: id,
        };

        let socket = factory.create_socket(&context).await?;
        let socket = factory
            .connect_socket(None, socket, &route.host, route.address, None, &context)
            .await?;

        let (sender, conn) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(socket))
            .await
            .map_err(TransportError::Handshake)?;

        // Drive the connection in the background
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(connection_id = id, error = %e, "Local connection error");
            }
        });

        self.opened.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(connection_id = id, route = %route, "Opened local connection");

        Ok(Connection {
            id,
            route,
            sender,
            driver,
            live: Arc::clone(&self.live),
        })
    }

    /// Connections opened since creation.
    pub fn connections_opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Times an idle connection was handed out again.
    pub fn connections_reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    /// Connections currently open, leased or idle.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Whether a caller currently holds the lease.
    pub fn is_leased(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Close the idle connection, if any. Waits for an outstanding lease.
    pub async fn close_idle(&self) {
        let mut slot = self.slot.lock().await;
        slot.take();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .field("keep_alive", &self.keep_alive)
            .field("opened", &self.connections_opened())
            .field("live", &self.live_connections())
            .finish()
    }
}

// ── Lease ───────────────────────────────────────────────────────────────

/// Exclusive use of the manager's connection for one exchange.
///
/// Dropping the lease frees the slot. The connection goes back into the slot
/// only after [`mark_reusable`](Self::mark_reusable) and with keep-alive on;
/// otherwise it is closed.
pub struct Lease {
    slot: OwnedMutexGuard<Option<Connection>>,
    connection: Option<Connection>,
    reusable: bool,
    keep_alive: bool,
}

impl Lease {
    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.id)
    }

    pub fn route(&self) -> Option<&Route> {
        self.connection.as_ref().map(|c| &c.route)
    }

    /// Send `request` over the leased connection.
    pub async fn send_request(
        &mut self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, TransportError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        };
        connection
            .sender
            .send_request(request)
            .await
            .map_err(TransportError::Http)
    }

    /// The exchange completed cleanly; the connection may serve another.
    pub fn mark_reusable(&mut self) {
        self.reusable = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.reusable && self.keep_alive {
                *self.slot = Some(connection);
            }
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("connection_id", &self.connection_id())
            .field("reusable", &self.reusable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::host::LOCAL_SCHEME;
    use crate::transport::resolver::{LocalSchemePortResolver, LoopbackResolver};
    use crate::transport::socket::LocalSocketFactory;
    use pretty_assertions::assert_eq;
    use std::net::SocketAddr;

    fn manager(address: &str) -> ConnectionManager {
        let registry =
            Registry::new().register(LOCAL_SCHEME, Arc::new(LocalSocketFactory::new(address)));
        ConnectionManager::new(
            registry,
            Arc::new(LoopbackResolver),
            Arc::new(LocalSchemePortResolver),
        )
    }

    #[test]
    fn test_route_uses_loopback_and_sentinel_port() {
        let manager = manager("/var/run/docker.sock");
        let route = manager.route(&PseudoHost::local().unwrap()).unwrap();
        assert_eq!(route.address, "127.0.0.1:2376".parse::<SocketAddr>().unwrap());
        assert_eq!(route.host.hostname(), "localhost");
    }

    #[test]
    fn test_route_keeps_explicit_port() {
        let manager = manager("/var/run/docker.sock");
        let host = PseudoHost::parse("docker://localhost:9000").unwrap();
        assert_eq!(manager.route(&host).unwrap().address.port(), 9000);
    }

    #[test]
    fn test_route_rejects_unregistered_scheme() {
        let manager = manager("/var/run/docker.sock");
        let host = PseudoHost::parse("http://localhost").unwrap();
        let err = manager.route(&host).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme(s) if s == "http"));
    }

    #[test]
    fn test_route_falls_back_to_default_port_for_foreign_scheme() {
        let registry = Registry::new()
            .register("http", Arc::new(LocalSocketFactory::new("/tmp/x.sock")));
        let manager = ConnectionManager::new(
            registry,
            Arc::new(LoopbackResolver),
            Arc::new(LocalSchemePortResolver),
        );
        let host = PseudoHost::parse("http://localhost").unwrap();
        assert_eq!(manager.route(&host).unwrap().address.port(), 80);
    }

    #[test]
    fn test_route_unresolved_port() {
        let registry = Registry::new()
            .register("unix", Arc::new(LocalSocketFactory::new("/tmp/x.sock")));
        let manager = ConnectionManager::new(
            registry,
            Arc::new(LoopbackResolver),
            Arc::new(LocalSchemePortResolver),
        );
        let host = PseudoHost::parse("unix://localhost").unwrap();
        assert!(matches!(
            manager.route(&host),
            Err(TransportError::UnresolvedPort(_))
        ));
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = Registry::new()
            .register("Docker", Arc::new(LocalSocketFactory::new("/tmp/x.sock")));
        assert!(registry.lookup("docker").is_some());
        assert!(registry.lookup("DOCKER").is_some());
        assert!(registry.lookup("http").is_none());
        assert_eq!(registry.schemes(), vec!["docker".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_missing_endpoint_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let manager = manager(path.to_str().unwrap());

        let err = manager
            .acquire(&PseudoHost::local().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
        assert!(!manager.is_leased());
        assert_eq!(manager.live_connections(), 0);
        assert_eq!(manager.connections_opened(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lease_holds_slot_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let manager = manager(path.to_str().unwrap());

        let lease = manager.acquire(&PseudoHost::local().unwrap()).await.unwrap();
        assert!(manager.is_leased());
        assert_eq!(lease.connection_id(), Some(1));
        assert_eq!(manager.live_connections(), 1);

        // Not marked reusable: the connection is closed on release.
        drop(lease);
        assert!(!manager.is_leased());
        assert_eq!(manager.live_connections(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reusable_lease_returns_connection_to_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let manager = manager(path.to_str().unwrap());

        let mut lease = manager.acquire(&PseudoHost::local().unwrap()).await.unwrap();
        lease.mark_reusable();
        drop(lease);
        assert_eq!(manager.live_connections(), 1);

        manager.close_idle().await;
        assert_eq!(manager.live_connections(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_idle_connection_closed_by_peer_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let manager = manager(path.to_str().unwrap());
        let host = PseudoHost::local().unwrap();

        let mut lease = manager.acquire(&host).await.unwrap();
        lease.mark_reusable();
        drop(lease);

        // Daemon hangs up on the idle connection.
        let (server, _) = listener.accept().await.unwrap();
        drop(server);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let lease = manager.acquire(&host).await.unwrap();
        assert_eq!(lease.connection_id(), Some(2));
        assert_eq!(manager.connections_opened(), 2);
        assert_eq!(manager.connections_reused(), 0);
        assert_eq!(manager.live_connections(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keep_alive_disabled_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let manager = manager(path.to_str().unwrap()).with_keep_alive(false);

        let mut lease = manager.acquire(&PseudoHost::local().unwrap()).await.unwrap();
        lease.mark_reusable();
        drop(lease);
        assert_eq!(manager.live_connections(), 0);
    }
}
