//! Transport facade: executes HTTP requests against the local daemon.
//!
//! Requests are written in origin form (`/path?query`); the transport supplies
//! the `Host` header from its [`PseudoHost`] and routes every exchange through
//! its [`ConnectionManager`].

use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{CONNECTION, CONTENT_TYPE, HOST, HeaderValue, USER_AGENT};
use hyper::{Method, Request, Response, Uri};
use tracing::debug;

use localsock_config::TransportConfig;

use super::TransportError;
use super::host::{LOCAL_HOST_URI, LOCAL_SCHEME, PseudoHost};
use super::manager::{ConnectionManager, Registry};
use super::resolver::{LocalSchemePortResolver, LoopbackResolver};
use super::socket::LocalSocketFactory;
use crate::build_info;
use crate::channel::{ChannelAddress, Platform, PlatformSelector};

/// HTTP client for a daemon listening on a local channel.
///
/// Cheap to clone; clones share one connection manager.
#[derive(Debug, Clone)]
pub struct Transport {
    address: ChannelAddress,
    host: PseudoHost,
    manager: Arc<ConnectionManager>,
}

impl Transport {
    /// Transport for `address` with default settings.
    pub fn new(address: impl Into<ChannelAddress>) -> Result<Self, TransportError> {
        Self::builder(address).build()
    }

    pub fn builder(address: impl Into<ChannelAddress>) -> TransportBuilder {
        TransportBuilder::new(address)
    }

    /// Transport configured from the `[transport]` config section.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::builder(config.address.as_str())
            .connect_timeout(config.connect_timeout())
            .keep_alive(config.keep_alive)
            .build()
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn host(&self) -> &PseudoHost {
        &self.host
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Execute `request` and return the complete response.
    ///
    /// The connection stays leased until the response body has been read.
    pub async fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>, TransportError> {
        let request = self.prepare(request);
        let method = request.method().clone();
        let path = request.uri().to_string();

        let mut lease = self.manager.acquire(&self.host).await?;
        debug!(
            %method,
            path = %path,
            connection_id = lease.connection_id(),
            "Local request"
        );

        let response = lease.send_request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(TransportError::Body)?.to_bytes();
        if !closes_connection(&parts.headers) {
            lease.mark_reusable();
        }

        debug!(
            %method,
            path = %path,
            status = %parts.status,
            bytes = body.len(),
            "Local response"
        );
        Ok(Response::from_parts(parts, body))
    }

    // ── Convenience verbs ──────────────────────────────────────────────

    pub async fn get(&self, path: &str) -> Result<Response<Bytes>, TransportError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn head(&self, path: &str) -> Result<Response<Bytes>, TransportError> {
        self.send(Method::HEAD, path, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response<Bytes>, TransportError> {
        self.send(Method::DELETE, path, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        self.send(Method::POST, path, Some((content_type, body.into())))
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response<Bytes>, TransportError> {
        self.send(Method::PUT, path, Some((content_type, body.into())))
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<(&str, Bytes)>,
    ) -> Result<Response<Bytes>, TransportError> {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some((content_type, bytes)) => {
                builder = builder.header(CONTENT_TYPE, content_type);
                Full::new(bytes)
            }
            None => Full::new(Bytes::new()),
        };
        self.execute(builder.body(body)?).await
    }

    /// Reduce the URI to origin form and fill in `Host` and `User-Agent`.
    fn prepare(&self, mut request: Request<Full<Bytes>>) -> Request<Full<Bytes>> {
        let uri = request.uri();
        if uri.scheme().is_some() || uri.authority().is_some() || uri.path().is_empty() {
            let origin = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .filter(|pq| pq.starts_with('/'))
                .unwrap_or("/")
                .to_string();
            if let Ok(origin) = origin.parse::<Uri>() {
                *request.uri_mut() = origin;
            }
        }

        let headers = request.headers_mut();
        if !headers.contains_key(HOST) {
            if let Ok(value) = HeaderValue::from_str(&self.host.host_header()) {
                headers.insert(HOST, value);
            }
        }
        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&build_info::user_agent()) {
                headers.insert(USER_AGENT, value);
            }
        }
        request
    }
}

/// Whether the daemon asked for the connection to be closed.
fn closes_connection(headers: &hyper::HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}

// ── Builder ─────────────────────────────────────────────────────────────

/// Builder for [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportBuilder {
    address: ChannelAddress,
    host: String,
    selector: PlatformSelector,
    connect_timeout: Option<Duration>,
    keep_alive: bool,
}

impl TransportBuilder {
    pub fn new(address: impl Into<ChannelAddress>) -> Self {
        Self {
            address: address.into(),
            host: LOCAL_HOST_URI.to_string(),
            selector: Platform::current,
            connect_timeout: None,
            keep_alive: true,
        }
    }

    /// Override the pseudo-host literal (default `docker://localhost`).
    pub fn host(mut self, literal: impl Into<String>) -> Self {
        self.host = literal.into();
        self
    }

    /// Override platform detection.
    pub fn platform_selector(mut self, selector: PlatformSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Bound the channel connect. `None` (the default) waits indefinitely.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Keep the connection open between requests (default `true`).
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Build the transport. Fails if the pseudo-host literal does not parse.
    pub fn build(self) -> Result<Transport, TransportError> {
        let host = PseudoHost::parse(&self.host)?;

        let factory = LocalSocketFactory::new(self.address.clone())
            .with_selector(self.selector)
            .with_connect_timeout(self.connect_timeout);
        let registry = Registry::new().register(LOCAL_SCHEME, Arc::new(factory));
        let manager = ConnectionManager::new(
            registry,
            Arc::new(LoopbackResolver),
            Arc::new(LocalSchemePortResolver),
        )
        .with_keep_alive(self.keep_alive);

        debug!(address = %self.address, host = %host, "Built local transport");
        Ok(Transport {
            address: self.address,
            host,
            manager: Arc::new(manager),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transport() -> Transport {
        Transport::new("/var/run/docker.sock").unwrap()
    }

    #[test]
    fn test_transport_defaults() {
        let transport = transport();
        assert_eq!(transport.address().as_str(), "/var/run/docker.sock");
        assert_eq!(transport.host().to_string(), "docker://localhost");
        assert_eq!(transport.manager().registry().schemes(), vec!["docker"]);
    }

    #[test]
    fn test_invalid_host_fails_at_build() {
        let err = Transport::builder("/var/run/docker.sock")
            .host("not a host")
            .build()
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidHost(_)));
    }

    #[test]
    fn test_from_config() {
        let config = TransportConfig {
            address: "/run/user/1000/docker.sock".to_string(),
            connect_timeout_ms: 250,
            keep_alive: false,
        };
        let transport = Transport::from_config(&config).unwrap();
        assert_eq!(transport.address().as_str(), "/run/user/1000/docker.sock");
    }

    #[test]
    fn test_prepare_reduces_absolute_uri_to_origin_form() {
        let request = Request::get("docker://localhost/v1.41/containers/json?all=1")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let request = transport().prepare(request);
        assert_eq!(request.uri().to_string(), "/v1.41/containers/json?all=1");
        assert_eq!(request.headers()[HOST], "localhost");
        assert!(
            request.headers()[USER_AGENT]
                .to_str()
                .unwrap()
                .starts_with("localsock/")
        );
    }

    #[test]
    fn test_prepare_keeps_caller_headers() {
        let request = Request::get("/_ping")
            .header(HOST, "daemon")
            .header(USER_AGENT, "custom/1.0")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let request = transport().prepare(request);
        assert_eq!(request.uri().to_string(), "/_ping");
        assert_eq!(request.headers()[HOST], "daemon");
        assert_eq!(request.headers()[USER_AGENT], "custom/1.0");
    }

    #[test]
    fn test_prepare_authority_only_uri_becomes_root() {
        let request = Request::get("http://localhost")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let request = transport().prepare(request);
        assert_eq!(request.uri().to_string(), "/");
    }

    #[test]
    fn test_closes_connection() {
        let mut headers = hyper::HeaderMap::new();
        assert!(!closes_connection(&headers));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        assert!(!closes_connection(&headers));
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade, Close"));
        assert!(closes_connection(&headers));
    }

    #[test]
    fn test_transport_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<Transport>();
    }
}
