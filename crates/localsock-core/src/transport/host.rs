//! The pseudo-host requests are routed to, and the route key derived from it.

use std::fmt;
use std::net::SocketAddr;

use hyper::Uri;

use super::TransportError;

/// Scheme that marks requests for the local channel.
pub const LOCAL_SCHEME: &str = "docker";

/// Port reported for [`LOCAL_SCHEME`]. Never used on the wire.
pub const LOCAL_PORT: u16 = 2376;

/// The literal every transport parses its [`PseudoHost`] from.
pub const LOCAL_HOST_URI: &str = "docker://localhost";

/// The host the HTTP engine believes it is talking to.
///
/// Only used as the routing key and for the `Host` header; never resolved
/// over a network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PseudoHost {
    scheme: String,
    hostname: String,
    port: Option<u16>,
}

impl PseudoHost {
    /// Parse a `scheme://host[:port]` literal.
    pub fn parse(literal: &str) -> Result<Self, TransportError> {
        let uri: Uri = literal
            .parse()
            .map_err(|e| TransportError::InvalidHost(format!("{literal:?}: {e}")))?;

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| TransportError::InvalidHost(format!("{literal:?}: missing scheme")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| TransportError::InvalidHost(format!("{literal:?}: missing host")))?;
        if authority.host().is_empty() {
            return Err(TransportError::InvalidHost(format!(
                "{literal:?}: empty host"
            )));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            hostname: authority.host().to_string(),
            port: authority.port_u16(),
        })
    }

    /// The fixed local host, parsed from [`LOCAL_HOST_URI`].
    pub fn local() -> Result<Self, TransportError> {
        Self::parse(LOCAL_HOST_URI)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Explicit port from the literal, if any. The local literal has none.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Value for the `Host` request header.
    pub fn host_header(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.hostname),
            None => self.hostname.clone(),
        }
    }
}

impl fmt::Display for PseudoHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host_header())
    }
}

/// Connection bookkeeping key: the pseudo-host plus its fictitious address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub host: PseudoHost,
    pub address: SocketAddr,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.address)
    }
}
