//! Address and port resolution for the pseudo-host.
//!
//! Neither resolver touches the network. The connection manager needs an
//! address and a port per route for its bookkeeping, so these return fixed
//! values that are stable across calls.

use std::net::{IpAddr, Ipv4Addr};

use super::host::{LOCAL_PORT, LOCAL_SCHEME};

/// Resolves a hostname to the addresses a route may use.
pub trait AddressResolver: Send + Sync {
    /// Addresses for `host`, in preference order.
    fn resolve(&self, host: &str) -> Vec<IpAddr>;

    /// Canonical name for `host`.
    fn resolve_canonical_name(&self, host: &str) -> String;
}

/// Resolves the port for a scheme.
pub trait PortResolver: Send + Sync {
    /// The port for `scheme`, or `None` when this resolver has no opinion.
    fn resolve(&self, scheme: &str) -> Option<u16>;
}

/// Resolves every hostname to the loopback address.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackResolver;

impl LoopbackResolver {
    pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Canonical name of [`Self::LOOPBACK`].
    pub const CANONICAL_NAME: &'static str = "localhost";
}

impl AddressResolver for LoopbackResolver {
    fn resolve(&self, _host: &str) -> Vec<IpAddr> {
        vec![Self::LOOPBACK]
    }

    fn resolve_canonical_name(&self, _host: &str) -> String {
        Self::CANONICAL_NAME.to_string()
    }
}

/// Maps [`LOCAL_SCHEME`] to [`LOCAL_PORT`] and leaves every other scheme
/// unresolved, so `http`/`https` keep their usual defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSchemePortResolver;

impl PortResolver for LocalSchemePortResolver {
    fn resolve(&self, scheme: &str) -> Option<u16> {
        scheme
            .eq_ignore_ascii_case(LOCAL_SCHEME)
            .then_some(LOCAL_PORT)
    }
}

/// Well-known port for the standard web schemes.
pub(crate) fn default_port(scheme: &str) -> Option<u16> {
    if scheme.eq_ignore_ascii_case("http") {
        Some(80)
    } else if scheme.eq_ignore_ascii_case("https") {
        Some(443)
    } else {
        None
    }
}
