#![deny(unsafe_code)]

//! Shared test utilities for the localsock workspace.
//!
//! Provides mock daemons listening on Unix sockets, config builders, and
//! tracing helpers so that individual crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! localsock-test-utils = { workspace = true }
//! ```

#[cfg(target_os = "linux")]
pub mod backlog;
pub mod config;
#[cfg(unix)]
pub mod mock;
#[cfg(unix)]
pub mod raw;
pub mod tracing_setup;

#[cfg(target_os = "linux")]
pub use backlog::FullBacklog;
#[cfg(unix)]
pub use mock::MockDaemon;
#[cfg(unix)]
pub use raw::RawDaemon;
