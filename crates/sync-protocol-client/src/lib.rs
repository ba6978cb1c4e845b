//! HTTP client for the per-tenant pull/push sync protocol.
//!
//! [`SyncTransport`] is the seam the sync engine talks to. [`HttpSyncClient`]
//! is the reqwest implementation; tests substitute their own transport.
//! [`TenantRemote`] binds a transport to one tenant and one request's
//! replacement flag.

mod error;
mod http;
mod remote;
mod transport;

pub use error::{TransportError, TransportResult};
pub use http::HttpSyncClient;
pub use remote::TenantRemote;
pub use transport::SyncTransport;
