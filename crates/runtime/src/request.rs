//! The read view of one inbound HTTP request.

use bytes::Bytes;
use http::{Method, Uri, Version};
use std::net::SocketAddr;

/// The narrow read interface the adapter requires from the host runtime's
/// request object.
///
/// Every method is a pure read: calling it must not consume or mutate the
/// underlying request. The single exception is [`body_bytes`], whose
/// contract is "hand over the already-buffered payload"; implementations
/// backed by a streaming body must buffer it before the request enters the
/// pipeline. Reads must be idempotent per request object, which is what the
/// lazy view's memoization relies on.
///
/// [`body_bytes`]: NativeRequest::body_bytes
pub trait NativeRequest: Send + Sync {
    fn method(&self) -> Method;

    fn uri(&self) -> Uri;

    /// All request headers as an ordered multi-map. Duplicate names appear
    /// once per occurrence, in wire order.
    fn headers(&self) -> Vec<(String, String)>;

    /// The raw query string without the leading `?`, if any.
    fn query_string(&self) -> Option<String>;

    /// Path parameters bound by the router, empty before routing.
    fn path_params(&self) -> Vec<(String, String)>;

    /// The buffered request payload, or `None` for bodyless requests.
    fn body_bytes(&self) -> Option<Bytes>;

    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Whether the connection carries TLS.
    fn is_secure(&self) -> bool;

    fn version(&self) -> Version;
}
