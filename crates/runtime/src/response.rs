//! The write side of one outbound HTTP response.

use crate::error::WriteError;
use bytes::Bytes;
use http::StatusCode;
use std::path::Path;

/// The narrow write interface the adapter requires from the host runtime's
/// response object.
///
/// A response is ended exactly once, by [`end`], [`end_bytes`] or
/// [`send_file`]; any further end call must fail with
/// [`WriteError::AlreadyCompleted`] rather than write a second response.
///
/// [`end`]: NativeResponse::end
/// [`end_bytes`]: NativeResponse::end_bytes
/// [`send_file`]: NativeResponse::send_file
pub trait NativeResponse: Send {
    fn set_status(&mut self, status: StatusCode);

    fn status(&self) -> StatusCode;

    /// Adds a header. Additive: a repeated name appends another value
    /// instead of overwriting the previous one.
    fn put_header(&mut self, name: &str, value: &str);

    /// Headers accumulated so far, in insertion order.
    fn headers(&self) -> Vec<(String, String)>;

    /// Ends the response with the given payload.
    fn end_bytes(&mut self, payload: Bytes) -> Result<(), WriteError>;

    /// Ends the response with no payload.
    fn end(&mut self) -> Result<(), WriteError>;

    /// Ends the response by streaming a region of a file from disk. The
    /// runtime owns the actual file I/O; this is only the instruction.
    fn send_file(&mut self, path: &Path, offset: u64, length: u64) -> Result<(), WriteError>;

    /// Whether the runtime requires response writes to happen on its I/O
    /// loop thread. When true, the dispatcher re-marshals handler
    /// completions back onto the loop before writing.
    fn requires_loop_affinity(&self) -> bool {
        false
    }

    /// Whether the response has already been ended.
    fn is_ended(&self) -> bool;
}
