//! In-memory test doubles for the native request and response traits.
//!
//! These back the crate's own tests and are exported for downstream
//! integrations to test handlers without a live runtime. Constructors panic
//! on malformed input; they are test fixtures, not production parsers.

use bytes::Bytes;
use http::{Method, StatusCode, Uri, Version};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use weft_runtime::{NativeRequest, NativeResponse, WriteError};

/// A canned inbound request.
///
/// Built with the `with_*` methods; [`set_header`](Self::set_header) mutates
/// a built request in place, for exercising the lazy view's memoization
/// against a native object that changes under it.
#[derive(Debug)]
pub struct StubRequest {
    method: Method,
    uri: Uri,
    headers: Mutex<Vec<(String, String)>>,
    path_params: Vec<(String, String)>,
    body: Option<Bytes>,
    remote_addr: Option<SocketAddr>,
    secure: bool,
    version: Version,
}

impl StubRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.parse().expect("stub request uri must be valid"),
            headers: Mutex::new(Vec::new()),
            path_params: Vec::new(),
            body: None,
            remote_addr: None,
            secure: false,
            version: Version::HTTP_11,
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_path_params(mut self, params: Vec<(String, String)>) -> Self {
        self.path_params = params;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Replaces the header (or adds it) on a shared request, after the fact.
    pub fn set_header(&self, name: &str, value: &str) {
        let mut headers = self.headers.lock().expect("stub request lock poisoned");
        match headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_owned(),
            None => headers.push((name.to_owned(), value.to_owned())),
        }
    }
}

impl NativeRequest for StubRequest {
    fn method(&self) -> Method {
        self.method.clone()
    }

    fn uri(&self) -> Uri {
        self.uri.clone()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().expect("stub request lock poisoned").clone()
    }

    fn query_string(&self) -> Option<String> {
        self.uri.query().map(str::to_owned)
    }

    fn path_params(&self) -> Vec<(String, String)> {
        self.path_params.clone()
    }

    fn body_bytes(&self) -> Option<Bytes> {
        self.body.clone()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn version(&self) -> Version {
        self.version
    }
}

#[derive(Debug)]
struct Recorded {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    file: Option<(PathBuf, u64, u64)>,
    ended: bool,
}

impl Default for Recorded {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: Vec::new(), body: None, file: None, ended: false }
    }
}

/// A response object that records every write instead of touching a socket.
///
/// [`probe`](Self::probe) yields a handle onto the recorded state that stays
/// readable after the response is boxed and moved into the pipeline.
#[derive(Debug, Default)]
pub struct RecordingResponse {
    state: Arc<Mutex<Recorded>>,
    fail_writes: bool,
    loop_affinity: bool,
}

impl RecordingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// A response whose end calls fail as if the peer hung up.
    pub fn failing() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    /// A response that demands writes happen on the I/O loop.
    pub fn loop_affine() -> Self {
        Self { loop_affinity: true, ..Self::default() }
    }

    pub fn probe(&self) -> ResponseProbe {
        ResponseProbe(Arc::clone(&self.state))
    }

    fn complete(&mut self, body: Option<Bytes>, file: Option<(PathBuf, u64, u64)>) -> Result<(), WriteError> {
        let mut state = self.state.lock().expect("recording response lock poisoned");
        if state.ended {
            return Err(WriteError::AlreadyCompleted);
        }
        if self.fail_writes {
            return Err(WriteError::connection_broken("peer reset the connection"));
        }
        state.body = body;
        state.file = file;
        state.ended = true;
        Ok(())
    }
}

impl NativeResponse for RecordingResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.state.lock().expect("recording response lock poisoned").status = status;
    }

    fn status(&self) -> StatusCode {
        self.state.lock().expect("recording response lock poisoned").status
    }

    fn put_header(&mut self, name: &str, value: &str) {
        self.state
            .lock()
            .expect("recording response lock poisoned")
            .headers
            .push((name.to_owned(), value.to_owned()));
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.state.lock().expect("recording response lock poisoned").headers.clone()
    }

    fn end_bytes(&mut self, payload: Bytes) -> Result<(), WriteError> {
        self.complete(Some(payload), None)
    }

    fn end(&mut self) -> Result<(), WriteError> {
        self.complete(None, None)
    }

    fn send_file(&mut self, path: &Path, offset: u64, length: u64) -> Result<(), WriteError> {
        self.complete(None, Some((path.to_owned(), offset, length)))
    }

    fn requires_loop_affinity(&self) -> bool {
        self.loop_affinity
    }

    fn is_ended(&self) -> bool {
        self.state.lock().expect("recording response lock poisoned").ended
    }
}

/// Read access to what a [`RecordingResponse`] has recorded.
#[derive(Debug, Clone)]
pub struct ResponseProbe(Arc<Mutex<Recorded>>);

impl ResponseProbe {
    pub fn status(&self) -> StatusCode {
        self.0.lock().expect("recording response lock poisoned").status
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.0.lock().expect("recording response lock poisoned").headers.clone()
    }

    /// All values recorded for the header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Vec<String> {
        self.0
            .lock()
            .expect("recording response lock poisoned")
            .headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn body(&self) -> Option<Bytes> {
        self.0.lock().expect("recording response lock poisoned").body.clone()
    }

    pub fn sent_file(&self) -> Option<(PathBuf, u64, u64)> {
        self.0.lock().expect("recording response lock poisoned").file.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.0.lock().expect("recording response lock poisoned").ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_file_records_the_instruction_and_ends_the_response() {
        let mut resp = RecordingResponse::new();
        let probe = resp.probe();

        resp.send_file(Path::new("/var/www/index.html"), 64, 4096).unwrap();

        assert_eq!(probe.sent_file(), Some((PathBuf::from("/var/www/index.html"), 64, 4096)));
        assert_eq!(probe.body(), None);
        assert!(probe.is_ended());
    }

    #[test]
    fn every_end_call_after_the_first_is_already_completed() {
        let mut resp = RecordingResponse::new();
        resp.send_file(Path::new("/tmp/a"), 0, 1).unwrap();

        assert!(matches!(resp.end(), Err(WriteError::AlreadyCompleted)));
        assert!(matches!(resp.end_bytes(Bytes::from_static(b"late")), Err(WriteError::AlreadyCompleted)));
        assert!(matches!(resp.send_file(Path::new("/tmp/b"), 0, 1), Err(WriteError::AlreadyCompleted)));
    }

    #[test]
    fn set_header_replaces_in_place_case_insensitively() {
        let req = StubRequest::get("/x").with_header("X-Kind", "a");
        req.set_header("x-kind", "b");
        req.set_header("other", "c");

        assert_eq!(
            req.headers(),
            vec![("X-Kind".to_owned(), "b".to_owned()), ("other".to_owned(), "c".to_owned())]
        );
    }
}
