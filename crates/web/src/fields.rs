//! The field registry: which transaction-map keys exist and how each one is
//! read off a native object.
//!
//! A [`FieldDescriptor`] pairs one stable key with a pure extraction
//! function. Descriptors live in a [`FieldTable`] per transaction side,
//! declared once in a fixed order; that declaration order is the iteration
//! order every map implementation observes. The tables are process-wide and
//! read-only after startup.

use http::Version;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use weft_runtime::{NativeRequest, NativeResponse, Value};

/// Key names of the recognized fields, shared by both map implementations
/// and the response writer.
pub mod keys {
    // request side
    pub const METHOD: &str = "method";
    pub const URI: &str = "uri";
    pub const PATH: &str = "path";
    pub const QUERY_STRING: &str = "query-string";
    pub const QUERY_PARAMS: &str = "query-params";
    pub const HEADERS: &str = "headers";
    pub const PATH_PARAMS: &str = "path-params";
    pub const BODY: &str = "body";
    pub const REMOTE_ADDR: &str = "remote-addr";
    pub const SCHEME: &str = "scheme";
    pub const SSL: &str = "ssl";
    pub const PROTOCOL: &str = "protocol";

    // response side
    pub const STATUS: &str = "status";
}

/// One recognized interchange key and its extraction rule.
///
/// Extraction must be a pure, idempotent read of the native object; the
/// lazy view's memoization depends on it. Absence is `None`, never a null
/// value.
pub struct FieldDescriptor<N: ?Sized + 'static> {
    key: &'static str,
    extract: fn(&N) -> Option<Value>,
}

impl<N: ?Sized> FieldDescriptor<N> {
    const fn new(key: &'static str, extract: fn(&N) -> Option<Value>) -> Self {
        Self { key, extract }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }
}

impl<N: ?Sized> fmt::Debug for FieldDescriptor<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor").field("key", &self.key).finish()
    }
}

/// The descriptors of one transaction side, in declaration order, plus a
/// key-to-position lookup.
pub struct FieldTable<N: ?Sized + 'static> {
    descriptors: &'static [FieldDescriptor<N>],
    index: HashMap<&'static str, usize>,
}

impl<N: ?Sized> FieldTable<N> {
    fn new(descriptors: &'static [FieldDescriptor<N>]) -> Self {
        let index = descriptors.iter().enumerate().map(|(pos, descriptor)| (descriptor.key, pos)).collect();
        Self { descriptors, index }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The key declared at `pos`.
    pub fn key_at(&self, pos: usize) -> &'static str {
        self.descriptors[pos].key
    }

    /// The declaration position of `key`, or `None` for custom keys.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Runs the extraction rule declared at `pos` against `native`.
    pub fn extract(&self, pos: usize, native: &N) -> Option<Value> {
        (self.descriptors[pos].extract)(native)
    }

    /// All keys in declaration order.
    pub fn field_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.iter().map(FieldDescriptor::key)
    }
}

impl<N: ?Sized> fmt::Debug for FieldTable<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTable").field("keys", &self.field_keys().collect::<Vec<_>>()).finish()
    }
}

/// The request-side field table.
pub fn request_fields() -> &'static FieldTable<dyn NativeRequest> {
    static TABLE: Lazy<FieldTable<dyn NativeRequest>> = Lazy::new(|| FieldTable::new(REQUEST_DESCRIPTORS));
    &TABLE
}

/// The response-side field table.
pub fn response_fields() -> &'static FieldTable<dyn NativeResponse> {
    static TABLE: Lazy<FieldTable<dyn NativeResponse>> = Lazy::new(|| FieldTable::new(RESPONSE_DESCRIPTORS));
    &TABLE
}

static REQUEST_DESCRIPTORS: &[FieldDescriptor<dyn NativeRequest>] = &[
    FieldDescriptor::new(keys::METHOD, req_method),
    FieldDescriptor::new(keys::URI, req_uri),
    FieldDescriptor::new(keys::PATH, req_path),
    FieldDescriptor::new(keys::QUERY_STRING, req_query_string),
    FieldDescriptor::new(keys::QUERY_PARAMS, req_query_params),
    FieldDescriptor::new(keys::HEADERS, req_headers),
    FieldDescriptor::new(keys::PATH_PARAMS, req_path_params),
    FieldDescriptor::new(keys::BODY, req_body),
    FieldDescriptor::new(keys::REMOTE_ADDR, req_remote_addr),
    FieldDescriptor::new(keys::SCHEME, req_scheme),
    FieldDescriptor::new(keys::SSL, req_ssl),
    FieldDescriptor::new(keys::PROTOCOL, req_protocol),
];

static RESPONSE_DESCRIPTORS: &[FieldDescriptor<dyn NativeResponse>] = &[
    FieldDescriptor::new(keys::STATUS, resp_status),
    FieldDescriptor::new(keys::HEADERS, resp_headers),
    FieldDescriptor::new(keys::BODY, resp_body),
];

fn req_method(req: &dyn NativeRequest) -> Option<Value> {
    Some(Value::Str(req.method().as_str().to_owned()))
}

fn req_uri(req: &dyn NativeRequest) -> Option<Value> {
    Some(Value::Str(req.uri().to_string()))
}

fn req_path(req: &dyn NativeRequest) -> Option<Value> {
    Some(Value::Str(req.uri().path().to_owned()))
}

fn req_query_string(req: &dyn NativeRequest) -> Option<Value> {
    req.query_string().map(Value::Str)
}

fn req_query_params(req: &dyn NativeRequest) -> Option<Value> {
    let query = req.query_string()?;
    serde_urlencoded::from_str::<Vec<(String, String)>>(&query).ok().map(Value::Pairs)
}

fn req_headers(req: &dyn NativeRequest) -> Option<Value> {
    Some(Value::Pairs(req.headers()))
}

fn req_path_params(req: &dyn NativeRequest) -> Option<Value> {
    let params = req.path_params();
    (!params.is_empty()).then(|| Value::Pairs(params))
}

fn req_body(req: &dyn NativeRequest) -> Option<Value> {
    req.body_bytes().map(Value::Bytes)
}

fn req_remote_addr(req: &dyn NativeRequest) -> Option<Value> {
    req.remote_addr().map(|addr| Value::Str(addr.to_string()))
}

fn req_scheme(req: &dyn NativeRequest) -> Option<Value> {
    let scheme = if req.is_secure() { "https" } else { "http" };
    Some(Value::Str(scheme.to_owned()))
}

fn req_ssl(req: &dyn NativeRequest) -> Option<Value> {
    Some(Value::Bool(req.is_secure()))
}

fn req_protocol(req: &dyn NativeRequest) -> Option<Value> {
    let protocol = match req.version() {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => return None,
    };
    Some(Value::Str(protocol.to_owned()))
}

fn resp_status(resp: &dyn NativeResponse) -> Option<Value> {
    Some(Value::Int(i64::from(resp.status().as_u16())))
}

fn resp_headers(resp: &dyn NativeResponse) -> Option<Value> {
    Some(Value::Pairs(resp.headers()))
}

// The native response payload is write-only; the body field only ever
// enters a response map through handler code.
fn resp_body(_resp: &dyn NativeResponse) -> Option<Value> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubRequest;

    #[test]
    fn request_table_declaration_order() {
        let table = request_fields();
        let keys: Vec<_> = table.field_keys().collect();
        assert_eq!(
            keys,
            vec![
                keys::METHOD,
                keys::URI,
                keys::PATH,
                keys::QUERY_STRING,
                keys::QUERY_PARAMS,
                keys::HEADERS,
                keys::PATH_PARAMS,
                keys::BODY,
                keys::REMOTE_ADDR,
                keys::SCHEME,
                keys::SSL,
                keys::PROTOCOL,
            ]
        );
        for (pos, key) in keys.iter().enumerate() {
            assert_eq!(table.position(key), Some(pos));
            assert_eq!(table.key_at(pos), *key);
        }
        assert_eq!(table.position("x-custom"), None);
    }

    #[test]
    fn extraction_of_basic_fields() {
        let req = StubRequest::get("/users/42?name=ada&lang=en").with_header("accept", "text/plain");
        let table = request_fields();

        let at = |key: &str| table.extract(table.position(key).unwrap(), &req);

        assert_eq!(at(keys::METHOD), Some(Value::Str("GET".to_owned())));
        assert_eq!(at(keys::PATH), Some(Value::Str("/users/42".to_owned())));
        assert_eq!(at(keys::QUERY_STRING), Some(Value::Str("name=ada&lang=en".to_owned())));
        assert_eq!(
            at(keys::QUERY_PARAMS),
            Some(Value::Pairs(vec![
                ("name".to_owned(), "ada".to_owned()),
                ("lang".to_owned(), "en".to_owned()),
            ]))
        );
        assert_eq!(at(keys::HEADERS), Some(Value::Pairs(vec![("accept".to_owned(), "text/plain".to_owned())])));
        assert_eq!(at(keys::SCHEME), Some(Value::Str("http".to_owned())));
        assert_eq!(at(keys::SSL), Some(Value::Bool(false)));
        assert_eq!(at(keys::PROTOCOL), Some(Value::Str("HTTP/1.1".to_owned())));
    }

    #[test]
    fn absent_fields_extract_to_none() {
        let req = StubRequest::get("/plain");
        let table = request_fields();

        let at = |key: &str| table.extract(table.position(key).unwrap(), &req);

        assert_eq!(at(keys::QUERY_STRING), None);
        assert_eq!(at(keys::QUERY_PARAMS), None);
        assert_eq!(at(keys::PATH_PARAMS), None);
        assert_eq!(at(keys::BODY), None);
        assert_eq!(at(keys::REMOTE_ADDR), None);
    }
}
