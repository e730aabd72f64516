//! Transaction maps: the key-value representation of one HTTP request or
//! response travelling through the pipeline.
//!
//! Two implementations exist. [`Snapshot`] extracts every recognized field
//! up front into an immutable map and is safe to share across threads.
//! [`LazyView`] stays backed by the native object and computes fields on
//! first read, caching the result; it has exactly one owner at a time.
//! [`Transaction`] is the uniform facade the pipeline threads through
//! middleware and handlers.

mod lazy;
mod snapshot;

pub use lazy::{Entries, LazyRequest, LazyView};
pub use snapshot::Snapshot;

use crate::fields::keys;
use http::StatusCode;
use std::sync::Arc;
use weft_runtime::{NativeRequest, Value};

/// A transaction map key: either a recognized field (backed by a
/// descriptor) or a custom key added by middleware/handler code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TxnKey {
    Field(&'static str),
    Custom(String),
}

impl TxnKey {
    pub fn as_str(&self) -> &str {
        match self {
            TxnKey::Field(key) => key,
            TxnKey::Custom(key) => key.as_str(),
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, TxnKey::Field(_))
    }
}

impl PartialEq<str> for TxnKey {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

/// The transaction map a pipeline stage holds, in either representation.
///
/// Mutating calls on the eager variant replace the inner snapshot with its
/// copy-on-write successor, so one uniform mutable API serves both.
#[derive(Debug)]
pub enum Transaction {
    Eager(Snapshot),
    Lazy(LazyRequest),
}

impl Transaction {
    /// Materializes every request field up front.
    pub fn eager(native: &(dyn NativeRequest + 'static)) -> Self {
        Transaction::Eager(Snapshot::from_request(native))
    }

    /// Defers request fields until first read.
    pub fn lazy(native: Arc<dyn NativeRequest>) -> Self {
        Transaction::Lazy(LazyView::of_request(native))
    }

    /// An empty response-side map for handlers to fill in.
    pub fn response() -> Self {
        Transaction::Eager(Snapshot::new())
    }

    /// Looks up `key`. May compute and cache on the lazy variant, hence
    /// `&mut self`.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        match self {
            Transaction::Eager(snapshot) => snapshot.get(key),
            Transaction::Lazy(view) => view.get(key),
        }
    }

    pub fn contains_key(&mut self, key: &str) -> bool {
        match self {
            Transaction::Eager(snapshot) => snapshot.contains_key(key),
            Transaction::Lazy(view) => view.contains_key(key),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        match self {
            Transaction::Eager(snapshot) => {
                let next = snapshot.assoc(key, value);
                *snapshot = next;
            }
            Transaction::Lazy(view) => {
                view.insert(key, value);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self {
            Transaction::Eager(snapshot) => {
                let removed = snapshot.get(key).cloned();
                if removed.is_some() {
                    *snapshot = snapshot.without(key);
                }
                removed
            }
            Transaction::Lazy(view) => view.remove(key),
        }
    }

    pub fn len(&mut self) -> usize {
        match self {
            Transaction::Eager(snapshot) => snapshot.len(),
            Transaction::Lazy(view) => view.len(),
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            Transaction::Eager(snapshot) => *snapshot = Snapshot::new(),
            Transaction::Lazy(view) => view.clear(),
        }
    }

    /// Every entry in iteration order: recognized fields first, in
    /// declaration order, then custom keys in insertion order.
    pub fn entries(&mut self) -> Vec<(TxnKey, Value)> {
        match self {
            Transaction::Eager(snapshot) => snapshot.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Transaction::Lazy(view) => view.entries().collect(),
        }
    }

    /// Sets the response status field.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.insert(keys::STATUS, i64::from(status.as_u16()));
        self
    }

    /// Appends one response header, preserving earlier values for the same
    /// name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut headers = self.get(keys::HEADERS).and_then(Value::as_pairs).map(<[_]>::to_vec).unwrap_or_default();
        headers.push((name.into(), value.into()));
        self.insert(keys::HEADERS, headers);
        self
    }

    /// Sets the response body field.
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.insert(keys::BODY, body);
        self
    }
}
