//! The lazy, cached, mutable transaction view.

use crate::fields::{FieldTable, request_fields};
use crate::txn::TxnKey;
use std::fmt;
use std::sync::Arc;
use weft_runtime::{NativeRequest, Value};

/// Per-field cache slot.
///
/// `Pending` means the extraction rule has not run yet. Once it runs, the
/// slot is either `Cached` or `Absent` and stays that way: later reads see
/// the memoized outcome even if the native object changed underneath.
#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Cached(Value),
    Absent,
}

/// The lazy view over one request.
pub type LazyRequest = LazyView<dyn NativeRequest>;

/// A mutable transaction map backed by the native object directly.
///
/// Recognized fields are computed on first read and cached; removing one
/// leaves a tombstone so the field does not reappear on the next read.
/// Custom keys live in an insertion-ordered overflow list.
///
/// The view is not safe for concurrent mutation: exactly one owner (the
/// stage currently processing the transaction) holds it at a time, which
/// the `&mut self` receivers enforce at compile time. Hand-off between
/// stages moves the view by value.
pub struct LazyView<N: ?Sized + 'static> {
    native: Arc<N>,
    table: &'static FieldTable<N>,
    slots: Vec<Slot>,
    tombstones: Vec<bool>,
    overflow: Vec<(String, Value)>,
}

impl LazyView<dyn NativeRequest> {
    /// Creates a lazy view over `native` using the request-side table.
    pub fn of_request(native: Arc<dyn NativeRequest>) -> Self {
        Self::over(request_fields(), native)
    }
}

impl<N: ?Sized> LazyView<N> {
    /// Creates a lazy view over `native` with an explicit field table.
    pub fn over(table: &'static FieldTable<N>, native: Arc<N>) -> Self {
        Self {
            native,
            table,
            slots: vec![Slot::Pending; table.len()],
            tombstones: vec![false; table.len()],
            overflow: Vec::new(),
        }
    }

    /// Looks up `key`, computing and caching a recognized field on first
    /// read. Tombstoned and absent fields read as `None`.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        match self.table.position(key) {
            Some(pos) => {
                if self.tombstones[pos] {
                    return None;
                }
                self.force(pos);
                match &self.slots[pos] {
                    Slot::Cached(value) => Some(value),
                    _ => None,
                }
            }
            None => self.overflow.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        }
    }

    /// `get` with an explicit fallback, mirroring a map `valAt(key, default)`.
    pub fn get_or<'v>(&'v mut self, key: &str, default: &'v Value) -> &'v Value {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Binds `key` to `value`. A recognized key is written straight into
    /// the cache (its extraction rule will never run) and loses any
    /// tombstone; a custom key is replaced in place or appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.table.position(&key) {
            Some(pos) => {
                self.tombstones[pos] = false;
                let previous = std::mem::replace(&mut self.slots[pos], Slot::Cached(value));
                match previous {
                    Slot::Cached(old) => Some(old),
                    _ => None,
                }
            }
            None => match self.overflow.iter_mut().find(|(k, _)| *k == key) {
                Some((_, slot)) => Some(std::mem::replace(slot, value)),
                None => {
                    self.overflow.push((key, value));
                    None
                }
            },
        }
    }

    /// Removes `key`. A recognized key is tombstoned; its cache entry, if
    /// any, is returned and dropped.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self.table.position(key) {
            Some(pos) => {
                let previous = std::mem::replace(&mut self.slots[pos], Slot::Pending);
                let was_tombstoned = std::mem::replace(&mut self.tombstones[pos], true);
                match previous {
                    Slot::Cached(old) if !was_tombstoned => Some(old),
                    _ => None,
                }
            }
            None => {
                let pos = self.overflow.iter().position(|(k, _)| k == key)?;
                Some(self.overflow.remove(pos).1)
            }
        }
    }

    /// The number of present entries. Forces any still-pending fields,
    /// since a field whose extraction comes up absent does not count.
    pub fn len(&mut self) -> usize {
        let mut count = self.overflow.len();
        for pos in 0..self.table.len() {
            if self.tombstones[pos] {
                continue;
            }
            self.force(pos);
            if matches!(self.slots[pos], Slot::Cached(_)) {
                count += 1;
            }
        }
        count
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Returns the view to the empty map, in place: drops the overflow and
    /// the cache and tombstones every recognized key. Removal is permanent;
    /// cleared fields are not recomputed from the native object, only an
    /// explicit `insert` revives a key.
    pub fn clear(&mut self) {
        self.overflow.clear();
        for pos in 0..self.table.len() {
            self.slots[pos] = Slot::Pending;
            self.tombstones[pos] = true;
        }
    }

    /// A cursor over every present entry: non-tombstoned recognized fields
    /// in declaration order, then custom keys in insertion order.
    pub fn entries(&mut self) -> Entries<'_, N> {
        Entries { view: self, field_pos: 0, overflow_pos: 0 }
    }

    fn force(&mut self, pos: usize) {
        if matches!(self.slots[pos], Slot::Pending) {
            self.slots[pos] = match self.table.extract(pos, self.native.as_ref()) {
                Some(value) => Slot::Cached(value),
                None => Slot::Absent,
            };
        }
    }
}

impl<N: ?Sized> fmt::Debug for LazyView<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyView")
            .field("table", &self.table)
            .field("cached", &self.slots.iter().filter(|s| matches!(s, Slot::Cached(_))).count())
            .field("tombstones", &self.tombstones.iter().filter(|t| **t).count())
            .field("overflow", &self.overflow.len())
            .finish()
    }
}

/// The iteration cursor of a [`LazyView`].
///
/// Forces at most the entry it is about to yield, never one beyond it:
/// which fields still have pending computations is only deterministic up to
/// the cursor's current position. Holding the view mutably for the cursor's
/// lifetime also rules out mutation mid-iteration.
pub struct Entries<'view, N: ?Sized + 'static> {
    view: &'view mut LazyView<N>,
    field_pos: usize,
    overflow_pos: usize,
}

impl<N: ?Sized> Iterator for Entries<'_, N> {
    type Item = (TxnKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        while self.field_pos < self.view.table.len() {
            let pos = self.field_pos;
            self.field_pos += 1;
            if self.view.tombstones[pos] {
                continue;
            }
            self.view.force(pos);
            if let Slot::Cached(value) = &self.view.slots[pos] {
                return Some((TxnKey::Field(self.view.table.key_at(pos)), value.clone()));
            }
        }

        let (key, value) = self.view.overflow.get(self.overflow_pos)?;
        self.overflow_pos += 1;
        Some((TxnKey::Custom(key.clone()), value.clone()))
    }
}

impl<N: ?Sized> fmt::Debug for Entries<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entries").field("field_pos", &self.field_pos).field("overflow_pos", &self.overflow_pos).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::keys;
    use crate::testing::StubRequest;
    use crate::txn::Snapshot;

    fn view(req: StubRequest) -> LazyRequest {
        LazyView::of_request(Arc::new(req))
    }

    #[test]
    fn equivalent_to_eager_snapshot_for_every_recognized_key() {
        let req = StubRequest::post("/users/7?q=rust")
            .with_header("content-type", "text/plain")
            .with_header("accept", "*/*")
            .with_body(bytes::Bytes::from_static(b"hello"));
        let snapshot = Snapshot::from_request(&req);
        let mut lazy = view(req);

        for key in request_fields().field_keys() {
            assert_eq!(snapshot.get(key), lazy.get(key), "key {key} disagrees between snapshot and view");
        }
    }

    #[test]
    fn first_read_is_memoized() {
        let req = Arc::new(StubRequest::get("/x").with_header("x-a", "original"));
        let mut lazy = LazyView::of_request(Arc::clone(&req) as Arc<dyn NativeRequest>);

        let before = lazy.get(keys::HEADERS).cloned();
        req.set_header("x-a", "mutated");
        let after = lazy.get(keys::HEADERS).cloned();

        assert_eq!(before, after);
        assert_eq!(
            before.as_ref().and_then(Value::as_pairs),
            Some(vec![("x-a".to_owned(), "original".to_owned())].as_slice())
        );
    }

    #[test]
    fn unread_field_observes_later_native_state() {
        // the flip side of memoization: nothing is computed before first read
        let req = Arc::new(StubRequest::get("/x").with_header("x-a", "original"));
        let mut lazy = LazyView::of_request(Arc::clone(&req) as Arc<dyn NativeRequest>);

        req.set_header("x-a", "mutated");
        assert_eq!(
            lazy.get(keys::HEADERS).and_then(Value::as_pairs),
            Some(vec![("x-a".to_owned(), "mutated".to_owned())].as_slice())
        );
    }

    #[test]
    fn tombstone_round_trip() {
        let mut lazy = view(StubRequest::get("/x"));

        assert!(lazy.contains_key(keys::METHOD));
        lazy.remove(keys::METHOD);
        assert!(!lazy.contains_key(keys::METHOD));
        assert_eq!(lazy.get(keys::METHOD), None);

        lazy.insert(keys::METHOD, "PUT");
        assert_eq!(lazy.get(keys::METHOD), Some(&Value::Str("PUT".to_owned())));
    }

    #[test]
    fn remove_returns_cached_value_only() {
        let mut unread = view(StubRequest::get("/x"));
        // never read: nothing cached, so nothing comes back
        assert_eq!(unread.remove(keys::METHOD), None);
        assert_eq!(unread.remove(keys::METHOD), None);

        let mut read = view(StubRequest::get("/x"));
        assert_eq!(read.get(keys::METHOD), Some(&Value::Str("GET".to_owned())));
        assert_eq!(read.remove(keys::METHOD), Some(Value::Str("GET".to_owned())));
        assert_eq!(read.remove(keys::METHOD), None);
    }

    #[test]
    fn count_invariant_under_assoc_and_without() {
        let mut lazy = view(StubRequest::get("/x?a=1"));
        let present = lazy.len();

        lazy.insert("custom-1", "a");
        lazy.insert("custom-2", "b");
        assert_eq!(lazy.len(), present + 2);

        lazy.insert("custom-1", "a2");
        assert_eq!(lazy.len(), present + 2, "replacement must not grow the map");

        lazy.remove(keys::HEADERS);
        assert_eq!(lazy.len(), present + 1);

        lazy.remove("custom-2");
        assert_eq!(lazy.len(), present);

        lazy.insert(keys::HEADERS, Value::Pairs(Vec::new()));
        assert_eq!(lazy.len(), present + 1);
    }

    #[test]
    fn iterator_yields_len_entries_fields_first_in_declaration_order() {
        let mut lazy = view(StubRequest::get("/x?a=1").with_header("h", "v"));
        lazy.insert("custom-b", "1");
        lazy.insert("custom-a", "2");
        lazy.remove(keys::SSL);

        let expected_len = lazy.len();
        let entries: Vec<_> = lazy.entries().collect();
        assert_eq!(entries.len(), expected_len);

        let split = entries.iter().position(|(k, _)| !k.is_field()).unwrap();
        let (fields, custom) = entries.split_at(split);
        assert!(custom.iter().all(|(k, _)| !k.is_field()), "custom keys must come last");

        let declared: Vec<_> = request_fields().field_keys().collect();
        let mut last = 0;
        for (key, _) in fields {
            let at = declared.iter().position(|k| key.as_str() == *k).unwrap();
            assert!(at >= last, "recognized fields out of declaration order");
            last = at;
        }
        assert!(!fields.iter().any(|(k, _)| k == keys::SSL), "tombstoned field leaked into iteration");

        let custom_keys: Vec<_> = custom.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(custom_keys, vec!["custom-b", "custom-a"], "overflow must keep insertion order");
    }

    #[test]
    fn iteration_caches_what_it_computes() {
        let req = Arc::new(StubRequest::get("/x").with_header("x-a", "original"));
        let mut lazy = LazyView::of_request(Arc::clone(&req) as Arc<dyn NativeRequest>);

        let _ = lazy.entries().count();
        req.set_header("x-a", "mutated");
        assert_eq!(
            lazy.get(keys::HEADERS).and_then(Value::as_pairs),
            Some(vec![("x-a".to_owned(), "original".to_owned())].as_slice())
        );
    }

    #[test]
    fn clear_is_permanent_until_insert() {
        let mut lazy = view(StubRequest::get("/x"));
        lazy.insert("custom", "v");
        lazy.clear();

        assert_eq!(lazy.len(), 0);
        assert_eq!(lazy.get(keys::METHOD), None, "cleared fields must not recompute");
        assert_eq!(lazy.get("custom"), None);
        assert_eq!(lazy.entries().count(), 0);

        lazy.insert(keys::METHOD, "HEAD");
        assert_eq!(lazy.get(keys::METHOD), Some(&Value::Str("HEAD".to_owned())));
        assert_eq!(lazy.len(), 1);
    }

    #[test]
    fn get_or_returns_default_for_missing_keys() {
        let mut lazy = view(StubRequest::get("/x"));
        let fallback = Value::Str("n/a".to_owned());

        assert_eq!(lazy.get_or(keys::QUERY_STRING, &fallback), &fallback);
        assert_eq!(lazy.get_or(keys::PATH, &fallback), &Value::Str("/x".to_owned()));
    }
}
