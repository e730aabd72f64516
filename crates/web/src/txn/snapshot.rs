//! The eager, immutable transaction map.

use crate::fields::{FieldTable, request_fields, response_fields};
use crate::txn::TxnKey;
use weft_runtime::{NativeRequest, NativeResponse, Value};

/// Classifies a key against one side's field table: the declaration
/// position and canonical `&'static str` for a recognized key, `None` for
/// a custom one.
type Recognizer = fn(&str) -> Option<(usize, &'static str)>;

fn recognize_request(key: &str) -> Option<(usize, &'static str)> {
    let table = request_fields();
    table.position(key).map(|pos| (pos, table.key_at(pos)))
}

fn recognize_response(key: &str) -> Option<(usize, &'static str)> {
    let table = response_fields();
    table.position(key).map(|pos| (pos, table.key_at(pos)))
}

/// An eager, immutable snapshot of one transaction.
///
/// Every recognized field is extracted exactly once, in declaration order,
/// when the snapshot is built; absent fields are omitted. All "mutation"
/// is copy-on-write: [`assoc`](Snapshot::assoc) and
/// [`without`](Snapshot::without) return a new snapshot and leave the
/// receiver untouched. A snapshot retains no reference to the native
/// object, so it can cross thread boundaries freely.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Vec<(TxnKey, Value)>,
    recognize: Recognizer,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self { entries: Vec::new(), recognize: recognize_response }
    }
}

impl Snapshot {
    /// An empty response-side map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts all request fields from `native`.
    pub fn from_request(native: &(dyn NativeRequest + 'static)) -> Self {
        Self::from_table(request_fields(), native, recognize_request)
    }

    /// Extracts all response fields from `native`.
    pub fn from_response(native: &(dyn NativeResponse + 'static)) -> Self {
        Self::from_table(response_fields(), native, recognize_response)
    }

    fn from_table<N: ?Sized>(table: &'static FieldTable<N>, native: &N, recognize: Recognizer) -> Self {
        let mut entries = Vec::with_capacity(table.len());
        for pos in 0..table.len() {
            if let Some(value) = table.extract(pos, native) {
                entries.push((TxnKey::Field(table.key_at(pos)), value));
            }
        }
        Self { entries, recognize }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns a new snapshot with `key` bound to `value`. An existing
    /// binding is replaced in place, keeping its position. A new recognized
    /// key enters tagged [`TxnKey::Field`] at its declaration-order slot;
    /// a new custom key is appended after all current entries.
    pub fn assoc(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        let mut entries = self.entries.clone();
        if let Some((_, slot)) = entries.iter_mut().find(|(k, _)| *k == *key.as_str()) {
            *slot = value;
            return Self { entries, recognize: self.recognize };
        }
        match (self.recognize)(&key) {
            Some((pos, canonical)) => {
                let at = entries
                    .iter()
                    .position(|(k, _)| match k {
                        TxnKey::Field(existing) => (self.recognize)(existing).is_some_and(|(p, _)| p > pos),
                        TxnKey::Custom(_) => true,
                    })
                    .unwrap_or(entries.len());
                entries.insert(at, (TxnKey::Field(canonical), value));
            }
            None => entries.push((TxnKey::Custom(key), value)),
        }
        Self { entries, recognize: self.recognize }
    }

    /// Returns a new snapshot without `key`.
    pub fn without(&self, key: &str) -> Self {
        let entries = self.entries.iter().filter(|(k, _)| k != key).cloned().collect();
        Self { entries, recognize: self.recognize }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in iteration order: recognized fields in declaration order,
    /// then custom keys in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&TxnKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}
