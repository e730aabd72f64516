//! The interchange value type held by transaction maps.

use bytes::Bytes;

/// One value in a transaction map.
///
/// Absence is expressed as `Option::<Value>::None` at the extraction
/// boundary and as key non-membership at the map boundary. [`Value::Null`]
/// is a legitimate null value a handler may store deliberately; it never
/// stands in for "absent".
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 text.
    Str(String),
    /// A raw byte payload.
    Bytes(Bytes),
    /// A signed integer, used for status codes and sizes.
    Int(i64),
    /// A boolean flag, e.g. whether the connection is TLS.
    Bool(bool),
    /// An ordered multi-map: headers, query params, path params.
    /// Duplicate keys are meaningful and order is preserved.
    Pairs(Vec<(String, String)>),
    /// An explicit null, distinct from an absent key.
    Null,
}

impl Value {
    /// Returns the text content if this is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the payload if this is a [`Value::Bytes`].
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the entry list if this is a [`Value::Pairs`].
    pub fn as_pairs(&self) -> Option<&[(String, String)]> {
        match self {
            Value::Pairs(pairs) => Some(pairs.as_slice()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short tag naming the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Pairs(_) => "pairs",
            Value::Null => "null",
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<(String, String)>> for Value {
    fn from(value: Vec<(String, String)>) -> Self {
        Value::Pairs(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_absent() {
        let value = Value::Null;
        assert!(value.is_null());
        assert_eq!(value.as_str(), None);
        assert_eq!(value.kind(), "null");
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(200_i64).as_int(), Some(200));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("abc").as_int(), None);

        let pairs = vec![("a".to_owned(), "1".to_owned())];
        assert_eq!(Value::from(pairs.clone()).as_pairs(), Some(pairs.as_slice()));
    }
}
