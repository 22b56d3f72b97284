//! Index key type.

use cinder_core::Value;
use core::fmt;
use serde::{Deserialize, Serialize};

/// A normalized, totally ordered index key.
///
/// Ordering is by variant first, then payload.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Boolean(bool),
    Int64(i64),
    String(String),
}

impl IndexKey {
    /// Builds the key for a cell value. Null is never indexed.
    ///
    /// String keys are trimmed and lowercased, so `"Ali"` and `"ali "`
    /// land in the same bucket.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Boolean(b) => Some(IndexKey::Boolean(*b)),
            Value::Int64(i) => Some(IndexKey::Int64(*i)),
            Value::String(s) => Some(IndexKey::String(s.trim().to_lowercase())),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Boolean(b) => write!(f, "{}", b),
            IndexKey::Int64(i) => write!(f, "{}", i),
            IndexKey::String(s) => write!(f, "'{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_normalized() {
        let a = IndexKey::from_value(&Value::from("Ali")).unwrap();
        let b = IndexKey::from_value(&Value::from("  ali ")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, IndexKey::String("ali".into()));
    }

    #[test]
    fn test_null_not_indexed() {
        assert_eq!(IndexKey::from_value(&Value::Null), None);
    }

    #[test]
    fn test_key_ordering() {
        assert!(IndexKey::Boolean(true) < IndexKey::Int64(i64::MIN));
        assert!(IndexKey::Int64(-1) < IndexKey::Int64(2));
        assert!(IndexKey::Int64(i64::MAX) < IndexKey::String(String::new()));
        assert!(IndexKey::String("a".into()) < IndexKey::String("b".into()));
    }
}
