//! Data type definitions for Cinder.
//!
//! This module defines the column types a table can declare, and the
//! conversion from command-layer text into typed values.

use crate::value::Value;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// UTF-8 string
    String,
}

impl DataType {
    /// Returns the command-layer spelling of this type.
    fn keyword(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Int64 => "INT",
            DataType::String => "STRING",
        }
    }

    /// Returns true if `value` is acceptable for a column of this type.
    /// Null is accepted by every type; nullability is a separate constraint.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.data_type() {
            None => true,
            Some(dt) => dt == *self,
        }
    }

    /// Parses command-layer text into a value of this type.
    ///
    /// Returns `None` when the text is not a valid literal for the type.
    pub fn parse_value(&self, text: &str) -> Option<Value> {
        match self {
            DataType::Int64 => text.trim().parse::<i64>().ok().map(Value::Int64),
            DataType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            DataType::String => Some(Value::String(text.into())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for DataType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" | "INT64" => Ok(DataType::Int64),
            "STRING" | "TEXT" | "VARCHAR" => Ok(DataType::String),
            "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
            other => Err(crate::Error::invalid_schema(format!("unknown type: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int64);
        assert_eq!("STRING".parse::<DataType>().unwrap(), DataType::String);
        assert_eq!(" Boolean ".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!("FLOAT".parse::<DataType>().is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(DataType::Int64.parse_value("42"), Some(Value::Int64(42)));
        assert_eq!(DataType::Int64.parse_value("4x"), None);
        assert_eq!(DataType::Boolean.parse_value("TRUE"), Some(Value::Boolean(true)));
        assert_eq!(DataType::Boolean.parse_value("yes"), None);
        assert_eq!(
            DataType::String.parse_value(" Ali "),
            Some(Value::String(" Ali ".into()))
        );
    }

    #[test]
    fn test_accepts() {
        assert!(DataType::Int64.accepts(&Value::Int64(1)));
        assert!(DataType::Int64.accepts(&Value::Null));
        assert!(!DataType::Int64.accepts(&Value::String("1".into())));
        assert!(!DataType::Boolean.accepts(&Value::Int64(0)));
    }
}
