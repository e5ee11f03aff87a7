//! Row values produced by the server.

use crate::error::{Error, ErrorFields, Result};

/// Type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// Boolean, 1 byte on the wire
    Bool = 1,
    /// 64-bit signed integer, 8 bytes big-endian on the wire
    Int = 2,
    /// UTF-8 text
    Text = 3,
    /// Raw bytes
    Bytes = 4,
}

impl ValueType {
    /// Create a ValueType from its wire code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(ValueType::Bool),
            2 => Ok(ValueType::Int),
            3 => Ok(ValueType::Text),
            4 => Ok(ValueType::Bytes),
            _ => Err(Error::Protocol(format!("unknown value type code: {}", code))),
        }
    }

    /// Name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "BOOLEAN",
            ValueType::Int => "INT",
            ValueType::Text => "VARCHAR",
            ValueType::Bytes => "BINARY",
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub ty: ValueType,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A single value in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Value {
    /// The type of this value, `None` for NULL.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::Text(_) => Some(ValueType::Text),
            Value::Bytes(_) => Some(ValueType::Bytes),
        }
    }

    /// Returns true for NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Write the length-prefixed wire form (-1 length for NULL).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
            Value::Bool(b) => {
                buf.extend_from_slice(&1_i32.to_be_bytes());
                buf.push(u8::from(*b));
            }
            Value::Int(n) => {
                buf.extend_from_slice(&8_i32.to_be_bytes());
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Value::Text(s) => {
                buf.extend_from_slice(&(s.len() as i32).to_be_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(bytes) => {
                buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                buf.extend_from_slice(bytes);
            }
        }
    }

    /// Decode the wire form of a non-NULL value of type `ty`.
    pub fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        match ty {
            ValueType::Bool => match bytes {
                [b] => Ok(Value::Bool(*b != 0)),
                _ => Err(Error::Decode(format!(
                    "invalid boolean length: {}",
                    bytes.len()
                ))),
            },
            ValueType::Int => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    Error::Decode(format!("invalid integer length: {}", bytes.len()))
                })?;
                Ok(Value::Int(i64::from_be_bytes(arr)))
            }
            ValueType::Text => simdutf8::compat::from_utf8(bytes)
                .map(|s| Value::Text(s.to_owned()))
                .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e))),
            ValueType::Bytes => Ok(Value::Bytes(bytes.to_vec())),
        }
    }

    /// Convert this value to `target`.
    ///
    /// This is the per-row conversion a query applies while computing its rows,
    /// so a failure is a row-computation failure (SQLSTATE 22018).
    pub fn cast(self, target: ValueType) -> core::result::Result<Value, ErrorFields> {
        if self.value_type().is_none_or(|ty| ty == target) {
            return Ok(self);
        }
        let converted = match (&self, target) {
            (Value::Text(s), ValueType::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::Text(s), ValueType::Bool) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" | "T" | "1" | "YES" => Some(Value::Bool(true)),
                "FALSE" | "F" | "0" | "NO" => Some(Value::Bool(false)),
                _ => None,
            },
            (Value::Text(s), ValueType::Bytes) => Some(Value::Bytes(s.as_bytes().to_vec())),
            (Value::Int(n), ValueType::Text) => Some(Value::Text(n.to_string())),
            (Value::Int(n), ValueType::Bool) => Some(Value::Bool(*n != 0)),
            (Value::Bool(b), ValueType::Int) => Some(Value::Int(i64::from(*b))),
            (Value::Bool(b), ValueType::Text) => {
                Some(Value::Text(if *b { "TRUE" } else { "FALSE" }.into()))
            }
            (Value::Bytes(bytes), ValueType::Text) => simdutf8::compat::from_utf8(bytes)
                .ok()
                .map(|s| Value::Text(s.to_owned())),
            _ => None,
        };
        converted.ok_or_else(|| {
            ErrorFields::data_conversion(format!(
                "Data conversion error converting {} to {}",
                self,
                target.name()
            ))
        })
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Int(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Bytes(bytes) => write!(f, "X'{}'", bytes.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// One computed row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take the values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Build a [`Row`] from a list of values convertible into [`Value`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::value::Row::new(vec![$($crate::value::Value::from($value)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_int() {
        let mut buf = Vec::new();
        Value::Int(-42).encode(&mut buf);
        assert_eq!(&buf[..4], &8_i32.to_be_bytes());
        assert_eq!(Value::decode(ValueType::Int, &buf[4..]).unwrap(), Value::Int(-42));
    }

    #[test]
    fn test_encode_null() {
        let mut buf = Vec::new();
        Value::Null.encode(&mut buf);
        assert_eq!(buf, (-1_i32).to_be_bytes());
    }

    #[test]
    fn test_cast_text_to_int() {
        assert_eq!(Value::from("7").cast(ValueType::Int).unwrap(), Value::Int(7));
        assert_eq!(Value::Null.cast(ValueType::Int).unwrap(), Value::Null);

        let err = Value::from("x").cast(ValueType::Int).unwrap_err();
        assert_eq!(err.code(), Some("22018"));
        assert_eq!(
            err.message(),
            Some("Data conversion error converting 'x' to INT")
        );
    }

    #[test]
    fn test_cast_bytes_to_int_fails() {
        assert!(Value::Bytes(vec![1]).cast(ValueType::Int).is_err());
    }

    #[test]
    fn test_row_macro() {
        let row = row![1, "a", None::<i64>];
        assert_eq!(
            row.values(),
            &[Value::Int(1), Value::Text("a".into()), Value::Null]
        );
    }
}
