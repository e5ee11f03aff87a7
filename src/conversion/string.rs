//! String type implementations (&str, String).

use crate::error::{Error, Result};
use crate::value::ValueType;

use super::{FromWireValue, type_mismatch};

impl<'a> FromWireValue<'a> for &'a str {
    fn decode(ty: ValueType, bytes: &'a [u8]) -> Result<Self> {
        if ty != ValueType::Text {
            return Err(type_mismatch(ty, "str"));
        }
        simdutf8::compat::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
    }
}

impl FromWireValue<'_> for String {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        if ty != ValueType::Text {
            return Err(type_mismatch(ty, "String"));
        }
        simdutf8::compat::from_utf8(bytes)
            .map(|s| s.to_owned())
            .map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
    }
}
