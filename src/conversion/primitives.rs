//! Primitive type implementations (bool, integers).

use crate::error::{Error, Result};
use crate::value::ValueType;

use super::{FromWireValue, type_mismatch};

// === Boolean ===

impl FromWireValue<'_> for bool {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        if ty != ValueType::Bool {
            return Err(type_mismatch(ty, "bool"));
        }
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(Error::Decode(format!(
                "invalid boolean length: {}",
                bytes.len()
            ))),
        }
    }
}

// === Integer types ===

fn decode_int(ty: ValueType, bytes: &[u8], target: &str) -> Result<i64> {
    if ty != ValueType::Int {
        return Err(type_mismatch(ty, target));
    }
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid integer length: {}", bytes.len())))?;
    Ok(i64::from_be_bytes(arr))
}

impl FromWireValue<'_> for i64 {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        decode_int(ty, bytes, "i64")
    }
}

impl FromWireValue<'_> for i32 {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        let value = decode_int(ty, bytes, "i32")?;
        i32::try_from(value).map_err(|_| Error::Decode(format!("i32 overflow: {}", value)))
    }
}

impl FromWireValue<'_> for u64 {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        let value = decode_int(ty, bytes, "u64")?;
        u64::try_from(value).map_err(|_| Error::Decode(format!("u64 underflow: {}", value)))
    }
}
