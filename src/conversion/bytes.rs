//! Byte type implementations (`&[u8]`, `Vec<u8>`).

use crate::error::Result;
use crate::value::ValueType;

use super::{FromWireValue, type_mismatch};

impl<'a> FromWireValue<'a> for &'a [u8] {
    fn decode(ty: ValueType, bytes: &'a [u8]) -> Result<Self> {
        match ty {
            ValueType::Bytes | ValueType::Text => Ok(bytes),
            _ => Err(type_mismatch(ty, "bytes")),
        }
    }
}

impl FromWireValue<'_> for Vec<u8> {
    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        <&[u8]>::decode(ty, bytes).map(<[u8]>::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes() {
        assert_eq!(Vec::<u8>::decode(ValueType::Bytes, &[1, 2]).unwrap(), vec![1, 2]);
        // Text is readable as raw UTF-8 bytes
        assert_eq!(<&[u8]>::decode(ValueType::Text, b"x").unwrap(), b"x");
        assert!(Vec::<u8>::decode(ValueType::Int, &[0; 8]).is_err());
    }
}
