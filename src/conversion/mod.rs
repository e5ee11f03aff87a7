//! Decoding of wire values into Rust types.
//!
//! Every column carries a [`ValueType`] in the RowDescription, so decoders can
//! reject incompatible types with a clear error instead of misreading bytes.

mod bytes;
mod primitives;
mod row;
mod string;

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};
pub use row::FromRow;

/// Trait for decoding wire values into Rust types.
///
/// - `from_null()` - Handle NULL values
/// - `decode()` - Decode the bytes of a non-NULL value of the given column type
pub trait FromWireValue<'a>: Sized {
    /// Decode from NULL value.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from the wire bytes of a non-NULL value.
    fn decode(ty: ValueType, bytes: &'a [u8]) -> Result<Self>;
}

fn type_mismatch(ty: ValueType, target: &str) -> Error {
    Error::Decode(format!("cannot decode {} as {}", ty.name(), target))
}

// === Option<T> - NULL handling ===

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn decode(ty: ValueType, bytes: &'a [u8]) -> Result<Self> {
        T::decode(ty, bytes).map(Some)
    }
}

// === Value - any column ===

impl FromWireValue<'_> for Value {
    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }

    fn decode(ty: ValueType, bytes: &[u8]) -> Result<Self> {
        Value::decode(ty, bytes)
    }
}
