//! Row decoding traits and implementations.

use crate::conversion::FromWireValue;
use crate::error::{Error, Result};
use crate::protocol::backend::query::{DataRow, DataRowIter, FieldDescription};
use crate::value::{Row, Value};

/// Trait for decoding a row into a Rust type.
pub trait FromRow<'a>: Sized {
    /// Decode a row.
    fn from_row(cols: &[FieldDescription<'_>], row: DataRow<'a>) -> Result<Self>;
}

/// Decode a single column value.
fn decode_column<'a, T: FromWireValue<'a>>(
    field: &FieldDescription<'_>,
    value: Option<&'a [u8]>,
) -> Result<T> {
    match value {
        None => T::from_null(),
        Some(bytes) => T::decode(field.ty, bytes),
    }
}

/// Next raw value, failing if the row ends early or a value is truncated.
fn next_value<'a>(iter: &mut DataRowIter<'a>, index: usize) -> Result<Option<&'a [u8]>> {
    iter.next()
        .ok_or_else(|| Error::Decode(format!("value {} is missing or truncated", index)))
}

fn check_width(cols: &[FieldDescription<'_>], row: &DataRow<'_>) -> Result<()> {
    if row.len() != cols.len() {
        return Err(Error::Decode(format!(
            "row has {} values for {} columns",
            row.len(),
            cols.len()
        )));
    }
    Ok(())
}

/// Untyped rows keep every column as a [`Value`].
impl FromRow<'_> for Row {
    fn from_row(cols: &[FieldDescription<'_>], row: DataRow<'_>) -> Result<Self> {
        check_width(cols, &row)?;
        let mut iter = row.iter();
        cols.iter()
            .enumerate()
            .map(|(i, field)| decode_column::<Value>(field, next_value(&mut iter, i)?))
            .collect::<Result<Vec<_>>>()
            .map(Row::new)
    }
}

// === Tuple implementations ===

/// Implementation for empty tuple - used when only the row count matters
impl FromRow<'_> for () {
    fn from_row(_cols: &[FieldDescription<'_>], _row: DataRow<'_>) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_from_row_tuple {
    ($count:literal: $($idx:tt => $T:ident),+) => {
        impl<'a, $($T: FromWireValue<'a>),+> FromRow<'a> for ($($T,)+) {
            fn from_row(cols: &[FieldDescription<'_>], row: DataRow<'a>) -> Result<Self> {
                if cols.len() < $count {
                    return Err(Error::Decode("not enough columns for tuple".into()));
                }
                check_width(cols, &row)?;
                let mut iter = row.iter();
                Ok(($(
                    decode_column(&cols[$idx], next_value(&mut iter, $idx)?)?,
                )+))
            }
        }
    };
}

impl_from_row_tuple!(1: 0 => T1);
impl_from_row_tuple!(2: 0 => T1, 1 => T2);
impl_from_row_tuple!(3: 0 => T1, 1 => T2, 2 => T3);
impl_from_row_tuple!(4: 0 => T1, 1 => T2, 2 => T3, 3 => T4);
impl_from_row_tuple!(5: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5);
impl_from_row_tuple!(6: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6);
impl_from_row_tuple!(7: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7);
impl_from_row_tuple!(8: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::query::{RowDescription, write_data_row, write_row_description};
    use crate::row;
    use crate::value::{Column, ValueType};

    fn encode(columns: &[Column], row: &Row) -> (Vec<u8>, Vec<u8>) {
        let mut desc = Vec::new();
        write_row_description(&mut desc, columns);
        let mut data = Vec::new();
        write_data_row(&mut data, row);
        (desc[5..].to_vec(), data[5..].to_vec())
    }

    #[test]
    fn test_tuple() {
        let columns = [
            Column::new("ID", ValueType::Int),
            Column::new("NAME", ValueType::Text),
            Column::new("NOTE", ValueType::Text),
        ];
        let (desc, data) = encode(&columns, &row![1, "Hello", None::<String>]);
        let cols = RowDescription::parse(&desc).unwrap();
        let row = DataRow::parse(&data).unwrap();

        let (id, name, note): (i32, &str, Option<String>) =
            FromRow::from_row(cols.fields(), row).unwrap();
        assert_eq!(id, 1);
        assert_eq!(name, "Hello");
        assert_eq!(note, None);

        // NULL into a non-Option column
        let err = <(i32, String, String)>::from_row(cols.fields(), row);
        assert!(matches!(err, Err(Error::Decode(_))));
    }

    #[test]
    fn test_too_few_columns() {
        let columns = [Column::new("X", ValueType::Int)];
        let (desc, data) = encode(&columns, &row![7]);
        let cols = RowDescription::parse(&desc).unwrap();
        let row = DataRow::parse(&data).unwrap();
        assert!(<(i64, i64)>::from_row(cols.fields(), row).is_err());
    }

    #[test]
    fn test_malformed_row_is_not_null() {
        let columns = [Column::new("X", ValueType::Int)];
        let (desc, _) = encode(&columns, &row![7]);
        let cols = RowDescription::parse(&desc).unwrap();

        // Value claims 10 bytes, has 2
        let truncated = [0, 1, 0, 0, 0, 10, 1, 2];
        let row = DataRow::parse(&truncated).unwrap();
        assert!(matches!(<(Option<i64>,)>::from_row(cols.fields(), row), Err(Error::Decode(_))));
        assert!(matches!(Row::from_row(cols.fields(), row), Err(Error::Decode(_))));

        // Count says one value, none follow
        let missing = [0, 1];
        let row = DataRow::parse(&missing).unwrap();
        assert!(matches!(<(Option<i64>,)>::from_row(cols.fields(), row), Err(Error::Decode(_))));

        // More values than columns
        let (_, wide) = encode(&columns, &row![7, 8]);
        let row = DataRow::parse(&wide).unwrap();
        assert!(matches!(<(i64,)>::from_row(cols.fields(), row), Err(Error::Decode(_))));
    }

    #[test]
    fn test_untyped_row() {
        let columns = [Column::new("X", ValueType::Int), Column::new("B", ValueType::Bytes)];
        let source = row![7, vec![1_u8, 2]];
        let (desc, data) = encode(&columns, &source);
        let cols = RowDescription::parse(&desc).unwrap();
        let row = DataRow::parse(&data).unwrap();
        assert_eq!(Row::from_row(cols.fields(), row).unwrap(), source);
    }
}
