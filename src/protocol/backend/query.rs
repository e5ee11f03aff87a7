//! Row-carrying backend messages.

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{MessageBuilder, read_cstr, read_u8};
use crate::protocol::types::U16BE;
use crate::value::{Column, Row, ValueType};

/// Count header shared by RowDescription and DataRow.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct CountHead {
    /// Number of columns
    pub count: U16BE,
}

fn parse_count<'a>(payload: &'a [u8], message: &str) -> Result<(usize, &'a [u8])> {
    let (head, rest) = CountHead::ref_from_prefix(payload)
        .map_err(|e| Error::Protocol(format!("{} header: {e:?}", message)))?;
    Ok((head.count.get() as usize, rest))
}

/// Write a RowDescription message.
pub fn write_row_description(buf: &mut Vec<u8>, columns: &[Column]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::ROW_DESCRIPTION);
    msg.write_u16(columns.len() as u16);
    for col in columns {
        msg.write_cstr(&col.name);
        msg.write_u8(col.ty as u8);
    }
    msg.finish();
}

/// Write a DataRow message.
pub fn write_data_row(buf: &mut Vec<u8>, row: &Row) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DATA_ROW);
    msg.write_u16(row.len() as u16);
    for value in row.values() {
        value.encode(msg.buf());
    }
    msg.finish();
}

/// Field description within a RowDescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescription<'a> {
    /// Field name
    pub name: &'a str,
    /// Field type
    pub ty: ValueType,
}

impl FieldDescription<'_> {
    /// Convert to an owned [`Column`].
    pub fn to_column(&self) -> Column {
        Column::new(self.name, self.ty)
    }
}

/// RowDescription message - describes the columns in a batch.
#[derive(Debug)]
pub struct RowDescription<'a> {
    fields: Vec<FieldDescription<'a>>,
}

impl<'a> RowDescription<'a> {
    /// Parse a RowDescription message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_fields, mut data) = parse_count(payload, "RowDescription")?;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            let (name, rest) = read_cstr(data)?;
            let (code, rest) = read_u8(rest)?;
            fields.push(FieldDescription {
                name,
                ty: ValueType::from_code(code)?,
            });
            data = rest;
        }

        Ok(Self { fields })
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get field descriptions.
    pub fn fields(&self) -> &[FieldDescription<'a>] {
        &self.fields
    }

    /// Iterate over field descriptions.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescription<'a>> {
        self.fields.iter()
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    /// Number of columns
    num_columns: u16,
    /// Column data (after the column count)
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, columns_data) = parse_count(payload, "DataRow")?;
        Ok(Self {
            num_columns: num_columns as u16,
            columns_data,
        })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Create an iterator over column values.
    ///
    /// Each item is `Option<&[u8]>` where `None` represents NULL.
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
        }
    }

    /// Get a column value by index.
    ///
    /// Returns `None` if the column is NULL, `Some(bytes)` otherwise.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        self.iter().nth(index)
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let len;
        (len, self.remaining) = self.remaining.split_first_chunk::<4>()?;
        let len = i32::from_be_bytes(*len);

        if len == -1 {
            // NULL value
            return Some(None);
        }
        let value;
        (value, self.remaining) = self.remaining.split_at_checked(usize::try_from(len).ok()?)?;
        Some(Some(value))
    }
}
