//! dBASE III attribute table (`.dbf`) writing.

use std::io::{self, Seek, SeekFrom, Write};

use chrono::Datelike;
use log::{debug, warn};

use crate::convert::attributes::{FieldDefinition, FieldType, FieldValue};
use crate::error::WriteError;

pub const DBF_VERSION: u8 = 0x03;
pub const HEADER_TERMINATOR: u8 = 0x0D;
pub const END_OF_FILE: u8 = 0x1A;
pub const FIELD_NAME_LENGTH: usize = 10;
pub const INTEGER_WIDTH: u8 = 9;
const HEADER_PREFIX_LENGTH: usize = 32;
const FIELD_DESCRIPTOR_LENGTH: usize = 32;

/// Column descriptor as stored in the table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfField {
    pub name: String,
    pub type_code: u8,
    pub length: u8,
}

impl From<&FieldDefinition> for DbfField {
    fn from(definition: &FieldDefinition) -> Self {
        let name = truncate_to_width(definition.name, FIELD_NAME_LENGTH);
        if name.len() < definition.name.len() {
            debug!(
                "Field name '{}' truncated to '{}' for the attribute table",
                definition.name, name
            );
        }
        let (type_code, length) = match definition.field_type {
            FieldType::Integer => (b'N', INTEGER_WIDTH),
            FieldType::Text { width } => (b'C', width),
        };
        Self {
            name: name.to_string(),
            type_code,
            length,
        }
    }
}

/// Longest prefix of `text` that fits `width` bytes without splitting a character.
pub fn truncate_to_width(text: &str, width: usize) -> &str {
    if text.len() <= width {
        return text;
    }
    let mut end = width;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Streams records into a dBASE table. The header is rewritten with the final record count by
/// `finish`.
pub struct DbfWriter<W: Write + Seek> {
    inner: W,
    fields: Option<Vec<DbfField>>,
    record_count: u32,
}

impl<W: Write + Seek> DbfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            fields: None,
            record_count: 0,
        }
    }

    pub fn is_declared(&self) -> bool {
        self.fields.is_some()
    }

    /// Write the table header. Must be called exactly once, before the first record.
    pub fn declare_fields(&mut self, definitions: &[FieldDefinition]) -> Result<(), WriteError> {
        if self.fields.is_some() {
            return Err(WriteError::SchemaAlreadyDeclared);
        }
        let fields: Vec<DbfField> = definitions.iter().map(DbfField::from).collect();
        write_table_header(&mut self.inner, &fields, 0)?;
        self.fields = Some(fields);
        Ok(())
    }

    pub fn write_record(&mut self, values: &[FieldValue]) -> Result<(), WriteError> {
        let fields = self.fields.as_ref().ok_or(WriteError::SchemaNotDeclared)?;
        if values.len() != fields.len() {
            return Err(WriteError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Record has {} values, table has {} fields",
                    values.len(),
                    fields.len()
                ),
            )));
        }
        let record_length = record_length(fields);
        let mut record = Vec::with_capacity(record_length);
        // Deletion flag: a space marks a live record.
        record.push(b' ');
        for (field, value) in fields.iter().zip(values) {
            encode_value(&mut record, field, value);
        }
        debug_assert_eq!(record.len(), record_length);
        self.inner.write_all(&record)?;
        self.record_count = self
            .record_count
            .checked_add(1)
            .ok_or(WriteError::TooManyRecords(self.record_count as usize))?;
        Ok(())
    }

    /// Terminate the table and patch the header with the record count.
    pub fn finish(mut self) -> Result<W, WriteError> {
        let fields = self.fields.take().ok_or(WriteError::SchemaNotDeclared)?;
        self.inner.write_all(&[END_OF_FILE])?;
        self.inner.seek(SeekFrom::Start(0))?;
        write_table_header(&mut self.inner, &fields, self.record_count)?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn record_length(fields: &[DbfField]) -> usize {
    1 + fields.iter().map(|f| f.length as usize).sum::<usize>()
}

fn encode_value(record: &mut Vec<u8>, field: &DbfField, value: &FieldValue) {
    let width = field.length as usize;
    match value {
        FieldValue::Text(text) => {
            let truncated = truncate_to_width(text, width);
            if truncated.len() < text.len() {
                debug!(
                    "Value of field '{}' truncated to {} bytes",
                    field.name, width
                );
            }
            record.extend_from_slice(truncated.as_bytes());
            record.extend(std::iter::repeat(b' ').take(width - truncated.len()));
        }
        FieldValue::Integer(number) => {
            let formatted = format!("{:>width$}", number, width = width);
            if formatted.len() > width {
                warn!(
                    "Value {} does not fit numeric field '{}' of width {}",
                    number, field.name, width
                );
                record.extend(std::iter::repeat(b'*').take(width));
            } else {
                record.extend_from_slice(formatted.as_bytes());
            }
        }
    }
}

fn write_table_header<W: Write>(
    out: &mut W,
    fields: &[DbfField],
    record_count: u32,
) -> io::Result<()> {
    let header_length = HEADER_PREFIX_LENGTH + FIELD_DESCRIPTOR_LENGTH * fields.len() + 1;
    let record_length = record_length(fields);
    let too_large = |what: &str| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("dBASE {} exceeds 65535 bytes", what),
        )
    };
    let header_length = u16::try_from(header_length).map_err(|_| too_large("header"))?;
    let record_length = u16::try_from(record_length).map_err(|_| too_large("record"))?;

    let today = chrono::Local::now().date_naive();
    let mut header = Vec::with_capacity(header_length as usize);
    header.push(DBF_VERSION);
    header.push(today.year().saturating_sub(1900).clamp(0, 255) as u8);
    header.push(today.month() as u8);
    header.push(today.day() as u8);
    header.extend_from_slice(&record_count.to_le_bytes());
    header.extend_from_slice(&header_length.to_le_bytes());
    header.extend_from_slice(&record_length.to_le_bytes());
    header.extend_from_slice(&[0u8; 20]);

    for field in fields {
        let mut name = [0u8; 11];
        name[..field.name.len()].copy_from_slice(field.name.as_bytes());
        header.extend_from_slice(&name);
        header.push(field.type_code);
        header.extend_from_slice(&[0u8; 4]);
        header.push(field.length);
        // Decimal count, zero for text and integer columns.
        header.push(0);
        header.extend_from_slice(&[0u8; 14]);
    }
    header.push(HEADER_TERMINATOR);
    out.write_all(&header)
}
