use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::bits::BitView;
use crate::schema::{Columns, FieldType, Schema};
use crate::value::{decode_value, Value};
use crate::{Error, Result};

/// One decoded record: a value for each column of the schema it was decoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl Record {
    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the column called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).map(|i| &self.values[i])
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().zip(self.values.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(feature = "serde")]
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Decode a single record by applying `schema` from bit 0 of `region`.
///
/// Fields are decoded in schema order. Substructure fields are decoded by applying their nested
/// schema to the field's own bits, and the nested values are inserted in place of the
/// substructure field.
///
/// # Errors
/// [Error::Field] identifying the schema and field wrapping [Error::Range] if a field extends
/// past the end of `region`, or [Error::MalformedDate] for an invalid timestamp.
pub fn decode_record(schema: &Schema, region: &BitView) -> Result<Record> {
    let mut values = Vec::with_capacity(schema.columns().len());
    decode_into(schema, region, 0, &mut values, None)?;
    Ok(Record {
        columns: schema.columns().clone(),
        values,
    })
}

/// Like [decode_record], but a malformed date is replaced by [Value::Null] and its error is
/// returned alongside the record rather than failing the decode.
pub(crate) fn decode_record_lenient(
    schema: &Schema,
    region: &BitView,
) -> Result<(Record, Vec<Error>)> {
    let mut values = Vec::with_capacity(schema.columns().len());
    let mut malformed = Vec::default();
    decode_into(schema, region, 0, &mut values, Some(&mut malformed))?;
    Ok((
        Record {
            columns: schema.columns().clone(),
            values,
        },
        malformed,
    ))
}

/// `base` is the bit offset of `region` within the outermost record, for error context only.
/// When `malformed` is provided date errors are collected there and a null value is used.
fn decode_into(
    schema: &Schema,
    region: &BitView,
    base: usize,
    values: &mut Vec<Value>,
    mut malformed: Option<&mut Vec<Error>>,
) -> Result<()> {
    for field in schema.fields() {
        let context = |err: Error| match err {
            // already located by a nested schema
            err @ Error::Field { .. } => err,
            err => Error::Field {
                schema: schema.name().to_string(),
                field: field.name.clone(),
                bit_offset: base + field.bit_offset,
                record: None,
                source: Box::new(err),
            },
        };

        let chunk = region
            .slice(field.bit_offset, field.bit_width)
            .map_err(context)?;
        match &field.ty {
            FieldType::Sub(sub) => {
                decode_into(
                    sub,
                    &chunk.view(),
                    base + field.bit_offset,
                    values,
                    malformed.as_deref_mut(),
                )?;
            }
            ty => match (decode_value(ty, &chunk).map_err(context), malformed.as_mut()) {
                (Ok(value), _) => values.push(value),
                (Err(err), Some(malformed)) if err.is_malformed_date() => {
                    malformed.push(err);
                    values.push(Value::Null);
                }
                (Err(err), _) => return Err(err),
            },
        }
    }
    Ok(())
}

/// Records sharing a single column set, in decode order.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Arc<Columns>,
    records: Vec<Record>,
}

impl Table {
    #[must_use]
    pub fn new(columns: Arc<Columns>) -> Self {
        Table {
            columns,
            records: Vec::default(),
        }
    }

    /// Append a record.
    ///
    /// # Errors
    /// [Error::Config] if the record was decoded with a different column set.
    pub fn push(&mut self, record: Record) -> Result<()> {
        if !Arc::ptr_eq(&self.columns, &record.columns) && *self.columns != *record.columns {
            return Err(Error::Config(
                "record columns do not match table columns".to_string(),
            ));
        }
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl IntoIterator for Table {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
