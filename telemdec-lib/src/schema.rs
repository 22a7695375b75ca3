//! Record layouts.
//!
//! A [Schema] is an ordered list of [FieldDescriptor]s. Offsets are relative to the start of the
//! region the schema is applied to. Schemas are validated when they are constructed, so any
//! schema that exists is free of overlapping fields, name collisions and unsupported widths.
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

use tracing::trace;

use crate::bits::BitView;
use crate::record::{decode_record, Record};
use crate::{Error, Result};

/// How the bits of a field are interpreted.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Unsigned big-endian integer, 1 to 64 bits.
    UInt,
    /// Two's-complement big-endian integer, 1 to 64 bits.
    Int,
    /// IEEE-754 single (32 bits) or double (64 bits).
    Float,
    /// Fixed format ASCII timestamp, see [parse_date](crate::parse_date).
    Date,
    /// Nested layout applied to the field's bits. Its fields are flattened into the parent record.
    Sub(Arc<Schema>),
}

impl FieldType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::UInt => "uint",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::Sub(_) => "sub",
        }
    }

    /// Check `width` is representable by this type.
    fn check_width(&self, width: usize) -> Result<()> {
        let ok = match self {
            FieldType::UInt | FieldType::Int => (1..=64).contains(&width),
            FieldType::Float => width == 32 || width == 64,
            FieldType::Date => width > 0 && width % 8 == 0,
            FieldType::Sub(_) => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::UnsupportedWidth {
                kind: self.name(),
                width,
            })
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A named bit range and its type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    /// Offset of the first bit, relative to the start of the enclosing schema
    pub bit_offset: usize,
    pub bit_width: usize,
    pub ty: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, bit_offset: usize, bit_width: usize, ty: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            bit_offset,
            bit_width,
            ty,
        }
    }

    /// One past the last bit of the field. Saturates at `usize::MAX`; a field whose range
    /// overflows is rejected by [Schema::new].
    #[must_use]
    pub fn bit_end(&self) -> usize {
        self.bit_offset.saturating_add(self.bit_width)
    }
}

/// The flattened column names of a schema, in output order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Columns { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of the column called `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// An immutable, validated record layout.
///
/// # Example
/// ```
/// use telemdec::{BitView, FieldType, Schema, Value};
///
/// let schema = Schema::builder("example")
///     .field("COUNTER", 12, FieldType::UInt)
///     .skip(4)
///     .field("TEMP", 32, FieldType::Float)
///     .build()
///     .unwrap();
///
/// let dat = [0x12, 0x3f, 0x3f, 0xc0, 0x00, 0x00];
/// let record = schema.decode(&BitView::new(&dat)).unwrap();
/// assert_eq!(record.get("COUNTER"), Some(&Value::UInt(0x123)));
/// assert_eq!(record.get("TEMP"), Some(&Value::Float32(1.5)));
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDescriptor>,
    bit_len: usize,
    columns: Arc<Columns>,
}

impl Schema {
    /// Construct from fields with explicit offsets.
    ///
    /// # Errors
    /// [Error::Field] wrapping [Error::UnsupportedWidth] for a field whose width does not fit its
    /// type, or [Error::Schema] for zero width fields, overlapping fields, duplicate names, column
    /// names colliding after flattening, or a nested schema wider than its field.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| Error::Schema {
            schema: name.clone(),
            reason,
        };

        let mut seen = HashSet::new();
        for field in &fields {
            if field.bit_offset.checked_add(field.bit_width).is_none() {
                return Err(invalid(format!(
                    "field {} at bit {} with width {} overflows",
                    field.name, field.bit_offset, field.bit_width
                )));
            }
            if field.bit_width == 0 {
                return Err(invalid(format!("field {} has zero width", field.name)));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field name {}", field.name)));
            }
            field.ty.check_width(field.bit_width).map_err(|err| Error::Field {
                schema: name.clone(),
                field: field.name.clone(),
                bit_offset: field.bit_offset,
                record: None,
                source: Box::new(err),
            })?;
            if let FieldType::Sub(sub) = &field.ty {
                if sub.bit_len() > field.bit_width {
                    return Err(invalid(format!(
                        "nested schema {} needs {} bits but field {} has {}",
                        sub.name(),
                        sub.bit_len(),
                        field.name,
                        field.bit_width
                    )));
                }
            }
        }

        let mut by_offset: Vec<&FieldDescriptor> = fields.iter().collect();
        by_offset.sort_by_key(|f| f.bit_offset);
        for pair in by_offset.windows(2) {
            if pair[0].bit_end() > pair[1].bit_offset {
                return Err(invalid(format!(
                    "field {} [{}, {}) overlaps {} [{}, {})",
                    pair[0].name,
                    pair[0].bit_offset,
                    pair[0].bit_end(),
                    pair[1].name,
                    pair[1].bit_offset,
                    pair[1].bit_end()
                )));
            }
        }

        let mut names = Vec::new();
        for field in &fields {
            match &field.ty {
                FieldType::Sub(sub) => names.extend(sub.columns().names().iter().cloned()),
                _ => names.push(field.name.clone()),
            }
        }
        let mut unique = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !unique.insert(n.as_str())) {
            return Err(invalid(format!("column {dup} appears more than once")));
        }

        let bit_len = fields.iter().map(FieldDescriptor::bit_end).max().unwrap_or(0);
        trace!(schema = %name, fields = fields.len(), bit_len, "schema constructed");

        Ok(Schema {
            name,
            fields,
            bit_len,
            columns: Arc::new(Columns::new(names)),
        })
    }

    /// Start a schema whose field offsets are computed from the cumulative widths of the
    /// preceding fields.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            cursor: 0,
            overflowed: false,
            fields: Vec::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Extent of the schema in bits, i.e., the end of its last field. Trailing spare bits that
    /// are not covered by a field are not included.
    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    /// Decode one record from the start of `region`.
    ///
    /// # Errors
    /// See [decode_record].
    pub fn decode(&self, region: &BitView) -> Result<Record> {
        decode_record(self, region)
    }
}

/// Builds a [Schema], tracking a bit cursor so fields can be declared by width alone.
///
/// Explicit offsets may be mixed in with [SchemaBuilder::field_at], which also moves the cursor
/// to the end of that field.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    cursor: usize,
    /// Set once the cursor would pass `usize::MAX`
    overflowed: bool,
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    /// Add a field at the cursor.
    #[must_use]
    pub fn field(self, name: impl Into<String>, bit_width: usize, ty: FieldType) -> Self {
        let offset = self.cursor;
        self.field_at(name, offset, bit_width, ty)
    }

    /// Add a field at an explicit offset.
    #[must_use]
    pub fn field_at(
        mut self,
        name: impl Into<String>,
        bit_offset: usize,
        bit_width: usize,
        ty: FieldType,
    ) -> Self {
        self.fields
            .push(FieldDescriptor::new(name, bit_offset, bit_width, ty));
        self.advance(bit_offset.checked_add(bit_width));
        self
    }

    /// Add a nested schema at the cursor, occupying `bit_width` bits.
    #[must_use]
    pub fn sub(self, name: impl Into<String>, bit_width: usize, schema: Schema) -> Self {
        self.field(name, bit_width, FieldType::Sub(Arc::new(schema)))
    }

    /// Advance the cursor over spare bits.
    #[must_use]
    pub fn skip(mut self, bits: usize) -> Self {
        self.advance(self.cursor.checked_add(bits));
        self
    }

    fn advance(&mut self, cursor: Option<usize>) {
        match cursor {
            Some(cursor) => self.cursor = cursor,
            None => self.overflowed = true,
        }
    }

    /// Validate and construct the schema.
    ///
    /// # Errors
    /// [Error::Schema] if the offset cursor overflowed, otherwise see [Schema::new].
    pub fn build(self) -> Result<Schema> {
        if self.overflowed {
            return Err(Error::Schema {
                schema: self.name,
                reason: "field offsets overflow the addressable bit range".to_string(),
            });
        }
        Schema::new(self.name, self.fields)
    }
}
