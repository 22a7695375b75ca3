#![doc = include_str!("../README.md")]

mod error;

pub mod bits;
pub mod layouts;
pub mod record;
pub mod schema;
pub mod stream;
pub mod value;

pub use bits::{BitChunk, BitView};
pub use error::{Error, Result};
pub use layouts::Layout;
#[cfg(feature = "serde")]
pub use layouts::{FieldDef, LayoutDef, TypeDef};
pub use record::{decode_record, Record, Table};
pub use schema::{Columns, FieldDescriptor, FieldType, Schema, SchemaBuilder};
pub use stream::{OnMalformedDate, RecordStream, Records, StreamOpts};
pub use value::{decode_value, parse_date, Value};
