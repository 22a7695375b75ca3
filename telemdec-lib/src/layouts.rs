//! Record layouts: a schema together with the stride of the file it describes.
//!
//! Two instrument layouts are built in, both for the SHARAD radar sounder on the Mars
//! Reconnaissance Orbiter:
//!
//! * `sharad-aux`: the 267 byte auxiliary (geometry and housekeeping) table row, with explicit
//!   field offsets.
//! * `sharad-science`: the 186 byte ancillary header at the start of each 3786 byte science data
//!   row. Offsets are cumulative and the 128-bit `OST_LINE` is a nested layout. Spare fields are
//!   left as gaps.
//!
//! Other layouts can be described in JSON with the `serde` feature, see [LayoutDef].
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::schema::{FieldDescriptor, FieldType, Schema};
use crate::stream::{OnMalformedDate, RecordStream, StreamOpts};
use crate::{Error, Result};

/// A validated schema and the stride configuration of the records it describes.
#[derive(Debug, Clone)]
pub struct Layout {
    schema: Schema,
    stride_bits: usize,
    decoded_bits: usize,
}

impl Layout {
    /// Names accepted by [Layout::builtin].
    pub const BUILTIN: [&'static str; 2] = ["sharad-aux", "sharad-science"];

    /// # Errors
    /// [Error::Config] if the stride is zero, `decoded_bits` exceeds the stride, or the schema
    /// does not fit in `decoded_bits`.
    pub fn new(schema: Schema, stride_bits: usize, decoded_bits: usize) -> Result<Self> {
        if stride_bits == 0 || decoded_bits > stride_bits {
            return Err(Error::Config(format!(
                "layout {}: invalid stride {stride_bits} / decoded region {decoded_bits}",
                schema.name()
            )));
        }
        if schema.bit_len() > decoded_bits {
            return Err(Error::Config(format!(
                "layout {}: schema needs {} bits but the decoded region is {decoded_bits} bits",
                schema.name(),
                schema.bit_len()
            )));
        }
        Ok(Layout {
            schema,
            stride_bits,
            decoded_bits,
        })
    }

    /// Look up a built-in layout by name.
    ///
    /// # Panics
    /// If a built-in layout is invalid.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Layout> {
        let layout = match name {
            "sharad-aux" => sharad_aux(),
            "sharad-science" => sharad_science(),
            _ => return None,
        };
        Some(layout.expect("built-in layout is not valid"))
    }

    /// Parse and validate a [LayoutDef] JSON document.
    ///
    /// # Errors
    /// [Error::Json] if the document cannot be parsed, otherwise see [LayoutDef::to_layout].
    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> Result<Layout> {
        let def: LayoutDef = serde_json::from_str(s)?;
        def.to_layout()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn stride_bits(&self) -> usize {
        self.stride_bits
    }

    #[must_use]
    pub fn decoded_bits(&self) -> usize {
        self.decoded_bits
    }

    /// Stream options for this layout's stride and decoded region.
    #[must_use]
    pub fn stream_opts(&self, on_malformed_date: OnMalformedDate, num_threads: usize) -> StreamOpts {
        StreamOpts::builder()
            .stride_bits(self.stride_bits)
            .decoded_bits(self.decoded_bits)
            .on_malformed_date(on_malformed_date)
            .num_threads(num_threads)
            .build()
    }

    /// Stream the records in `data` with default options.
    ///
    /// # Errors
    /// See [RecordStream::new].
    pub fn stream<'a>(&'a self, data: &'a [u8]) -> Result<RecordStream<'a>> {
        RecordStream::new(
            &self.schema,
            data,
            self.stream_opts(OnMalformedDate::default(), 0),
        )
    }
}

/// SHARAD auxiliary data table. Every bit of the 267 byte row is decoded.
fn sharad_aux() -> Result<Layout> {
    use FieldType::{Date, Float, Int, UInt};

    let mut fields = vec![
        FieldDescriptor::new("SCET_BLOCK_WHOLE", 0, 32, UInt),
        FieldDescriptor::new("SCET_BLOCK_FRAC", 32, 16, UInt),
        FieldDescriptor::new("EPHEMERIS_TIME", 48, 64, Float),
        FieldDescriptor::new("GEOMETRY_EPOCH", 112, 184, Date),
        FieldDescriptor::new("SOLAR_LONGITUDE", 296, 64, Float),
        FieldDescriptor::new("ORBIT_NUMBER", 360, 32, Int),
    ];
    // contiguous doubles from bit 392
    let doubles = [
        "X_MARS_SC_POSITION_VECTOR",
        "Y_MARS_SC_POSITION_VECTOR",
        "Z_MARS_SC_POSITION_VECTOR",
        "SPACECRAFT_ALTITUDE",
        "SUB_SC_EAST_LONGITUDE",
        "SUB_SC_PLANETOCENTRIC_LATITUDE",
        "SUB_SC_PLANETOGRAPHIC_LATITUDE",
        "X_MARS_SC_VELOCITY_VECTOR",
        "Y_MARS_SC_VELOCITY_VECTOR",
        "Z_MARS_SC_VELOCITY_VECTOR",
        "MARS_SC_RADIAL_VELOCITY",
        "MARS_SC_TANGENTIAL_VELOCITY",
        "LOCAL_TRUE_SOLAR_TIME",
        "SOLAR_ZENITH_ANGLE",
        "SC_PITCH_ANGLE",
        "SC_YAW_ANGLE",
        "SC_ROLL_ANGLE",
        "MRO_SAMX_INNER_GIMBAL_ANGLE",
        "MRO_SAMX_OUTER_GIMBAL_ANGLE",
        "MRO_SAPX_INNER_GIMBAL_ANGLE",
        "MRO_SAPX_OUTER_GIMBAL_ANGLE",
        "MRO_HGA_INNER_GIMBAL_ANGLE",
        "MRO_HGA_OUTER_GIMBAL_ANGLE",
    ];
    for (i, name) in doubles.iter().enumerate() {
        fields.push(FieldDescriptor::new(*name, 392 + i * 64, 64, Float));
    }
    // instrument housekeeping singles from bit 1864
    let singles = [
        "DES_TEMP", "DES_5V", "DES_12V", "DES_2V5", "RX_TEMP", "TX_TEMP", "TX_LEV", "TX_CURR",
    ];
    for (i, name) in singles.iter().enumerate() {
        fields.push(FieldDescriptor::new(*name, 1864 + i * 32, 32, Float));
    }
    fields.push(FieldDescriptor::new("CORRUPTED_DATA_FLAG", 2120, 16, Int));

    let schema = Schema::new("sharad-aux", fields)?;
    Layout::new(schema, 267 * 8, 267 * 8)
}

/// SHARAD science data ancillary header. Only the leading 186 bytes of each 3786 byte row are
/// decoded; the remainder is echo sample data.
fn sharad_science() -> Result<Layout> {
    use FieldType::UInt;

    let ost_line = Schema::builder("OST_LINE")
        .field("PULSE_REPETITION_INTERVAL", 4, UInt)
        .field("PHASE_COMPENSATION_TYPE", 4, UInt)
        .skip(2)
        .field("DATA_TAKE_LENGTH", 22, UInt)
        .field("OPERATIVE_MODE", 8, UInt)
        .field("MANUAL_GAIN_CONTROL", 8, UInt)
        .field("COMPRESSION_SELECTION", 1, UInt)
        .field("CLOSED_LOOP_TRACKING", 1, UInt)
        .field("TRACKING_DATA_STORAGE", 1, UInt)
        .field("TRACKING_PRE_SUMMING", 3, UInt)
        .field("TRACKING_LOGIC_SELECTION", 1, UInt)
        .field("THRESHOLD_LOGIC_SELECTION", 1, UInt)
        .field("SAMPLE_NUMBER", 4, UInt)
        .skip(1)
        .field("ALPHA_BETA", 2, UInt)
        .field("REFERENCE_BIT", 1, UInt)
        .field("THRESHOLD", 8, UInt)
        .field("THRESHOLD_INCREMENT", 8, UInt)
        .skip(4)
        .field("INITIAL_ECHO_VALUE", 3, UInt)
        .field("EXPECTED_ECHO_SHIFT", 3, UInt)
        .field("WINDOW_LEFT_SHIFT", 3, UInt)
        .field("WINDOW_RIGHT_SHIFT", 3, UInt)
        .build()?;

    let mut builder = Schema::builder("sharad-science")
        .field("SCET_BLOCK_WHOLE", 32, UInt)
        .field("SCET_BLOCK_FRAC", 16, UInt)
        .field("TLM_COUNTER", 32, UInt)
        .field("FMT_LENGTH", 16, UInt)
        .skip(16)
        .field("SCET_OST_WHOLE", 32, UInt)
        .field("SCET_OST_FRAC", 16, UInt)
        .skip(8)
        .field("OST_LINE_NUMBER", 8, UInt)
        .sub("OST_LINE", 128, ost_line)
        .skip(8)
        .field("DATA_BLOCK_ID", 24, UInt)
        .field("SCIENCE_DATA_SOURCE_COUNTER", 16, UInt)
        .field("PACKET_SEGMENTATION_AND_FPGA_STATUS", 16, UInt)
        .skip(8)
        .field("DATA_BLOCK_FIRST_PRI", 24, UInt)
        .field("TIME_DATA_BLOCK_WHOLE", 32, UInt)
        .field("TIME_DATA_BLOCK_FRAC", 16, UInt)
        .field("SDI_BIT_FIELD", 16, UInt);

    let words = [
        "TIME_N",
        "RADIUS_N",
        "TANGENTIAL_VELOCITY_N",
        "RADIAL_VELOCITY_N",
        "TLP",
        "TIME_WPF",
        "DELTA_TIME",
        "TLP_INTERPOLATE",
        "RADIUS_INTERPOLATE",
        "TANGENTIAL_VELOCITY_INTERPOLATE",
        "RADIAL_VELOCITY_INTERPOLATE",
        "END_TLP",
    ];
    for name in words {
        builder = builder.field(name, 32, UInt);
    }
    for i in 1..=8 {
        builder = builder.field(format!("S_COEFF_{i}"), 32, UInt);
    }
    for i in 1..=7 {
        builder = builder.field(format!("C_COEFF_{i}"), 32, UInt);
    }
    let schema = builder
        .field("SLOPE", 32, UInt)
        .field("TOPOGRAPHY", 32, UInt)
        .field("PHASE_COMPENSATION_STEP", 32, UInt)
        .field("RECEIVE_WINDOW_OPENING_TIME", 32, UInt)
        .field("RECEIVE_WINDOW_POSITION", 32, UInt)
        .build()?;

    Layout::new(schema, 3786 * 8, 186 * 8)
}

/// JSON description of a [Layout].
///
/// Stride and decoded region may be given in bits or bytes; the decoded region defaults to the
/// full stride. Each field is either `{"spare": <bits>}`, which advances the offset cursor, or a
/// field object. Fields without an `offset` are placed at the cursor.
///
/// ```json
/// {
///   "name": "example",
///   "stride_bytes": 16,
///   "decoded_bytes": 4,
///   "fields": [
///     {"name": "COUNTER", "type": "uint", "width": 12},
///     {"spare": 4},
///     {"name": "FLAGS", "type": "sub", "width": 16, "fields": [
///       {"name": "MODE", "type": "uint", "width": 4},
///       {"name": "GAIN", "type": "int", "offset": 8, "width": 8}
///     ]}
///   ]
/// }
/// ```
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride_bits: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_bits: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_bytes: Option<usize>,
    pub fields: Vec<FieldDef>,
}

#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDef {
    Spare {
        spare: usize,
    },
    Field {
        name: String,
        #[serde(rename = "type")]
        ty: TypeDef,
        width: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<usize>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<FieldDef>,
    },
}

#[cfg(feature = "serde")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDef {
    UInt,
    Int,
    Float,
    Date,
    Sub,
}

#[cfg(feature = "serde")]
impl LayoutDef {
    /// Validate into a [Layout].
    ///
    /// # Errors
    /// [Error::Config] if the stride is missing, given twice or too large to address in bits, or
    /// nested fields are given for a non-`sub` field, plus any error from [Schema::new] or [Layout::new].
    pub fn to_layout(&self) -> Result<Layout> {
        let bits = |what: &str, bits: Option<usize>, bytes: Option<usize>| match (bits, bytes) {
            (Some(_), Some(_)) => Err(Error::Config(format!(
                "layout {}: {what} given in both bits and bytes",
                self.name
            ))),
            (Some(bits), None) => Ok(Some(bits)),
            (None, Some(bytes)) => bytes.checked_mul(8).map(Some).ok_or_else(|| {
                Error::Config(format!(
                    "layout {}: {what} of {bytes} bytes is too large",
                    self.name
                ))
            }),
            (None, None) => Ok(None),
        };
        let stride = bits("stride", self.stride_bits, self.stride_bytes)?.ok_or_else(|| {
            Error::Config(format!("layout {}: stride is required", self.name))
        })?;
        let decoded = bits("decoded region", self.decoded_bits, self.decoded_bytes)?
            .unwrap_or(stride);

        let schema = build_schema(&self.name, &self.fields)?;
        Layout::new(schema, stride, decoded)
    }
}

#[cfg(feature = "serde")]
fn build_schema(name: &str, defs: &[FieldDef]) -> Result<Schema> {
    let mut builder = Schema::builder(name);
    for def in defs {
        builder = match def {
            FieldDef::Spare { spare } => builder.skip(*spare),
            FieldDef::Field {
                name: field,
                ty,
                width,
                offset,
                fields,
            } => {
                if *ty != TypeDef::Sub && !fields.is_empty() {
                    return Err(Error::Config(format!(
                        "{name}.{field}: only sub fields may have nested fields"
                    )));
                }
                let ty = match ty {
                    TypeDef::UInt => FieldType::UInt,
                    TypeDef::Int => FieldType::Int,
                    TypeDef::Float => FieldType::Float,
                    TypeDef::Date => FieldType::Date,
                    TypeDef::Sub => FieldType::Sub(build_schema(field, fields)?.into()),
                };
                match offset {
                    Some(offset) => builder.field_at(field.as_str(), *offset, *width, ty),
                    None => builder.field(field.as_str(), *width, ty),
                }
            }
        };
    }
    builder.build()
}
