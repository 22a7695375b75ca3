#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A bit slice reaches past the end of the view it was taken from.
    #[error("bit range {offset}..{} exceeds view of {len} bits", .offset + .width)]
    Range {
        offset: usize,
        width: usize,
        /// Length of the view in bits
        len: usize,
    },

    /// A field width that cannot be mapped to a primitive of the requested kind.
    #[error("unsupported {kind} width: {width} bits")]
    UnsupportedWidth { kind: &'static str, width: usize },

    /// Timestamp text that does not match `YYYY-MM-DDTHH:MM:SS.ffffff`.
    #[error("malformed date: {:?}", String::from_utf8_lossy(.raw))]
    MalformedDate {
        /// Raw bytes of the date field, before trimming
        raw: Vec<u8>,
    },

    #[error("invalid schema {schema:?}: {reason}")]
    Schema { schema: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Adds location context to an error raised for a single field.
    #[error("{schema}.{field} at bit {bit_offset}{}: {source}", .record.map(|r| format!(" of record {r}")).unwrap_or_default())]
    Field {
        schema: String,
        field: String,
        /// Bit offset of the field relative to the start of its record
        bit_offset: usize,
        /// Index of the record, when decoding from a stream
        record: Option<usize>,
        #[source]
        source: Box<Error>,
    },

    #[cfg(feature = "serde")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The innermost error, with any [Error::Field] context removed.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::Field { source, .. } => source.root(),
            err => err,
        }
    }

    /// True if this error, or the error it wraps, is a [Error::MalformedDate].
    #[must_use]
    pub fn is_malformed_date(&self) -> bool {
        matches!(self.root(), Error::MalformedDate { .. })
    }

    /// Record index carried by the field context, if any.
    #[must_use]
    pub fn record(&self) -> Option<usize> {
        match self {
            Error::Field { record, .. } => *record,
            _ => None,
        }
    }

    pub(crate) fn at_record(self, idx: usize) -> Self {
        match self {
            Error::Field {
                schema,
                field,
                bit_offset,
                source,
                ..
            } => Error::Field {
                schema,
                field,
                bit_offset,
                record: Some(idx),
                source,
            },
            err => err,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_context_message() {
        let err = Error::Field {
            schema: "aux".into(),
            field: "ORBIT_NUMBER".into(),
            bit_offset: 360,
            record: None,
            source: Box::new(Error::Range {
                offset: 360,
                width: 32,
                len: 380,
            }),
        };
        assert_eq!(
            err.to_string(),
            "aux.ORBIT_NUMBER at bit 360: bit range 360..392 exceeds view of 380 bits"
        );

        let err = err.at_record(4);
        assert_eq!(err.record(), Some(4));
        assert!(err.to_string().contains("of record 4"));
    }

    #[test]
    fn root_unwraps_context() {
        let err = Error::Field {
            schema: "aux".into(),
            field: "GEOMETRY_EPOCH".into(),
            bit_offset: 112,
            record: Some(1),
            source: Box::new(Error::MalformedDate {
                raw: b"garbage".to_vec(),
            }),
        };
        assert!(err.is_malformed_date());
        assert!(matches!(err.root(), Error::MalformedDate { raw } if raw == b"garbage"));
        assert!(!Error::Config("x".into()).is_malformed_date());
    }
}
