//! Fixed stride record iteration.
use rayon::prelude::*;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::bits::BitView;
use crate::record::{decode_record, decode_record_lenient, Record, Table};
use crate::schema::Schema;
use crate::{Error, Result};

/// What to do with a record that contains a timestamp that cannot be parsed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OnMalformedDate {
    /// The record is produced as an error. Other records are unaffected.
    #[default]
    Fail,
    /// The record is dropped from the output.
    Skip,
    /// The record is produced with [Value::Null](crate::Value::Null) for each bad date.
    Null,
}

/// Options for a [RecordStream].
///
/// # Example
/// ```
/// use telemdec::{OnMalformedDate, StreamOpts};
///
/// // 3786 byte rows of which only the leading 186 byte header is decoded
/// let opts = StreamOpts::builder()
///     .stride_bits(3786 * 8)
///     .decoded_bits(186 * 8)
///     .on_malformed_date(OnMalformedDate::Skip)
///     .build();
/// assert_eq!(opts.decoded_bits(), 1488);
/// ```
#[derive(TypedBuilder, Debug, Clone)]
pub struct StreamOpts {
    /// Number of bits from the start of one record to the start of the next.
    stride_bits: usize,
    /// Number of leading bits of each stride the schema is applied to. Any remaining bits are
    /// payload that is not decoded. Defaults to the full stride.
    #[builder(default, setter(strip_option))]
    decoded_bits: Option<usize>,
    #[builder(default)]
    on_malformed_date: OnMalformedDate,
    /// Threads used by [RecordStream::par_decode]. The default, 0, lets rayon decide.
    #[builder(default)]
    num_threads: usize,
}

impl StreamOpts {
    #[must_use]
    pub fn stride_bits(&self) -> usize {
        self.stride_bits
    }

    #[must_use]
    pub fn decoded_bits(&self) -> usize {
        self.decoded_bits.unwrap_or(self.stride_bits)
    }

    #[must_use]
    pub fn on_malformed_date(&self) -> OnMalformedDate {
        self.on_malformed_date
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

/// A buffer of back-to-back fixed stride records.
///
/// The number of records is `floor(bit_len / stride_bits)`. Bits after the last full stride
/// cannot hold a complete record and are ignored; see [RecordStream::partial_stride_present].
///
/// Records are independent of each other, so the stream is index addressable
/// ([RecordStream::get]) and may be iterated any number of times ([RecordStream::iter]).
///
/// # Example
/// ```
/// use telemdec::{FieldType, RecordStream, Schema, StreamOpts, Value};
///
/// let schema = Schema::builder("counter")
///     .field("COUNT", 8, FieldType::UInt)
///     .build()
///     .unwrap();
/// // two 16-bit strides and a trailing partial byte
/// let dat = [1, 0xaa, 2, 0xbb, 3];
/// let opts = StreamOpts::builder().stride_bits(16).build();
/// let stream = RecordStream::new(&schema, &dat, opts).unwrap();
///
/// let counts: Vec<Value> = stream
///     .iter()
///     .map(|r| r.unwrap().get("COUNT").cloned().unwrap())
///     .collect();
/// assert_eq!(counts, vec![Value::UInt(1), Value::UInt(2)]);
/// assert!(stream.partial_stride_present());
/// assert_eq!(stream.bytes_ignored(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RecordStream<'a> {
    schema: &'a Schema,
    view: BitView<'a>,
    opts: StreamOpts,
    len: usize,
}

impl<'a> RecordStream<'a> {
    /// Stream over all bits of `data`.
    ///
    /// # Errors
    /// [Error::Config] if the stride is zero, the decoded region is larger than the stride or the
    /// schema is larger than the decoded region.
    pub fn new(schema: &'a Schema, data: &'a [u8], opts: StreamOpts) -> Result<Self> {
        Self::with_view(schema, BitView::new(data), opts)
    }

    /// Stream over the bits of `view`.
    ///
    /// # Errors
    /// See [RecordStream::new].
    pub fn with_view(schema: &'a Schema, view: BitView<'a>, opts: StreamOpts) -> Result<Self> {
        let stride = opts.stride_bits();
        let decoded = opts.decoded_bits();
        if stride == 0 {
            return Err(Error::Config("stride must be greater than 0".to_string()));
        }
        if decoded > stride {
            return Err(Error::Config(format!(
                "decoded region of {decoded} bits exceeds stride of {stride} bits"
            )));
        }
        if schema.bit_len() > decoded {
            return Err(Error::Config(format!(
                "schema {} needs {} bits but the decoded region is {decoded} bits",
                schema.name(),
                schema.bit_len()
            )));
        }

        let len = view.bit_len() / stride;
        let stream = RecordStream {
            schema,
            view,
            opts,
            len,
        };
        debug!(
            schema = schema.name(),
            records = len,
            stride_bits = stride,
            decoded_bits = decoded,
            "record stream"
        );
        if stream.partial_stride_present() {
            debug!(
                bits_ignored = stream.bits_ignored(),
                "ignoring partial trailing stride"
            );
        }
        Ok(stream)
    }

    #[must_use]
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    #[must_use]
    pub fn opts(&self) -> &StreamOpts {
        &self.opts
    }

    /// Number of complete strides, i.e., records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bits after the last complete stride.
    #[must_use]
    pub fn bits_ignored(&self) -> usize {
        self.view.bit_len() - self.len * self.opts.stride_bits()
    }

    /// Number of whole bytes after the last complete stride.
    #[must_use]
    pub fn bytes_ignored(&self) -> usize {
        self.bits_ignored() / 8
    }

    /// True if the buffer ends with a partial stride that was not decoded.
    #[must_use]
    pub fn partial_stride_present(&self) -> bool {
        self.bits_ignored() > 0
    }

    /// Decode the record at `idx`, or `None` if `idx` is out of range.
    ///
    /// This ignores the [OnMalformedDate] option; any error is returned with the record index
    /// attached.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Result<Record>> {
        if idx >= self.len {
            return None;
        }
        Some(
            self.region(idx)
                .and_then(|region| decode_record(self.schema, &region))
                .map_err(|err| err.at_record(idx)),
        )
    }

    /// Iterate over all records in order, applying the [OnMalformedDate] option.
    ///
    /// Errors are produced in place of the affected record and iteration continues with the
    /// following record.
    #[must_use]
    pub fn iter(&self) -> Records<'_, 'a> {
        Records {
            stream: self,
            next: 0,
        }
    }

    /// Decode all records in order.
    ///
    /// # Errors
    /// The first record error not handled by the [OnMalformedDate] option.
    pub fn decode_all(&self) -> Result<Table> {
        let mut table = Table::new(self.schema.columns().clone());
        for record in self.iter() {
            table.push(record?)?;
        }
        Ok(table)
    }

    /// Decode all records using a pool of threads. Records are returned in stride order, the
    /// same as [RecordStream::decode_all].
    ///
    /// # Errors
    /// [Error::Config] if the thread pool cannot be created, otherwise the same as
    /// [RecordStream::decode_all].
    pub fn par_decode(&self) -> Result<Table> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.num_threads())
            .build()
            .map_err(|err| Error::Config(format!("failed to construct decode threadpool: {err}")))?;

        let records: Vec<Record> = pool.install(|| {
            (0..self.len)
                .into_par_iter()
                .filter_map(|idx| self.resolve(idx))
                .collect::<Result<Vec<Record>>>()
        })?;

        let mut table = Table::new(self.schema.columns().clone());
        for record in records {
            table.push(record)?;
        }
        Ok(table)
    }

    fn region(&self, idx: usize) -> Result<BitView<'a>> {
        self.view
            .window(idx * self.opts.stride_bits(), self.opts.decoded_bits())
    }

    /// Decode record `idx` applying the malformed date option. `None` means the record is
    /// skipped.
    fn resolve(&self, idx: usize) -> Option<Result<Record>> {
        trace!(record = idx, "decoding");
        let region = match self.region(idx) {
            Ok(region) => region,
            Err(err) => return Some(Err(err)),
        };
        match self.opts.on_malformed_date() {
            OnMalformedDate::Fail => {
                Some(decode_record(self.schema, &region).map_err(|err| err.at_record(idx)))
            }
            OnMalformedDate::Skip => match decode_record(self.schema, &region) {
                Err(err) if err.is_malformed_date() => {
                    warn!(record = idx, "skipping record: {err}");
                    None
                }
                zult => Some(zult.map_err(|err| err.at_record(idx))),
            },
            OnMalformedDate::Null => match decode_record_lenient(self.schema, &region) {
                Ok((record, malformed)) => {
                    for err in malformed {
                        warn!(record = idx, "using null: {err}");
                    }
                    Some(Ok(record))
                }
                Err(err) => Some(Err(err.at_record(idx))),
            },
        }
    }
}

impl<'s, 'a> IntoIterator for &'s RecordStream<'a> {
    type Item = Result<Record>;
    type IntoIter = Records<'s, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the records of a [RecordStream], see [RecordStream::iter].
pub struct Records<'s, 'a> {
    stream: &'s RecordStream<'a>,
    next: usize,
}

impl Iterator for Records<'_, '_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.stream.len() {
            let idx = self.next;
            self.next += 1;
            if let Some(zult) = self.stream.resolve(idx) {
                return Some(zult);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.stream.len() - self.next))
    }
}
