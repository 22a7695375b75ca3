use std::io::Write;

use anyhow::{Context, Result};
use telemdec::{Layout, OnMalformedDate, Record, RecordStream, StreamOpts, Table};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum Format {
    Csv,
    Jsonl,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Csv, Self::Jsonl]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Csv => Some(clap::builder::PossibleValue::new("csv")),
            Self::Jsonl => Some(clap::builder::PossibleValue::new("jsonl")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DatePolicy {
    Fail,
    Skip,
    Null,
}

impl clap::ValueEnum for DatePolicy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Fail, Self::Skip, Self::Null]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Fail => Some(clap::builder::PossibleValue::new("fail")),
            Self::Skip => Some(clap::builder::PossibleValue::new("skip")),
            Self::Null => Some(clap::builder::PossibleValue::new("null")),
        }
    }
}

impl From<DatePolicy> for OnMalformedDate {
    fn from(value: DatePolicy) -> Self {
        match value {
            DatePolicy::Fail => OnMalformedDate::Fail,
            DatePolicy::Skip => OnMalformedDate::Skip,
            DatePolicy::Null => OnMalformedDate::Null,
        }
    }
}

/// Decode every record in `dat`.
pub fn decode(layout: &Layout, dat: &[u8], opts: StreamOpts) -> Result<Table> {
    let stream = RecordStream::new(layout.schema(), dat, opts)?;
    if stream.partial_stride_present() {
        warn!(
            "ignoring {} trailing bytes that do not form a complete record",
            stream.bytes_ignored()
        );
    }
    let table = stream.par_decode().context("decoding records")?;
    debug!("decoded {} of {} records", table.len(), stream.len());
    Ok(table)
}

/// Write the records of `table` to `writer`.
pub fn write_table<W: Write>(table: &Table, mut writer: W, format: &Format) -> Result<()> {
    match format {
        Format::Csv => {
            let header: Vec<String> = table.columns().iter().map(csv_field).collect();
            writeln!(writer, "{}", header.join(","))?;
            for record in table {
                write_csv_row(&mut writer, record)?;
            }
        }
        Format::Jsonl => {
            for record in table {
                serde_json::to_writer(&mut writer, record).context("serializing record")?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer.flush().context("flushing output")
}

fn write_csv_row<W: Write>(writer: &mut W, record: &Record) -> Result<()> {
    let row: Vec<String> = record
        .values()
        .iter()
        .map(|v| csv_field(&v.to_string()))
        .collect();
    writeln!(writer, "{}", row.join(","))?;
    Ok(())
}

/// Quote a field containing a delimiter, quote or line break, doubling any quotes.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"{
        "name": "test",
        "stride_bytes": 6,
        "decoded_bytes": 5,
        "fields": [
            {"name": "SEQ", "type": "uint", "width": 8},
            {"name": "TEMP", "type": "float", "width": 32}
        ]
    }"#;

    fn rows() -> Vec<u8> {
        let mut dat = Vec::default();
        for (seq, temp) in [(1u8, 1.5f32), (2, -0.25)] {
            dat.push(seq);
            dat.extend(temp.to_be_bytes());
            dat.push(0xff);
        }
        // partial stride
        dat.extend([0, 0, 0]);
        dat
    }

    fn decode_to_string(format: &Format) -> String {
        let layout = Layout::from_json(LAYOUT).unwrap();
        let opts = layout.stream_opts(OnMalformedDate::Fail, 1);
        let table = decode(&layout, &rows(), opts).unwrap();
        assert_eq!(table.len(), 2);
        let mut out = Vec::default();
        write_table(&table, &mut out, format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn csv_output() {
        assert_eq!(decode_to_string(&Format::Csv), "SEQ,TEMP\n1,1.5\n2,-0.25\n");
    }

    #[test]
    fn jsonl_output() {
        let out = decode_to_string(&Format::Jsonl);
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], serde_json::json!({"SEQ": 1, "TEMP": 1.5}));
        assert_eq!(lines[1], serde_json::json!({"SEQ": 2, "TEMP": -0.25}));
    }

    #[test]
    fn malformed_date_policy() {
        let layout = Layout::from_json(
            r#"{"name": "dates", "stride_bytes": 22, "fields": [
                {"name": "WHEN", "type": "date", "width": 168},
                {"name": "N", "type": "uint", "width": 8}
            ]}"#,
        )
        .unwrap();
        let mut dat = b"2008-01-02T03:04:05.1\x01".to_vec();
        dat.extend(b"2008-01-32T03:04:05.1\x02");

        let opts = layout.stream_opts(DatePolicy::Fail.into(), 1);
        assert!(decode(&layout, &dat, opts).is_err());

        let mut out = Vec::default();
        let opts = layout.stream_opts(DatePolicy::Null.into(), 1);
        let table = decode(&layout, &dat, opts).unwrap();
        write_table(&table, &mut out, &Format::Csv).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "WHEN,N\n2008-01-02 03:04:05.100000,1\n,2\n"
        );

        let opts = layout.stream_opts(DatePolicy::Skip.into(), 1);
        assert_eq!(decode(&layout, &dat, opts).unwrap().len(), 1);
    }

    #[test]
    fn csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
