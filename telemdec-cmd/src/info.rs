use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use handlebars::handlebars_helper;
use serde::Serialize;
use telemdec::Layout;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    layout: String,
    file_bytes: usize,
    stride_bits: usize,
    decoded_bits: usize,
    records: usize,
    /// Records that fail to decode, e.g., due to a malformed timestamp
    invalid_records: usize,
    partial_stride: bool,
    bytes_ignored: usize,
    columns: Vec<String>,
}

fn summarize(fpath: &Path, dat: &[u8], layout: &Layout) -> Result<Info> {
    let stream = layout.stream(dat)?;

    let mut invalid_records = 0;
    for zult in &stream {
        if let Err(err) = zult {
            debug!("{err}");
            invalid_records += 1;
        }
    }

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        layout: layout.name().to_string(),
        file_bytes: dat.len(),
        stride_bits: layout.stride_bits(),
        decoded_bits: layout.decoded_bits(),
        records: stream.len(),
        invalid_records,
        partial_stride: stream.partial_stride_present(),
        bytes_ignored: stream.bytes_ignored(),
        columns: layout.schema().columns().names().to_vec(),
    })
}

pub fn info<W: Write>(mut writer: W, fpath: &Path, layout: &Layout, format: &Format) -> Result<()> {
    let dat = std::fs::read(fpath).context("reading input")?;
    let info = summarize(fpath, &dat, layout)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut writer, &info).context("serializing to json")?;
            writer.write_all(b"\n").context("writing output")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            writer
                .write_all(str::as_bytes(&data))
                .context("writing output")
        }
    }
}

/// Write a table of the built-in layouts.
pub fn layouts<W: Write>(mut writer: W) -> Result<()> {
    writeln!(
        writer,
        "{:<16} {:>12} {:>13} {:>8}",
        "NAME", "STRIDE_BYTES", "DECODED_BITS", "COLUMNS"
    )?;
    for name in Layout::BUILTIN {
        let Some(layout) = Layout::builtin(name) else {
            continue;
        };
        writeln!(
            writer,
            "{:<16} {:>12} {:>13} {:>8}",
            name,
            layout.stride_bits() / 8,
            layout.decoded_bits(),
            layout.schema().columns().len()
        )?;
    }
    Ok(())
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        format!("{v:>width$}", width = num as usize)
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("compiling text template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================================
Layout:   {{ layout }}
Size:     {{ file_bytes }} bytes
Stride:   {{ stride_bits }} bits, {{ decoded_bits }} decoded
Records:  {{ records }}
Invalid:  {{ invalid_records }}
Ignored:  {{ bytes_ignored }} bytes{{ #if partial_stride }} (partial trailing record){{ /if }}
-----------------------------------------------------------------------------------------------
Column  Name
-----------------------------------------------------------------------------------------------
{{ #each columns }}{{ lpad 6 @index }}  {{ this }}
{{/each }}
";
