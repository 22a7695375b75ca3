mod decode;
mod info;

use std::fs::File;
use std::io::{stderr, stdout, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use telemdec::{Layout, StreamOpts};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct LayoutArgs {
    /// Name of a built-in record layout. See the layouts command.
    #[arg(short, long, value_name = "name")]
    layout: Option<String>,

    /// JSON record layout definition.
    ///
    /// The document gives the layout name, the stride as stride_bytes or stride_bits, an
    /// optional decoded_bytes or decoded_bits, and a list of fields. Fields are either
    /// {"name", "type", "width", "offset"} objects, where type is one of uint, int, float,
    /// date or sub, or {"spare": <bits>} gaps. Fields without an offset follow the previous
    /// field.
    #[arg(long, value_name = "path")]
    layout_file: Option<PathBuf>,
}

impl LayoutArgs {
    fn load(&self) -> Result<Layout> {
        if let Some(path) = &self.layout_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read layout {path:?}"))?;
            return Layout::from_json(&text)
                .with_context(|| format!("invalid layout definition {path:?}"));
        }
        let name = self.layout.as_deref().unwrap_or_default();
        match Layout::builtin(name) {
            Some(layout) => Ok(layout),
            None => bail!(
                "{name} is not a built-in layout; expected one of {}",
                Layout::BUILTIN.join(", ")
            ),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a file of fixed stride records to a table.
    ///
    /// The input is read fully into memory and records are decoded in parallel. Any bytes
    /// after the last complete stride are ignored.
    Decode {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Output format
        #[arg(short, long, default_value = "csv")]
        format: decode::Format,

        /// How to handle a record containing a timestamp that cannot be parsed.
        ///
        /// fail stops decoding with an error identifying the record, skip drops the record
        /// and null writes an empty value for the timestamp.
        #[arg(long, default_value = "fail")]
        on_malformed_date: decode::DatePolicy,

        /// Number of decode threads. 0 uses one per CPU.
        #[arg(short = 'j', long, default_value_t = 0)]
        threads: usize,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, value_name = "path")]
        output: PathBuf,

        /// Input record file.
        input: PathBuf,
    },
    /// Show information about a record file
    Info {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Input record file
        input: PathBuf,
    },
    /// List the built-in record layouts.
    Layouts,
}

fn check_output(path: &Path, clobber: bool) -> Result<()> {
    if !clobber && path.exists() {
        bail!("{path:?} exists; use --clobber");
    }
    Ok(())
}

/// Decode `input` fully before creating `output`, so a failed decode leaves no output behind.
fn decode_file(
    layout: &Layout,
    input: &Path,
    output: &Path,
    clobber: bool,
    opts: StreamOpts,
    format: &decode::Format,
) -> Result<usize> {
    check_output(output, clobber)?;
    let dat = std::fs::read(input).with_context(|| format!("failed to read {input:?}"))?;
    info!(
        "decoding {input:?} with layout {} to {output:?}",
        layout.name()
    );
    let table = decode::decode(layout, &dat, opts)?;

    let dest =
        File::create(output).with_context(|| format!("failed to create output {output:?}"))?;
    decode::write_table(&table, BufWriter::new(dest), format)?;
    Ok(table.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("TELEMDEC_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Decode {
            layout,
            format,
            on_malformed_date,
            threads,
            clobber,
            output,
            input,
        } => {
            let layout = layout.load()?;
            let opts = layout.stream_opts((*on_malformed_date).into(), *threads);
            let count = decode_file(&layout, input, output, *clobber, opts, format)?;
            info!("wrote {count} records");
            Ok(())
        }
        Commands::Info {
            layout,
            format,
            input,
        } => info::info(stdout(), input, &layout.load()?, format),
        Commands::Layouts => info::layouts(stdout()),
    }
}
