use anyhow::{bail, Context, Result};
use clap::builder::TypedValueParser;
use clap::Parser;
use dicom_deid::config::{Config, OrgRoot};
use dicom_deid::pipeline::{OutputFormat, Pipeline, PipelineOptions};
use env_logger::Builder;
use log::{warn, Level, LevelFilter};
use std::io::Write;
use std::path::PathBuf;

#[derive(Clone)]
struct OutputFormatParser;

impl TypedValueParser for OutputFormatParser {
    type Value = OutputFormat;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let s = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidUtf8,
                "invalid output format(s)",
            )
        })?;

        s.parse::<OutputFormat>().map_err(|_e| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                format!("{s} is not a valid output format (expected png or dcm)"),
            )
        })
    }
}

/// De-identify a directory of DICOM files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding the DICOM files to de-identify
    #[arg(short, long, value_name = "INPUT_DIR")]
    input: PathBuf,

    /// Existing directory receiving the de-identified files
    #[arg(short, long, value_name = "OUTPUT_DIR")]
    output: PathBuf,

    /// Recipe file (default: built-in recipe)
    #[arg(short, long, value_name = "FILE")]
    recipe: Option<PathBuf>,

    /// Organization UID root (default: '9999')
    #[arg(long)]
    org_root: Option<String>,

    /// Words left visible on censored images, one per line
    #[arg(short, long, value_name = "FILE")]
    authorized_words: Option<PathBuf>,

    /// Output formats, e.g. "png,dcm"
    #[arg(
        short,
        long = "format",
        value_name = "FORMATS",
        value_delimiter = ',',
        default_value = "png",
        value_parser = OutputFormatParser
    )]
    formats: Vec<OutputFormat>,

    /// Write the de-identified attributes to meta.csv in the output directory
    #[arg(short, long)]
    metadata_csv: bool,

    /// Remove the files already in the output directory first
    #[arg(short, long)]
    erase_output: bool,

    /// Show more verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Error
    };

    let mut builder = Builder::from_default_env();
    builder
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => "Error",
                Level::Warn => "Warning",
                Level::Info => "Info",
                Level::Debug => "Debug",
                Level::Trace => "Trace",
            };
            writeln!(buf, "{}: {}", level, record.args())
        })
        .filter(None, log_level);
    builder.init();

    let org_root = match args.org_root {
        Some(org_root) => match org_root.parse::<OrgRoot>() {
            Ok(org_root) => org_root,
            Err(e) => bail!(e),
        },
        None => OrgRoot::default(),
    };

    let config = Config::load(
        args.recipe.as_deref(),
        args.authorized_words.as_deref(),
        org_root,
    )
    .context("failed to load configuration")?;

    // no OCR backend ships with the binary, images are exported as they are
    let options = PipelineOptions {
        formats: args.formats,
        metadata_csv: args.metadata_csv,
        erase_output: args.erase_output,
        ..PipelineOptions::default()
    };

    let summary = Pipeline::new(&config, options)
        .run(&args.input, &args.output)
        .with_context(|| {
            format!(
                "failed to de-identify {} into {}",
                args.input.display(),
                args.output.display()
            )
        })?;

    if summary.unreadable + summary.deidentification_failures + summary.export_failures > 0 {
        warn!(
            "{} unreadable file(s), {} record(s) not de-identified, {} export failure(s)",
            summary.unreadable,
            summary.deidentification_failures,
            summary.export_failures
        );
    }

    Ok(())
}
