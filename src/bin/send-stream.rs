#![deny(unsafe_code)]

//! CLI front-end wiring a JSON pool manifest through
//! [`engine::orchestrator::send_obj`].
//!
//! The block pool, transaction manager, and on-disk allocator are explicitly
//! out of scope for this crate (see `engine::pool`'s module docs); this
//! binary supplies the thinnest [`engine::pool::BlockStore`] that lets the
//! pipeline run end to end against a hand-written or scripted fixture,
//! loaded from the JSON shape [`manifest::Manifest`] describes.

mod manifest;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

use core::config::EngineConfig;
use core::error::EngineError;

use engine::emit::Sink;
use engine::orchestrator::{send_obj, SendOptions};

use logging::Verbosity;

use manifest::{load_manifest, ManifestError};

/// Sends a dataset described by a JSON pool manifest as an on-wire replay
/// stream.
#[derive(Debug, Parser)]
#[command(name = "send-stream", version, about)]
struct Args {
    /// Path to the JSON pool manifest describing the dataset to send.
    pool: PathBuf,

    /// Output path; omit to write to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Permit `EMBED_DATA`.
    #[arg(long)]
    embed: bool,
    /// Permit `LARGE_BLOCKS`.
    #[arg(long)]
    large_block: bool,
    /// Permit `COMPRESSED`.
    #[arg(long)]
    compress: bool,
    /// Raw send of an encrypted dataset (implies `large-block`/`compress`).
    #[arg(long)]
    raw: bool,
    /// Permit `ZSTD`-compressed payloads.
    #[arg(long)]
    zstd: bool,
    /// Permit `LARGE_DNODE`.
    #[arg(long)]
    large_dnode: bool,
    /// This is a resumable partial send; omit `END` on success.
    #[arg(long)]
    saved: bool,
    /// Resume cursor: object id.
    #[arg(long)]
    resume_object: Option<u64>,
    /// Resume cursor: byte offset.
    #[arg(long)]
    resume_offset: Option<u64>,

    /// Increase logging verbosity (repeatable).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Failures this binary can report, beyond what [`engine`] itself surfaces.
#[derive(Debug, Error)]
enum CliError {
    /// Loading or parsing the JSON pool manifest failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The output path could not be opened for writing.
    #[error("opening output {path}: {source}")]
    OpenOutput {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The send itself failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Byte sink writing to a file or to stdout, buffered the way a multi-
/// gigabyte replay stream warrants.
struct FileSink(BufWriter<Box<dyn Write>>);

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.0
            .write_all(bytes)
            .map_err(|e| EngineError::SinkError(e.to_string()))
    }
}

fn open_sink(output: Option<&PathBuf>) -> Result<FileSink, CliError> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).map_err(|source| CliError::OpenOutput {
            path: path.clone(),
            source,
        })?),
        None => Box::new(io::stdout()),
    };
    Ok(FileSink(BufWriter::new(writer)))
}

fn run(args: &Args) -> Result<(), CliError> {
    let loaded = load_manifest(&args.pool)?;
    let mut sink = open_sink(args.output.as_ref())?;

    let options = SendOptions {
        embed_ok: args.embed,
        large_block_ok: args.large_block,
        compress_ok: args.compress,
        raw_ok: args.raw,
        saved_ok: args.saved,
        resume_obj: args.resume_object,
        resume_off: args.resume_offset,
        zstd_ok: args.zstd,
        large_dnode_ok: args.large_dnode,
        crypt_keydata: loaded.crypt_keydata.clone(),
    };
    let cfg = EngineConfig {
        max_object_id: loaded.max_object_id,
        ..EngineConfig::new()
    };

    send_obj(
        &loaded.pool,
        &loaded.to,
        loaded.from.as_ref(),
        None,
        None,
        &options,
        &mut sink,
        None,
        &cfg,
    )?;

    sink.0
        .flush()
        .map_err(|e| CliError::Engine(EngineError::SinkError(e.to_string())))
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _ = logging::install(Verbosity::from_flag_count(args.verbose));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "send failed");
            eprintln!("send-stream: {err}");
            ExitCode::FAILURE
        }
    }
}
