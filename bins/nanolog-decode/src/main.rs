use clap::Parser;
use nanolog_decoder::Decoder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Reconstructs a human-readable trace from a nanolog buffer file and the
/// producer binary that wrote it.
#[derive(Parser, Debug)]
#[command(name = "nanolog-decode", version, about)]
struct Args {
    /// Path to the buffer file written by the producer.
    buffer: PathBuf,

    /// Path to the producer binary that wrote the buffer.
    producer: PathBuf,

    /// Path to a sibling location-decoder binary, required only when the
    /// buffer was produced with table-based location ids.
    #[arg(long)]
    loc_decoder: Option<PathBuf>,

    /// Decode location ids into file:line, if the buffer carries them.
    #[arg(long)]
    decode_locations: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let decode_locations = args.decode_locations || std::env::var("NANOLOG_LOC").is_ok();

    let decoder = match Decoder::open_with_options(
        &args.buffer,
        &args.producer,
        args.loc_decoder.as_deref(),
        decode_locations,
    ) {
        Ok(d) => d,
        Err(err) => {
            eprintln!("nanolog-decode: {err}");
            return ExitCode::FAILURE;
        }
    };

    if decoder.is_truncated() {
        tracing::warn!("buffer file is truncated; showing the records physically present");
    }

    for record in decoder.decode_records() {
        println!("{record}");
    }

    ExitCode::SUCCESS
}
