use clap::Parser;
use std::path::PathBuf;

use sonoprint::config::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "sonoprint", about = "Streaming acoustic landmark fingerprints")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: PathBuf,

    /// Write fingerprints here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to ./sonoprint.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Fingerprints buffered before the decoder is paused
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Stop after this many fingerprints
    #[arg(long)]
    pub limit: Option<usize>,
}
