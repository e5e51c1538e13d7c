use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Reasons a source cannot be opened for fingerprinting.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported or malformed media: {0}")]
    Probe(String),

    #[error("No audio stream found")]
    NoAudioStream,

    #[error("Expected exactly one audio stream, found {0}")]
    MultipleAudioStreams(usize),

    #[error("No decoder for audio stream: {0}")]
    NoDecoder(String),

    #[error("Audio stream does not declare a sample rate")]
    UnknownSampleRate,

    #[error("Failed to create resampler: {0}")]
    Resampler(String),

    #[error("Fingerprinter cannot open a source while {0:?}")]
    AlreadyOpen(PipelineState),
}
