//! Streaming acoustic landmark fingerprints.
//!
//! ```text
//! media file ─▶ symphonia ─▶ rubato (mono 16 kHz) ─▶ hop FFT ─▶ history ring
//!            ─▶ frequency/time spreading ─▶ landmark bands ─▶ queue ─▶ client
//! ```
//!
//! [`Fingerprinter`] runs the chain on a background thread; clients pull
//! [`Fingerprint`]s in frame order until the stream ends.

pub mod audio;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod pipeline;

pub use audio::{SampleSupply, Supply};
pub use error::OpenError;
pub use fingerprint::{Fingerprint, FrequencyBand, LandmarkPipeline};
pub use pipeline::{FingerprintReceiver, Fingerprinter, PipelineState};
