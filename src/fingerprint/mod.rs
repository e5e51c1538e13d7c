//! Streaming spectral-landmark fingerprinting.
//!
//! Samples go in one at a time; every hop the spectral source produces a frame
//! which is turned into a magnitude spectrum, spread across frequency, stored in
//! the history ring, spread backward in time and finally scanned for landmarks
//! once the warm-up lag has elapsed.

pub mod history;
pub mod landmark;
pub mod spectrum;

use serde::Serialize;

use history::{spread_frequency, HistoryRing};
use spectrum::{HopFft, MagnitudeFrame, SpectralSource};

/// Analysis sample rate in Hz. Everything upstream is resampled to this.
pub const SAMPLE_RATE: u32 = 16_000;
/// Transform window length in samples.
pub const WINDOW: usize = 1024;
/// Samples consumed between successive analysis frames.
pub const HOP: usize = 128;
/// Non-negative frequency bins per frame.
pub const BINS: usize = WINDOW / 2;
/// Frames kept in the history ring.
pub const RING_SIZE: usize = 256;
/// Frames that must be recorded before the first landmark scan.
pub const WARM_UP_LAG: u64 = 46;

const fn hz_to_bin(hz: usize) -> usize {
    hz * WINDOW / SAMPLE_RATE as usize
}

/// Landmark frequency bands (250-520 Hz, 520-1450 Hz, 1450-3500 Hz, 3500-5500 Hz).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FrequencyBand {
    Band250To520,
    Band520To1450,
    Band1450To3500,
    Band3500To5500,
}

impl FrequencyBand {
    pub const COUNT: usize = 4;

    pub const ALL: [FrequencyBand; Self::COUNT] = [
        FrequencyBand::Band250To520,
        FrequencyBand::Band520To1450,
        FrequencyBand::Band1450To3500,
        FrequencyBand::Band3500To5500,
    ];

    /// Half-open bin range covered by this band.
    pub const fn bins(self) -> std::ops::Range<usize> {
        match self {
            FrequencyBand::Band250To520 => hz_to_bin(250)..hz_to_bin(520),
            FrequencyBand::Band520To1450 => hz_to_bin(520)..hz_to_bin(1450),
            FrequencyBand::Band1450To3500 => hz_to_bin(1450)..hz_to_bin(3500),
            FrequencyBand::Band3500To5500 => hz_to_bin(3500)..hz_to_bin(5500),
        }
    }

    pub fn for_bin(bin: usize) -> Option<FrequencyBand> {
        Self::ALL.into_iter().find(|band| band.bins().contains(&bin))
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            FrequencyBand::Band250To520 => "250-520Hz",
            FrequencyBand::Band520To1450 => "520-1450Hz",
            FrequencyBand::Band1450To3500 => "1450-3500Hz",
            FrequencyBand::Band3500To5500 => "3500-5500Hz",
        }
    }
}

/// Landmarks selected for one analysis frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    /// Frame index at which this record was emitted. The spectrum it describes
    /// is `frame_index - WARM_UP_LAG`.
    pub frame_index: u64,
    /// Accepted peak bins per band, ascending.
    pub peaks: [Vec<u16>; FrequencyBand::COUNT],
    #[serde(skip)]
    valid: bool,
}

impl Fingerprint {
    pub(crate) fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            peaks: Default::default(),
            valid: true,
        }
    }

    pub(crate) fn not_ready(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn band(&self, band: FrequencyBand) -> &[u16] {
        &self.peaks[band.index()]
    }

    pub fn analysed_frame(&self) -> u64 {
        self.frame_index.saturating_sub(WARM_UP_LAG)
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.peak_count() == 0
    }
}

/// The per-sample analysis chain. Owned by a single thread; nothing here is shared.
pub struct LandmarkPipeline<S: SpectralSource = HopFft> {
    source: S,
    ring: HistoryRing,
    scratch: MagnitudeFrame,
    next_frame: u64,
}

impl LandmarkPipeline<HopFft> {
    pub fn new() -> Self {
        Self::with_source(HopFft::new())
    }
}

impl Default for LandmarkPipeline<HopFft> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SpectralSource> LandmarkPipeline<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            ring: HistoryRing::new(),
            scratch: MagnitudeFrame::silent(),
            next_frame: 0,
        }
    }

    /// Feed one sample. Returns a fingerprint when a frame completed and the
    /// warm-up lag has passed.
    pub fn push_sample(&mut self, sample: i16) -> Option<Fingerprint> {
        if !self.source.push(sample) {
            return None;
        }
        self.scratch.fill_from(self.source.frame());
        self.push_magnitudes()
    }

    /// Run an already computed magnitude frame through spreading and extraction.
    pub fn push_frame(&mut self, frame: &MagnitudeFrame) -> Option<Fingerprint> {
        self.scratch.0.copy_from_slice(&frame.0[..]);
        self.push_magnitudes()
    }

    fn push_magnitudes(&mut self) -> Option<Fingerprint> {
        let index = self.next_frame;
        self.next_frame += 1;

        spread_frequency(&mut self.scratch);
        self.ring.record(index, &self.scratch);
        self.ring.spread_time(index);

        let fingerprint = landmark::extract(&self.ring, index);
        fingerprint.is_valid().then_some(fingerprint)
    }

    /// Number of analysis frames processed so far.
    pub fn frames(&self) -> u64 {
        self.next_frame
    }
}
