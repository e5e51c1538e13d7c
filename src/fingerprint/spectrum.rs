//! Hop-wise spectral analysis.
//!
//! `HopFft` keeps the last `WINDOW` samples in a circular buffer and runs a
//! Hann-windowed forward FFT every `HOP` samples once the window is full.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{BINS, HOP, WINDOW};

/// Scales `|X|²` so a bin-centred sine of amplitude `A` reads `A²`.
const NORMALIZATION: f32 = (4.0 / WINDOW as f32) * (4.0 / WINDOW as f32);
/// Lower clamp on stored power; keeps later log scaling finite.
pub const POWER_FLOOR: f32 = 1e-12;

/// Produces one complex spectrum per hop of consumed samples.
pub trait SpectralSource {
    /// Consume one sample. Returns true when a new frame became available.
    fn push(&mut self, sample: i16) -> bool;

    /// Whether enough samples have been seen for `frame` to be meaningful.
    fn is_data_valid(&self) -> bool;

    /// The most recent frame, `BINS` values long.
    fn frame(&self) -> &[Complex<f32>];
}

pub struct HopFft {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    seen: u64,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl HopFft {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(WINDOW);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            window: hann_window(WINDOW),
            history: vec![0.0; WINDOW],
            write_pos: 0,
            seen: 0,
            buffer: vec![Complex::new(0.0, 0.0); WINDOW],
            scratch,
        }
    }

    fn transform(&mut self) {
        // Oldest sample sits at write_pos after the last write.
        for i in 0..WINDOW {
            let sample = self.history[(self.write_pos + i) % WINDOW];
            self.buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
    }
}

impl Default for HopFft {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralSource for HopFft {
    fn push(&mut self, sample: i16) -> bool {
        self.history[self.write_pos] = sample as f32 / 32768.0;
        self.write_pos = (self.write_pos + 1) % WINDOW;
        self.seen += 1;

        if !self.is_data_valid() || (self.seen - WINDOW as u64) % HOP as u64 != 0 {
            return false;
        }
        self.transform();
        true
    }

    fn is_data_valid(&self) -> bool {
        self.seen >= WINDOW as u64
    }

    fn frame(&self) -> &[Complex<f32>] {
        &self.buffer[..BINS]
    }
}

/// Normalized power spectrum of one analysis frame.
#[derive(Clone, Debug, PartialEq)]
pub struct MagnitudeFrame(pub(crate) Box<[f32; BINS]>);

impl MagnitudeFrame {
    pub fn silent() -> Self {
        Self(Box::new([POWER_FLOOR; BINS]))
    }

    pub fn from_spectrum(bins: &[Complex<f32>]) -> Self {
        let mut frame = Self::silent();
        frame.fill_from(bins);
        frame
    }

    /// Build a frame directly from power values; missing bins stay at the floor.
    pub fn from_powers(values: &[f32]) -> Self {
        let mut frame = Self::silent();
        for (slot, &v) in frame.0.iter_mut().zip(values) {
            *slot = v.max(POWER_FLOOR);
        }
        frame
    }

    /// Overwrite in place from a complex spectrum. Extra bins are ignored.
    pub fn fill_from(&mut self, bins: &[Complex<f32>]) {
        for (slot, c) in self.0.iter_mut().zip(bins) {
            *slot = (c.norm_sqr() * NORMALIZATION).max(POWER_FLOOR);
        }
    }

    pub fn values(&self) -> &[f32; BINS] {
        &self.0
    }
}

/// Periodic Hann window, so bin-centred tones leak into exactly one neighbour each side.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos())
        })
        .collect()
}
