//! Spectral history ring and peak spreading.

use super::spectrum::MagnitudeFrame;
use super::{BINS, RING_SIZE, WARM_UP_LAG};

/// Offsets (in frames) into the past that receive each new frame's maxima.
pub const TIME_SPREAD_OFFSETS: [u64; 4] = [1, 2, 3, 6];

/// Replace each bin with the max of itself and its two higher neighbours.
/// The top two bins pass through unchanged.
pub fn spread_frequency(frame: &mut MagnitudeFrame) {
    let v = &mut frame.0;
    // Ascending order only reads bins that have not been written yet.
    for b in 0..BINS - 2 {
        v[b] = v[b].max(v[b + 1]).max(v[b + 2]);
    }
}

/// Fixed arena of `RING_SIZE` magnitude frames addressed by `frame_index % RING_SIZE`.
pub struct HistoryRing {
    slots: Vec<MagnitudeFrame>,
    latest: Option<u64>,
}

impl HistoryRing {
    pub fn new() -> Self {
        Self {
            slots: (0..RING_SIZE).map(|_| MagnitudeFrame::silent()).collect(),
            latest: None,
        }
    }

    fn slot(index: u64) -> usize {
        (index % RING_SIZE as u64) as usize
    }

    pub fn record(&mut self, frame_index: u64, frame: &MagnitudeFrame) {
        self.slots[Self::slot(frame_index)].0.copy_from_slice(&frame.0[..]);
        self.latest = Some(self.latest.map_or(frame_index, |l| l.max(frame_index)));
    }

    /// Fold the frame at `frame_index` into the slots at each spread offset
    /// before it. Offsets reaching before frame 0 are skipped.
    pub fn spread_time(&mut self, frame_index: u64) {
        let current = Self::slot(frame_index);
        for offset in TIME_SPREAD_OFFSETS {
            let Some(past) = frame_index.checked_sub(offset) else {
                continue;
            };
            let past = Self::slot(past);
            let (dst, src) = if past < current {
                let (lo, hi) = self.slots.split_at_mut(current);
                (&mut lo[past], &hi[0])
            } else {
                let (lo, hi) = self.slots.split_at_mut(past);
                (&mut hi[0], &lo[current])
            };
            for (d, s) in dst.0.iter_mut().zip(src.0.iter()) {
                *d = d.max(*s);
            }
        }
    }

    /// Read a resident frame. Only frames within the warm-up window of the
    /// latest recording are ever read; older slots may already be reused.
    pub fn frame(&self, frame_index: u64) -> &MagnitudeFrame {
        debug_assert!(
            self.is_resident(frame_index),
            "frame {frame_index} is not resident (latest {:?})",
            self.latest
        );
        &self.slots[Self::slot(frame_index)]
    }

    pub fn is_resident(&self, frame_index: u64) -> bool {
        self.latest
            .is_some_and(|l| frame_index <= l && l - frame_index < RING_SIZE as u64)
    }

    pub fn latest(&self) -> Option<u64> {
        self.latest
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(WARM_UP_LAG < RING_SIZE as u64);
