//! Landmark selection over the time-spread history.

use super::history::HistoryRing;
use super::{Fingerprint, FrequencyBand, WARM_UP_LAG};

/// Absolute power a bin must exceed to count as a landmark (about -60 dBFS).
pub const PEAK_FLOOR: f32 = 1e-6;
/// A landmark must also exceed the bin this far below it.
pub const GUARD_DISTANCE: usize = 4;
/// First bin scanned.
pub const LOW_GUARD: usize = FrequencyBand::Band250To520.bins().start;
/// One past the last bin scanned.
pub const HIGH_GUARD: usize = FrequencyBand::Band3500To5500.bins().end;

const _: () = assert!(LOW_GUARD >= GUARD_DISTANCE && LOW_GUARD >= 1);
const _: () = assert!(HIGH_GUARD < super::BINS);

/// Scan the fully spread frame `frame_index - WARM_UP_LAG` for landmarks.
///
/// Before the warm-up lag has elapsed the returned fingerprint is invalid and
/// must be dropped by the caller.
pub fn extract(ring: &HistoryRing, frame_index: u64) -> Fingerprint {
    let Some(target) = frame_index.checked_sub(WARM_UP_LAG) else {
        return Fingerprint::not_ready(frame_index);
    };

    let v = ring.frame(target).values();
    let mut fingerprint = Fingerprint::new(frame_index);

    for bin in LOW_GUARD..HIGH_GUARD {
        let value = v[bin];
        let accepted = value > PEAK_FLOOR
            && value > v[bin - GUARD_DISTANCE]
            && value >= v[bin - 1]
            && value >= v[bin + 1];
        if !accepted {
            continue;
        }
        if let Some(band) = FrequencyBand::for_bin(bin) {
            fingerprint.peaks[band.index()].push(bin as u16);
        }
    }

    fingerprint
}
