//! Background fingerprinting driver.
//!
//! A `Fingerprinter` owns one source at a time. Once started, a dedicated
//! worker thread pulls samples, runs them through the landmark pipeline and
//! hands finished fingerprints to clients through a bounded queue. Disabling
//! that queue is the only way the worker is cancelled.

pub mod queue;

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::decode::MediaSource;
use crate::audio::{SampleSupply, Supply};
use crate::config::{default_queue_capacity, ResamplerConfig};
use crate::error::OpenError;
use crate::fingerprint::{Fingerprint, LandmarkPipeline};

use queue::{FingerprintQueue, RecvTimeoutError, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, no source.
    Idle,
    /// Source opened, worker not started.
    Open,
    /// Worker producing fingerprints.
    Running,
    /// Worker has stopped producing; queued fingerprints may remain.
    Draining,
    /// Terminal. Worker joined, source released, queue disabled.
    Closed,
}

type Worker = JoinHandle<Box<dyn SampleSupply>>;

pub struct Fingerprinter {
    state: PipelineState,
    queue: Arc<FingerprintQueue>,
    supply: Option<Box<dyn SampleSupply>>,
    worker: Option<Worker>,
    resampler: ResamplerConfig,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::with_config(default_queue_capacity(), ResamplerConfig::default())
    }

    pub fn with_config(queue_capacity: usize, resampler: ResamplerConfig) -> Self {
        Self {
            state: PipelineState::Idle,
            queue: Arc::new(FingerprintQueue::new(queue_capacity)),
            supply: None,
            worker: None,
            resampler,
        }
    }

    /// Open a media file. On failure the fingerprinter stays idle.
    pub fn open(&mut self, path: &Path) -> Result<(), OpenError> {
        let resampler = self.resampler.clone();
        self.open_with(|| {
            MediaSource::open(path, &resampler).map(|s| Box::new(s) as Box<dyn SampleSupply>)
        })
    }

    /// Open from any fallible supply constructor.
    pub fn open_with<F>(&mut self, open: F) -> Result<(), OpenError>
    where
        F: FnOnce() -> Result<Box<dyn SampleSupply>, OpenError>,
    {
        if self.state != PipelineState::Idle {
            return Err(OpenError::AlreadyOpen(self.state()));
        }
        let supply = open()?;
        self.supply = Some(supply);
        self.state = PipelineState::Open;
        Ok(())
    }

    pub fn attach(&mut self, supply: impl SampleSupply + 'static) -> Result<(), OpenError> {
        let supply: Box<dyn SampleSupply> = Box::new(supply);
        self.open_with(move || Ok(supply))
    }

    /// Spawn the worker. No-op unless the fingerprinter is open.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.state != PipelineState::Open {
            return Ok(());
        }
        let Some(supply) = self.supply.take() else {
            return Ok(());
        };

        let queue = Arc::clone(&self.queue);
        let worker = thread::Builder::new()
            .name("sonoprint-worker".into())
            .spawn(move || run_worker(supply, queue))?;

        self.worker = Some(worker);
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Block for the next fingerprint, starting the worker if needed.
    /// `None` once the stream has ended and everything queued was taken.
    pub fn next_fingerprint(&mut self) -> Option<Fingerprint> {
        if let Err(e) = self.start() {
            log::error!("Failed to start fingerprint worker: {}", e);
            self.stop();
            return None;
        }
        match self.state {
            PipelineState::Idle | PipelineState::Open => None,
            _ => self.queue.pop(),
        }
    }

    /// A handle other threads can block on.
    pub fn receiver(&self) -> FingerprintReceiver {
        FingerprintReceiver {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn state(&self) -> PipelineState {
        match (self.state, &self.worker) {
            (PipelineState::Running, Some(worker)) if worker.is_finished() => PipelineState::Draining,
            (state, _) => state,
        }
    }

    /// Disable the queue, wait for the worker, then release the source.
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Closed {
            return;
        }
        self.queue.disable();

        if let Some(worker) = self.worker.take() {
            self.state = PipelineState::Draining;
            log::debug!("Waiting for fingerprint worker to exit");
            match worker.join() {
                Ok(supply) => drop(supply),
                Err(_) => log::error!("Fingerprint worker panicked"),
            }
        }
        self.supply = None;
        self.state = PipelineState::Closed;
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Fingerprinter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable consumer side of a fingerprinter's queue.
#[derive(Clone)]
pub struct FingerprintReceiver {
    queue: Arc<FingerprintQueue>,
}

impl FingerprintReceiver {
    pub fn recv(&self) -> Option<Fingerprint> {
        self.queue.pop()
    }

    pub fn try_recv(&self) -> Result<Fingerprint, TryRecvError> {
        self.queue.try_pop()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Fingerprint, RecvTimeoutError> {
        self.queue.pop_timeout(timeout)
    }
}

impl Iterator for FingerprintReceiver {
    type Item = Fingerprint;

    fn next(&mut self) -> Option<Fingerprint> {
        self.recv()
    }
}

/// Finishes the queue when the worker leaves, unwinding included, so clients
/// never wait on a producer that is gone.
struct FinishOnExit(Arc<FingerprintQueue>);

impl Drop for FinishOnExit {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn run_worker(mut supply: Box<dyn SampleSupply>, queue: Arc<FingerprintQueue>) -> Box<dyn SampleSupply> {
    let _finish = FinishOnExit(Arc::clone(&queue));
    let mut pipeline = LandmarkPipeline::new();
    let mut emitted = 0u64;
    log::info!("Fingerprint worker started");

    let reason = 'outer: loop {
        if !queue.is_enabled() {
            break "cancelled";
        }
        match supply.next_batch() {
            Supply::Samples(batch) => {
                for sample in batch {
                    let Some(fingerprint) = pipeline.push_sample(sample) else {
                        continue;
                    };
                    if queue.push(fingerprint).is_err() {
                        break 'outer "cancelled";
                    }
                    emitted += 1;
                }
            }
            Supply::TryAgain => thread::yield_now(),
            Supply::EndOfStream => break "end of stream",
            Supply::Failed(msg) => {
                log::warn!("Stream error: {}", msg);
                break "stream error";
            }
        }
    };

    log::info!(
        "Fingerprint worker exited ({}): {} frames analysed, {} fingerprints",
        reason,
        pipeline.frames(),
        emitted
    );
    supply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{FrequencyBand, HOP, SAMPLE_RATE, WARM_UP_LAG, WINDOW};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    /// Serves a fixed sample buffer in uneven batches, with stalls in between.
    struct ScriptedSupply {
        samples: Vec<i16>,
        pos: usize,
        calls: usize,
        ending: Supply,
        released: Arc<AtomicBool>,
    }

    impl ScriptedSupply {
        fn new(samples: Vec<i16>, ending: Supply) -> (Self, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let supply = Self {
                samples,
                pos: 0,
                calls: 0,
                ending,
                released: Arc::clone(&released),
            };
            (supply, released)
        }
    }

    impl SampleSupply for ScriptedSupply {
        fn next_batch(&mut self) -> Supply {
            self.calls += 1;
            if self.calls % 3 == 0 {
                return Supply::TryAgain;
            }
            if self.pos >= self.samples.len() {
                return self.ending.clone();
            }
            let end = (self.pos + 700 + self.calls % 5 * 37).min(self.samples.len());
            let batch = self.samples[self.pos..end].to_vec();
            self.pos = end;
            Supply::Samples(batch)
        }
    }

    impl Drop for ScriptedSupply {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn tone(freq_hz: f32, frames: usize) -> Vec<i16> {
        (0..WINDOW + (frames - 1) * HOP)
            .map(|n| {
                let t = n as f32 / SAMPLE_RATE as f32;
                (0.5 * (2.0 * std::f32::consts::PI * freq_hz * t).sin() * 32767.0) as i16
            })
            .collect()
    }

    #[test]
    fn new_fingerprinter_is_idle() {
        let mut fp = Fingerprinter::new();
        assert_eq!(fp.state(), PipelineState::Idle);
        assert!(fp.next_fingerprint().is_none());
        assert_eq!(fp.state(), PipelineState::Idle);
    }

    #[test]
    fn failed_open_stays_idle() {
        let mut fp = Fingerprinter::new();
        let err = fp
            .open_with(|| Err(OpenError::MultipleAudioStreams(2)))
            .unwrap_err();
        assert!(err.to_string().contains("exactly one audio stream"));
        assert_eq!(fp.state(), PipelineState::Idle);
        assert!(fp.worker.is_none());
        assert!(fp.supply.is_none());

        assert!(fp.open(Path::new("/nonexistent/track.flac")).is_err());
        assert_eq!(fp.state(), PipelineState::Idle);
    }

    #[test]
    fn second_open_is_rejected() {
        let mut fp = Fingerprinter::new();
        fp.attach(|| Supply::EndOfStream).unwrap();
        assert_eq!(fp.state(), PipelineState::Open);
        assert!(matches!(
            fp.attach(|| Supply::EndOfStream),
            Err(OpenError::AlreadyOpen(PipelineState::Open))
        ));
    }

    #[test]
    fn streams_tone_to_end_in_order() {
        let (supply, released) = ScriptedSupply::new(tone(2000.0, 60), Supply::EndOfStream);
        let mut fp = Fingerprinter::with_config(4, ResamplerConfig::default());
        fp.attach(supply).unwrap();

        let mut prints = Vec::new();
        while let Some(print) = fp.next_fingerprint() {
            prints.push(print);
        }

        assert_eq!(prints.len(), 60 - WARM_UP_LAG as usize);
        assert_eq!(prints[0].frame_index, WARM_UP_LAG);
        for pair in prints.windows(2) {
            assert!(pair[1].frame_index > pair[0].frame_index);
        }
        for print in &prints {
            assert!(print.is_valid());
            assert!(!print.band(FrequencyBand::Band1450To3500).is_empty());
            assert!(print.band(FrequencyBand::Band250To520).is_empty());
            assert!(print.band(FrequencyBand::Band520To1450).is_empty());
            assert!(print.band(FrequencyBand::Band3500To5500).is_empty());
        }

        // The worker may still be logging its exit after finishing the queue.
        let deadline = Instant::now() + Duration::from_secs(5);
        while fp.state() == PipelineState::Running && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(fp.state(), PipelineState::Draining);
        fp.stop();
        assert_eq!(fp.state(), PipelineState::Closed);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn stream_error_keeps_queued_fingerprints() {
        let (supply, _) = ScriptedSupply::new(vec![0; WINDOW + 59 * HOP], Supply::Failed("bad packet".into()));
        let mut fp = Fingerprinter::with_config(64, ResamplerConfig::default());
        fp.attach(supply).unwrap();
        fp.start().unwrap();

        let rx = fp.receiver();
        let prints: Vec<Fingerprint> = rx.collect();
        assert_eq!(prints.len(), 14);
        assert!(prints.iter().all(Fingerprint::is_empty));
        assert_eq!(fp.receiver().try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn mid_stream_failure_ends_the_worker() {
        let samples = tone(2000.0, 80);
        let cut = WINDOW + 59 * HOP;
        let mut batches = vec![
            Supply::Samples(samples[..cut].to_vec()),
            Supply::Failed("decode error: corrupt frame".into()),
            Supply::Samples(samples[cut..].to_vec()),
        ]
        .into_iter();
        let pulls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&pulls);
        let supply = move || {
            counted.fetch_add(1, Ordering::SeqCst);
            batches.next().unwrap_or(Supply::EndOfStream)
        };

        let mut fp = Fingerprinter::with_config(64, ResamplerConfig::default());
        fp.attach(supply).unwrap();
        let mut prints = Vec::new();
        while let Some(print) = fp.next_fingerprint() {
            prints.push(print);
        }

        // Frames after the failure are never analysed.
        assert_eq!(prints.len(), 60 - WARM_UP_LAG as usize);
        assert_eq!(prints.last().map(|p| p.frame_index), Some(59));
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
        fp.stop();
        assert_eq!(fp.state(), PipelineState::Closed);
    }

    #[test]
    fn panicking_supply_still_closes_the_queue() {
        let mut calls = 0;
        let supply = move || {
            calls += 1;
            if calls > 3 {
                panic!("supply blew up");
            }
            Supply::Samples(vec![0; 1000])
        };
        let mut fp = Fingerprinter::new();
        fp.attach(supply).unwrap();
        fp.start().unwrap();

        let rx = fp.receiver();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Err(RecvTimeoutError::Closed));
        assert!(fp.next_fingerprint().is_none());
        fp.stop();
        assert_eq!(fp.state(), PipelineState::Closed);
    }

    #[test]
    fn receiver_times_out_while_worker_is_stalled() {
        let mut fp = Fingerprinter::new();
        fp.attach(|| Supply::TryAgain).unwrap();
        fp.start().unwrap();

        let rx = fp.receiver();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Err(RecvTimeoutError::Timeout));
        fp.stop();
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Err(RecvTimeoutError::Closed));
    }

    #[test]
    fn stop_unblocks_paused_producer_and_blocked_consumer() {
        // Endless tone and a tiny queue: the worker parks on a full queue.
        let endless = tone(700.0, 2);
        let mut cursor = 0usize;
        let supply = move || {
            let batch: Vec<i16> = (0..HOP).map(|i| endless[(cursor + i) % endless.len()]).collect();
            cursor = (cursor + HOP) % endless.len();
            Supply::Samples(batch)
        };
        let mut fp = Fingerprinter::with_config(1, ResamplerConfig::default());
        fp.attach(supply).unwrap();
        fp.start().unwrap();
        assert_eq!(fp.state(), PipelineState::Running);

        let rx = fp.receiver();
        let first = rx.recv().expect("worker should produce");
        assert_eq!(first.frame_index, WARM_UP_LAG);

        let (tx, done) = mpsc::channel();
        let consumer = thread::spawn(move || {
            // Drain until the queue is torn down.
            let mut last = None;
            while let Some(print) = rx.recv() {
                last = Some(print.frame_index);
            }
            tx.send(last).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        fp.stop();
        assert_eq!(fp.state(), PipelineState::Closed);

        let last = done
            .recv_timeout(Duration::from_secs(5))
            .expect("consumer stayed blocked after stop");
        assert!(last.map_or(true, |l| l > WARM_UP_LAG));
        consumer.join().unwrap();

        // Idempotent.
        fp.stop();
        assert_eq!(fp.state(), PipelineState::Closed);
    }

    #[test]
    fn dropping_open_fingerprinter_releases_source() {
        let (supply, released) = ScriptedSupply::new(vec![0; 10], Supply::EndOfStream);
        let mut fp = Fingerprinter::new();
        fp.attach(supply).unwrap();
        drop(fp);
        assert!(released.load(Ordering::SeqCst));
    }
}
