pub mod decode;
pub mod resample;

/// Outcome of one pull from a sample supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supply {
    /// Mono samples at the analysis rate. May be any length.
    Samples(Vec<i16>),
    /// Nothing available yet; pull again.
    TryAgain,
    EndOfStream,
    /// Unrecoverable error with a diagnostic.
    Failed(String),
}

/// Pull-based source of mono 16 kHz samples, typically decode followed by resample.
pub trait SampleSupply: Send {
    fn next_batch(&mut self) -> Supply;
}

impl<F> SampleSupply for F
where
    F: FnMut() -> Supply + Send,
{
    fn next_batch(&mut self) -> Supply {
        self()
    }
}
