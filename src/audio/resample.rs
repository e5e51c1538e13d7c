use rubato::{
    ResampleError, Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::config::ResamplerConfig;
use crate::error::OpenError;
use crate::fingerprint::SAMPLE_RATE;

/// Streaming downmix + resample to mono 16 kHz `i16`.
///
/// Input arrives in arbitrary packet sizes; it is buffered until rubato asks
/// for a full chunk, so output length varies per call.
pub struct MonoResampler {
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    source_rate: u32,
}

impl MonoResampler {
    pub fn new(source_rate: u32, config: &ResamplerConfig) -> Result<Self, OpenError> {
        if source_rate == 0 {
            return Err(OpenError::UnknownSampleRate);
        }

        let inner = if source_rate == SAMPLE_RATE {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: config.sinc_len,
                f_cutoff: config.f_cutoff,
                oversampling_factor: config.oversampling_factor,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::BlackmanHarris2,
            };
            let resampler = SincFixedIn::<f32>::new(
                SAMPLE_RATE as f64 / source_rate as f64,
                1.0,
                params,
                config.chunk_size,
                1,
            )
            .map_err(|e| OpenError::Resampler(e.to_string()))?;
            Some(resampler)
        };

        Ok(Self {
            inner,
            pending: Vec::new(),
            source_rate,
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Downmix interleaved frames and return whatever output is ready.
    pub fn push_interleaved(
        &mut self,
        interleaved: &[f32],
        channels: usize,
    ) -> Result<Vec<i16>, ResampleError> {
        let channels = channels.max(1);
        if channels == 1 {
            self.pending.extend_from_slice(interleaved);
        } else {
            self.pending.extend(
                interleaved
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }

        let Some(resampler) = self.inner.as_mut() else {
            return Ok(self.pending.drain(..).map(to_i16).collect());
        };

        let mut output = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk = &self.pending[consumed..consumed + needed];
            let result = resampler.process(&[chunk], None)?;
            output.extend(result[0].iter().copied().map(to_i16));
            consumed += needed;
        }
        self.pending.drain(..consumed);

        Ok(output)
    }

    /// Push any buffered tail through the filter, including its delay line.
    pub fn flush(&mut self) -> Result<Vec<i16>, ResampleError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(self.pending.drain(..).map(to_i16).collect());
        };

        let mut output = Vec::new();
        if !self.pending.is_empty() {
            let tail: &[&[f32]] = &[&self.pending[..]];
            let result = resampler.process_partial(Some(tail), None)?;
            output.extend(result[0].iter().copied().map(to_i16));
            self.pending.clear();
        }
        let tail = resampler.process_partial::<Vec<f32>>(None, None)?;
        output.extend(tail[0].iter().copied().map(to_i16));

        Ok(output)
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_at_analysis_rate() {
        let mut r = MonoResampler::new(SAMPLE_RATE, &ResamplerConfig::default()).unwrap();
        let out = r.push_interleaved(&[0.5, -0.5, 1.0, 2.0], 1).unwrap();
        assert_eq!(out, vec![16383, -16383, 32767, 32767]);
        assert!(r.flush().unwrap().is_empty());
    }

    #[test]
    fn stereo_is_averaged() {
        let mut r = MonoResampler::new(SAMPLE_RATE, &ResamplerConfig::default()).unwrap();
        let out = r.push_interleaved(&[0.5, 0.0, -1.0, 0.0], 2).unwrap();
        assert_eq!(out, vec![8191, -16383]);
    }

    #[test]
    fn buffers_until_a_chunk_is_available() {
        let config = ResamplerConfig::default();
        let mut r = MonoResampler::new(48_000, &config).unwrap();
        assert_eq!(r.source_rate(), 48_000);

        let small = vec![0.0f32; config.chunk_size / 2];
        assert!(r.push_interleaved(&small, 1).unwrap().is_empty());

        let mut total = 0;
        for _ in 0..20 {
            total += r.push_interleaved(&small, 1).unwrap().len();
        }
        total += r.flush().unwrap().len();

        // 10.5 chunks of 48 kHz input come out at one third the length.
        let expected = (config.chunk_size as f64 * 10.5 / 3.0) as usize;
        assert!(total >= expected, "{total} < {expected}");
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            MonoResampler::new(0, &ResamplerConfig::default()),
            Err(OpenError::UnknownSampleRate)
        ));
    }
}
