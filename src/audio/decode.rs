use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::MonoResampler;
use super::{SampleSupply, Supply};
use crate::config::ResamplerConfig;
use crate::error::OpenError;

/// A demuxed, decoded and resampled media file.
///
/// The reader, decoder and resampler are owned here and released together on
/// drop, including when `open` bails out part way through.
pub struct MediaSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    resampler: MonoResampler,
    finished: bool,
}

impl MediaSource {
    pub fn open(path: &Path, config: &ResamplerConfig) -> Result<Self, OpenError> {
        let file = std::fs::File::open(path).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| OpenError::Probe(e.to_string()))?;

        let format = probed.format;

        let track = select_audio_track(format.tracks())?;
        let track_id = track.id;
        let channels = track.codec_params.channels.map_or(1, |c| c.count());
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(OpenError::UnknownSampleRate)?;
        let codec_name = symphonia::default::get_codecs()
            .get_codec(track.codec_params.codec)
            .map_or("unknown", |d| d.short_name);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| OpenError::NoDecoder(e.to_string()))?;

        let resampler = MonoResampler::new(sample_rate, config)?;

        log::info!(
            "Opened {}: codec={}, {}Hz, {} channel(s)",
            path.display(),
            codec_name,
            resampler.source_rate(),
            channels
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            resampler,
            finished: false,
        })
    }

    fn end_of_stream(&mut self) -> Supply {
        self.finished = true;
        match self.resampler.flush() {
            Ok(tail) if !tail.is_empty() => Supply::Samples(tail),
            Ok(_) => Supply::EndOfStream,
            Err(e) => Supply::Failed(e.to_string()),
        }
    }
}

impl SampleSupply for MediaSource {
    fn next_batch(&mut self) -> Supply {
        if self.finished {
            return Supply::EndOfStream;
        }

        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                return self.end_of_stream();
            }
            Err(e) => return Supply::Failed(e.to_string()),
        };

        if packet.track_id() != self.track_id {
            return Supply::TryAgain;
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                return Supply::Failed(format!("decode error at ts={}: {}", packet.ts(), msg));
            }
            Err(e) => return Supply::Failed(e.to_string()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        match self.resampler.push_interleaved(sample_buf.samples(), channels) {
            Ok(samples) if samples.is_empty() => Supply::TryAgain,
            Ok(samples) => Supply::Samples(samples),
            Err(e) => Supply::Failed(e.to_string()),
        }
    }
}

/// Pick the single audio track. Symphonia only reports codecs it knows as
/// audio, so anything not `CODEC_TYPE_NULL` counts.
pub fn select_audio_track(tracks: &[Track]) -> Result<&Track, OpenError> {
    let mut audio = tracks
        .iter()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL);

    match (audio.next(), audio.next()) {
        (None, _) => Err(OpenError::NoAudioStream),
        (Some(track), None) => Ok(track),
        (Some(_), Some(_)) => Err(OpenError::MultipleAudioStreams(2 + audio.count())),
    }
}
