//! Format decoders.
//!
//! One capability, three variants. [`TrackFormat::decoder`](crate::track::TrackFormat::decoder)
//! picks the variant from the catalog's format tag; the variant then uses Symphonia to:
//! - probe the container with its own extension as the hint
//! - reject content whose codec does not belong to the variant
//! - decode packets into interleaved `f32` chunks
//!
//! Decode failures are returned as [`DecodeError`] so only the session being started is
//! affected.

use std::fs::File;
use std::io;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CodecParameters, CodecType, Decoder as CodecDecoder,
    DecoderOptions,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;
use crate::track::TrackFormat;

/// Native sample rate and channel count of a decoded stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Turns an open file into a PCM sample stream.
pub trait FormatDecoder: Send + Sync {
    /// The format this decoder accepts.
    fn format(&self) -> TrackFormat;

    /// Probe `file` and prepare a sample stream. The stream owns the file handle.
    fn decode(&self, file: File) -> Result<DecodedStream, DecodeError>;
}

pub struct FlacDecoder;
pub struct WavDecoder;
pub struct Mp3Decoder;

pub(crate) static FLAC: FlacDecoder = FlacDecoder;
pub(crate) static WAV: WavDecoder = WavDecoder;
pub(crate) static MP3: Mp3Decoder = Mp3Decoder;

impl FormatDecoder for FlacDecoder {
    fn format(&self) -> TrackFormat {
        TrackFormat::Flac
    }

    fn decode(&self, file: File) -> Result<DecodedStream, DecodeError> {
        open_stream(file, TrackFormat::Flac, |codec, _| codec == CODEC_TYPE_FLAC)
    }
}

impl FormatDecoder for WavDecoder {
    fn format(&self) -> TrackFormat {
        TrackFormat::Wav
    }

    fn decode(&self, file: File) -> Result<DecodedStream, DecodeError> {
        open_stream(file, TrackFormat::Wav, |_, name| {
            name.starts_with("pcm") || name.starts_with("adpcm")
        })
    }
}

impl FormatDecoder for Mp3Decoder {
    fn format(&self) -> TrackFormat {
        TrackFormat::Mp3
    }

    fn decode(&self, file: File) -> Result<DecodedStream, DecodeError> {
        open_stream(file, TrackFormat::Mp3, |codec, _| codec == CODEC_TYPE_MP3)
    }
}

/// Shared probe path for all variants. `accepts` sees the codec type and its short name.
fn open_stream(
    file: File,
    format: TrackFormat,
    accepts: fn(CodecType, &str) -> bool,
) -> Result<DecodedStream, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| DecodeError::Probe { format, source })?;
    let reader = probed.format;

    let track = reader
        .default_track()
        .ok_or(DecodeError::NoAudioTrack { format })?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    let codec = codec_short_name(params.codec);
    if !accepts(params.codec, codec) {
        return Err(DecodeError::FormatMismatch {
            expected: format,
            found: codec.to_string(),
        });
    }

    let sample_rate = params.sample_rate.ok_or(DecodeError::MissingParameter {
        format,
        parameter: "sample rate",
    })?;
    let channels = params
        .channels
        .map(|c| c.count())
        .filter(|&c| c > 0)
        .ok_or(DecodeError::MissingParameter {
            format,
            parameter: "channel layout",
        })?;

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|source| DecodeError::Codec { format, source })?;

    Ok(DecodedStream {
        format,
        spec: StreamSpec {
            sample_rate,
            channels,
        },
        duration_ms: duration_ms_from_codec_params(&params),
        codec,
        reader,
        decoder,
        track_id,
        finished: false,
    })
}

/// A probed, ready-to-read sample stream.
///
/// Owns the underlying file; dropping the stream closes it.
pub struct DecodedStream {
    format: TrackFormat,
    spec: StreamSpec,
    duration_ms: Option<u64>,
    codec: &'static str,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    finished: bool,
}

impl DecodedStream {
    pub fn format(&self) -> TrackFormat {
        self.format
    }

    pub fn spec(&self) -> StreamSpec {
        self.spec
    }

    /// Best-effort total duration.
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Codec short name as reported by Symphonia (e.g. `flac`, `pcm_s16le`).
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    /// Next chunk of interleaved samples, or `None` at end of stream.
    ///
    /// Corrupt packets are skipped. Any other read error ends the stream.
    pub fn next_chunk(&mut self) -> Option<Vec<f32>> {
        if self.finished {
            return None;
        }
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    tracing::warn!(format = %self.format, error = %e, "read error; ending stream");
                    self.finished = true;
                    return None;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(reason)) => {
                    tracing::debug!(format = %self.format, reason, "skipping corrupt packet");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(format = %self.format, error = %e, "decoder error; ending stream");
                    self.finished = true;
                    return None;
                }
            };
            if decoded.frames() == 0 {
                continue;
            }

            let mut sample_buf =
                SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);
            return Some(sample_buf.samples().to_vec());
        }
    }
}

fn codec_short_name(codec: CodecType) -> &'static str {
    symphonia::default::get_codecs()
        .get_codec(codec)
        .map(|d| d.short_name)
        .unwrap_or("unknown")
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}
