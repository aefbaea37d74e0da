//! Fixture writers for tests.

use std::fs;
use std::path::Path;

/// 0.3 s of a 440 Hz tone, 44.1 kHz stereo, 16-bit FLAC.
pub const FLAC_TONE: &[u8] = include_bytes!("../testdata/tone-44k1-stereo.flac");

/// 20 silent MPEG-1 Layer III frames, 48 kHz mono, 128 kbps.
pub const MP3_SILENCE: &[u8] = include_bytes!("../testdata/silence-48k-mono.mp3");

/// Write a canned fixture to `path`.
pub fn write_fixture(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// Shape of a generated 16-bit PCM WAV sine tone (440 Hz).
#[derive(Clone, Copy, Debug)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub seconds: f32,
    pub amplitude: f32,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            seconds: 2.0,
            amplitude: 0.5,
        }
    }
}

/// Write a canonical 44-byte-header PCM s16le WAV file.
pub fn write_wav(path: &Path, spec: WavSpec) {
    let frames = (spec.sample_rate as f32 * spec.seconds).round() as u32;
    let block_align = spec.channels as u32 * 2;
    let data_len = frames * block_align;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&spec.channels.to_le_bytes());
    bytes.extend_from_slice(&spec.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(spec.sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    let step = 440.0 * std::f32::consts::TAU / spec.sample_rate as f32;
    for i in 0..frames {
        let v = ((i as f32 * step).sin() * spec.amplitude * i16::MAX as f32) as i16;
        for _ in 0..spec.channels {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}
