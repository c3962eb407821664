//! Audio Test Fixture Generator
//!
//! Utilities for generating test audio files

use cmtag::services::tag_store::TagStore;
use cmtag::types::ProposedMetadata;
use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 0.25,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Generate a test WAV file (440Hz tone)
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let sample =
            (0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Write the smallest FLAC stream the tag store accepts: signature plus a
/// STREAMINFO block, no audio frames, no comments
pub fn write_minimal_flac(path: &Path) -> anyhow::Result<PathBuf> {
    let mut bytes = b"fLaC".to_vec();
    // Last-metadata-block flag set, type 0 (STREAMINFO), length 34
    bytes.extend_from_slice(&[0x80, 0x00, 0x00, 0x22]);
    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&4096u16.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    // 44.1kHz, 2 channels, 16 bits per sample, 0 total samples
    let packed: u64 = (44_100u64 << 44) | (1u64 << 41) | (15u64 << 36);
    bytes.extend_from_slice(&packed.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 16]);

    std::fs::write(path, bytes)?;
    Ok(path.to_path_buf())
}

/// Minimal FLAC already carrying the tags derived from `proposal`
pub fn write_tagged_flac(path: &Path, proposal: &ProposedMetadata) -> anyhow::Result<PathBuf> {
    write_minimal_flac(path)?;
    let store = TagStore::new();
    let mut handle = store.read(path)?;
    store.write(&mut handle, proposal)?;
    Ok(path.to_path_buf())
}
