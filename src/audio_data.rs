//! PCM payloads attached to sound sources.
//!
//! Sources are fed from in-memory sample buffers; decoding media files is out
//! of scope for this crate. Mono data feeds spatial sources, interleaved
//! stereo feeds stereo sources.

use crate::error::{Result, SoundfieldError};
use std::sync::Arc;

/// How playback behaves when a source's samples run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play to the end, then emit silence.
    #[default]
    Once,
    /// Wrap to the beginning and keep playing.
    Infinite,
}

/// Immutable PCM data shared between a sound source and the audio thread.
#[derive(Debug)]
pub struct AudioData {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl AudioData {
    /// Wrap interleaved f32 samples.
    pub fn from_samples(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Arc<Self>> {
        if channels == 0 {
            return Err(SoundfieldError::Engine("channel count must be non-zero".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(SoundfieldError::Engine(format!(
                "sample count {} is not a multiple of {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Arc::new(Self {
            samples,
            channels,
            sample_rate,
        }))
    }

    /// Mono data for spatial sources.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            samples,
            channels: 1,
            sample_rate,
        })
    }

    /// Interleaved stereo data for stereo sources.
    pub fn from_stereo(samples: Vec<f32>, sample_rate: u32) -> Result<Arc<Self>> {
        Self::from_samples(samples, 2, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_accounts_for_channels() {
        let stereo = AudioData::from_stereo(vec![0.0; 256], 44100).unwrap();
        assert_eq!(stereo.frames(), 128);
        let mono = AudioData::from_mono(vec![0.0; 256], 44100);
        assert_eq!(mono.frames(), 256);
    }

    #[test]
    fn test_rejects_ragged_interleaving() {
        assert!(AudioData::from_samples(vec![0.0; 3], 2, 44100).is_err());
        assert!(AudioData::from_samples(vec![0.0; 4], 0, 44100).is_err());
    }
}
