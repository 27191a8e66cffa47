//! Fixed-size ambisonic bus buffer.

use crate::config::BUFFER_FRAMES;

/// Ambisonics order used on the intermediate bus.
pub const AMBISONIC_ORDER: usize = 2;

/// Channel count of the ambisonic bus ((order + 1)^2).
pub const AMBISONIC_CHANNELS: usize = (AMBISONIC_ORDER + 1) * (AMBISONIC_ORDER + 1);

/// One buffer period of the mixed sound field, before decoding to the output
/// layout.
///
/// Storage is planar: channel 0 occupies the first [`BUFFER_FRAMES`] samples,
/// channel 1 the next, and so on. The render pass owns a single instance and
/// clears it each period; nothing here allocates after construction.
#[derive(Debug, Clone)]
pub struct AmbisonicBuffer {
    data: Vec<f32>,
}

impl AmbisonicBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0.0; AMBISONIC_CHANNELS * BUFFER_FRAMES],
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    pub fn frames(&self) -> usize {
        BUFFER_FRAMES
    }

    pub fn channels(&self) -> usize {
        AMBISONIC_CHANNELS
    }

    /// Planar samples, all channels back to back.
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.data[index * BUFFER_FRAMES..(index + 1) * BUFFER_FRAMES]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * BUFFER_FRAMES..(index + 1) * BUFFER_FRAMES]
    }
}

impl Default for AmbisonicBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_dimensions() {
        let bus = AmbisonicBuffer::new();
        assert_eq!(bus.channels(), 9);
        assert_eq!(bus.frames(), BUFFER_FRAMES);
        assert_eq!(bus.samples().len(), 9 * BUFFER_FRAMES);
    }

    #[test]
    fn test_clear_zeroes_all_channels() {
        let mut bus = AmbisonicBuffer::new();
        bus.channel_mut(3)[7] = 0.5;
        bus.clear();
        assert!(bus.samples().iter().all(|s| *s == 0.0));
    }
}
