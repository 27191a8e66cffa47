//! Engine configuration types.

/// Fixed number of frames rendered per buffer period.
///
/// Every stage of the pipeline (renderer process step, ambisonic decode,
/// stereo mixdown, sink handoff) operates on exactly this many frames, which
/// pins end-to-end latency to `BUFFER_FRAMES / sample_rate` seconds plus sink
/// buffering.
pub const BUFFER_FRAMES: usize = 128;

/// Number of output channels produced by the decode stage (stereo).
pub const OUTPUT_CHANNELS: usize = 2;

/// How the ambisonic bus is decoded to the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Plain stereo speaker output.
    #[default]
    Normal,
    /// Two-channel HRTF output for headphones.
    Binaural,
}

/// Requested output device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputDevice {
    /// Use the host's default output device.
    #[default]
    Default,
    /// Match a device by name.
    Named(String),
}

/// Distance attenuation applied by the renderer to a spatial source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceModel {
    /// The renderer's physically based inverse-distance curve.
    #[default]
    Inverse,
    /// Linear rolloff reaching silence at `max_distance`.
    Linear { max_distance: f32 },
    /// No distance attenuation.
    None,
}

/// Configuration descriptor for an engine instance.
#[derive(Debug, Clone)]
pub struct EngineDesc {
    /// Sample rate the mix is rendered at.
    pub sample_rate: u32,
    /// Output device request, resolved during negotiation.
    pub device: OutputDevice,
}

impl Default for EngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            device: OutputDevice::Default,
        }
    }
}
