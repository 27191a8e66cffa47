//! The narrow interface between the mixing core and the spatial DSP renderer.
//!
//! The render loop treats the renderer as an opaque real-time-safe black box:
//! it allocates per-source handles, pushes listener and source parameters,
//! runs one fixed-size process step into the ambisonic bus, and decodes the
//! bus to the output layout. The production implementation is
//! [`SteamRenderer`](crate::spatial::SteamRenderer); tests substitute a
//! deterministic mock.

use crate::buffer::AmbisonicBuffer;
use crate::config::{DistanceModel, OutputMode};
use crate::error::Result;
use crate::math::{Pose, Quat, Vec3};

/// Opaque handle into the renderer's source-id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererSourceId(pub u64);

impl std::fmt::Display for RendererSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "renderer-source-{}", self.0)
    }
}

/// Per-source parameters pushed into the renderer each buffer period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    pub position: Vec3,
    pub orientation: Quat,
    /// Linear gain applied before spatialization.
    pub gain: f32,
    pub distance_model: DistanceModel,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            gain: 1.0,
            distance_model: DistanceModel::default(),
        }
    }
}

/// Spatial DSP renderer driven by the audio thread.
///
/// After engine startup the renderer is owned exclusively by the audio
/// thread; the control thread never calls into it. Parameter changes travel
/// through the engine's snapshot path instead.
///
/// `process` and `decode` both operate on exactly
/// [`BUFFER_FRAMES`](crate::config::BUFFER_FRAMES) frames.
pub trait SpatialRenderer: Send {
    /// Allocate a source slot. Fails with
    /// [`SourceAllocation`](crate::SoundfieldError::SourceAllocation) when the
    /// renderer's source space is exhausted.
    fn create_source(&mut self) -> Result<RendererSourceId>;

    /// Release a source slot. Unknown handles are ignored.
    fn destroy_source(&mut self, id: RendererSourceId);

    fn set_source_params(&mut self, id: RendererSourceId, params: &SpatialParams);

    fn set_listener(&mut self, pose: Pose);

    /// Enable or disable room effect simulation for subsequent process steps.
    fn set_room_effects(&mut self, enabled: bool);

    /// Select the decoder configuration used by subsequent [`decode`] calls.
    /// Never takes effect mid-buffer.
    ///
    /// [`decode`]: SpatialRenderer::decode
    fn set_output_mode(&mut self, mode: OutputMode);

    /// One fixed-size render step: spatialize each source's mono input and
    /// accumulate the result into `bus`.
    fn process(&mut self, inputs: &[(RendererSourceId, &[f32])], bus: &mut AmbisonicBuffer)
        -> Result<()>;

    /// Decode the ambisonic bus into `out` (interleaved stereo,
    /// `BUFFER_FRAMES * 2` samples) using the active output mode.
    fn decode(&mut self, bus: &AmbisonicBuffer, out: &mut [f32]) -> Result<()>;
}
