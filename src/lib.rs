//! # soundfield
//!
//! A real-time spatial audio mixing engine. Client code creates an
//! [`Engine`], registers 3D-positioned [`SpatialSound`]s and non-positional
//! [`StereoSound`]s against it, and the engine renders the mix on a dedicated
//! audio thread: spatial sources go through a Steam Audio direct path into an
//! order-2 ambisonic bus, the bus is decoded to stereo or binaural output,
//! stereo sources are mixed in directly, and master volume is applied as the
//! final linear gain stage.
//!
//! ## Quick start
//!
//! ```no_run
//! use soundfield::*;
//!
//! let mut engine = Engine::new(EngineDesc::default());
//! engine.start()?;
//!
//! // A one-second 440 Hz tone, three meters ahead of the listener.
//! let sample_rate = engine.sample_rate();
//! let samples: Vec<f32> = (0..sample_rate)
//!     .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5)
//!     .collect();
//! let sound = SpatialSound::new(&engine, AudioData::from_mono(samples, sample_rate));
//! sound.set_position(Vec3::new(0.0, 0.0, -3.0));
//!
//! engine.set_output_mode(OutputMode::Binaural);
//! engine.set_master_volume(0.8);
//!
//! // Dropping the sound deregisters it; stopping the engine joins the
//! // audio thread before anything else is torn down.
//! drop(sound);
//! engine.stop()?;
//! # Ok::<(), SoundfieldError>(())
//! ```
//!
//! ## Threading model
//!
//! Exactly two contexts matter: the client/control thread (source
//! registration, configuration setters, start/stop) and the dedicated audio
//! thread driven by the output sink's cadence. One mutex guards the shared
//! state; each buffer period the audio thread briefly takes it to copy a
//! snapshot, then renders against the copy with the lock released. A
//! snapshot may be stale by at most one buffer period relative to the latest
//! client mutation.

pub mod audio_data;
pub mod buffer;
pub mod config;
mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod mixer;
pub mod renderer;
pub mod sound;
pub mod spatial;
mod stream;

pub use audio_data::{AudioData, LoopMode};
pub use buffer::AmbisonicBuffer;
pub use config::{DistanceModel, EngineDesc, OutputDevice, OutputMode, BUFFER_FRAMES};
pub use engine::{Engine, RenderSnapshot};
pub use error::{Result, SoundfieldError};
pub use events::EngineEvent;
pub use math::{Pose, Quat, Vec3};
pub use mixer::RenderPass;
pub use renderer::{RendererSourceId, SpatialParams, SpatialRenderer};
pub use sound::{SourceId, SpatialSound, StereoSound};
pub use spatial::SteamRenderer;
