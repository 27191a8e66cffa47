//! Client-facing sound sources.
//!
//! A sound is owned by client code and *registered* with the engine. The
//! engine keeps membership only, never lifetime: each handle carries a weak
//! back-reference and deregisters itself before its own destruction
//! completes, so a render pass can never reach a source that has begun
//! teardown.

use crate::audio_data::{AudioData, LoopMode};
use crate::config::DistanceModel;
use crate::engine::{Engine, EngineShared, SpatialEntry, StereoEntry};
use crate::math::{Pose, Quat, Vec3};
use crate::renderer::SpatialParams;
use std::sync::{Arc, Weak};

/// Lightweight, type-safe handle identifying a registered source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// A 3D-positioned emitter mixed through the spatial renderer.
pub struct SpatialSound {
    engine: Weak<EngineShared>,
    id: SourceId,
}

impl SpatialSound {
    /// Create the sound and register it with `engine`.
    pub fn new(engine: &Engine, audio: Arc<AudioData>) -> Self {
        let shared = engine.shared();
        let id = shared.allocate_id();
        shared.add_spatial(SpatialEntry {
            id,
            params: SpatialParams::default(),
            audio,
            loop_mode: LoopMode::default(),
        });
        Self {
            engine: Arc::downgrade(&shared),
            id,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn set_position(&self, position: Vec3) {
        self.update(|p| p.position = position);
    }

    pub fn set_orientation(&self, orientation: Quat) {
        self.update(|p| p.orientation = orientation);
    }

    pub fn set_pose(&self, pose: Pose) {
        self.update(|p| {
            p.position = pose.position;
            p.orientation = pose.rotation;
        });
    }

    /// Linear gain applied before spatialization.
    pub fn set_gain(&self, gain: f32) {
        self.update(|p| p.gain = gain);
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        self.update(|p| p.distance_model = model);
    }

    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        if let Some(shared) = self.engine.upgrade() {
            shared.with_spatial_entry(self.id, |e| e.loop_mode = loop_mode);
        }
    }

    pub fn position(&self) -> Vec3 {
        self.read(|p| p.position).unwrap_or(Vec3::ZERO)
    }

    pub fn gain(&self) -> f32 {
        self.read(|p| p.gain).unwrap_or(0.0)
    }

    fn update(&self, f: impl FnOnce(&mut SpatialParams)) {
        if let Some(shared) = self.engine.upgrade() {
            shared.with_spatial_entry(self.id, |e| f(&mut e.params));
        }
    }

    fn read<T>(&self, f: impl FnOnce(&SpatialParams) -> T) -> Option<T> {
        let shared = self.engine.upgrade()?;
        shared.read_spatial_entry(self.id, |e| f(&e.params))
    }
}

impl Drop for SpatialSound {
    fn drop(&mut self) {
        if let Some(shared) = self.engine.upgrade() {
            shared.remove_spatial(self.id);
        }
    }
}

/// A non-positional two-channel emitter (background music, UI sounds) mixed
/// directly into the output, bypassing 3D processing.
pub struct StereoSound {
    engine: Weak<EngineShared>,
    id: SourceId,
}

impl StereoSound {
    /// Create the sound and register it with `engine`.
    pub fn new(engine: &Engine, audio: Arc<AudioData>) -> Self {
        let shared = engine.shared();
        let id = shared.allocate_id();
        shared.add_stereo(StereoEntry {
            id,
            gain: 1.0,
            audio,
            loop_mode: LoopMode::default(),
        });
        Self {
            engine: Arc::downgrade(&shared),
            id,
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Linear gain.
    pub fn set_gain(&self, gain: f32) {
        if let Some(shared) = self.engine.upgrade() {
            shared.with_stereo_entry(self.id, |e| e.gain = gain);
        }
    }

    pub fn set_loop_mode(&self, loop_mode: LoopMode) {
        if let Some(shared) = self.engine.upgrade() {
            shared.with_stereo_entry(self.id, |e| e.loop_mode = loop_mode);
        }
    }

    pub fn gain(&self) -> f32 {
        self.engine
            .upgrade()
            .and_then(|s| s.read_stereo_entry(self.id, |e| e.gain))
            .unwrap_or(0.0)
    }
}

impl Drop for StereoSound {
    fn drop(&mut self) {
        if let Some(shared) = self.engine.upgrade() {
            shared.remove_stereo(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineDesc;

    fn tone(frames: usize) -> Arc<AudioData> {
        AudioData::from_mono(vec![0.25; frames], 44100)
    }

    #[test]
    fn test_drop_deregisters() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, tone(256));
        assert_eq!(engine.spatial_sound_count(), 1);
        drop(sound);
        assert_eq!(engine.spatial_sound_count(), 0);
    }

    #[test]
    fn test_setters_reach_registry() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, tone(256));
        sound.set_position(Vec3::new(1.0, 2.0, 3.0));
        sound.set_gain(0.5);
        assert_eq!(sound.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(sound.gain(), 0.5);
    }

    #[test]
    fn test_sound_outliving_engine_is_inert() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, tone(256));
        drop(engine);
        sound.set_gain(0.1);
        assert_eq!(sound.gain(), 0.0);
        // Drop after the engine is gone must not panic.
        drop(sound);
    }

    #[test]
    fn test_stereo_list_is_separate() {
        let engine = Engine::new(EngineDesc::default());
        let audio = AudioData::from_stereo(vec![0.0; 512], 44100).unwrap();
        let stereo = StereoSound::new(&engine, audio);
        assert_eq!(engine.spatial_sound_count(), 0);
        assert_eq!(engine.stereo_sound_count(), 1);
        drop(stereo);
        assert_eq!(engine.stereo_sound_count(), 0);
    }
}
