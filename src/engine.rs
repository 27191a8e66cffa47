//! Engine-wide shared state and lifecycle.
//!
//! Exactly two execution contexts touch the engine: the client/control
//! thread (setters, source registration, start/stop) and the dedicated audio
//! thread (one render pass per buffer period). One mutex guards the shared
//! state; the audio thread holds it only long enough to copy a
//! [`RenderSnapshot`], so client-side mutations are never blocked by
//! rendering and rendering never blocks beyond a list copy.

use crate::audio_data::{AudioData, LoopMode};
use crate::config::{EngineDesc, OutputMode};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::math::Pose;
use crate::renderer::SpatialParams;
use crate::sound::SourceId;
use crate::spatial::SteamRenderer;
use crate::stream::OutputStreamDriver;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Registry entry for one spatial source.
#[derive(Clone)]
pub(crate) struct SpatialEntry {
    pub id: SourceId,
    pub params: SpatialParams,
    pub audio: Arc<AudioData>,
    pub loop_mode: LoopMode,
}

/// Registry entry for one stereo source.
#[derive(Clone)]
pub(crate) struct StereoEntry {
    pub id: SourceId,
    pub gain: f32,
    pub audio: Arc<AudioData>,
    pub loop_mode: LoopMode,
}

/// Everything the mutex guards: the four scalars and the two source lists.
pub(crate) struct EngineState {
    pub master_volume: f32,
    pub output_mode: OutputMode,
    pub room_effects: bool,
    pub listener: Pose,
    pub spatial: Vec<SpatialEntry>,
    pub stereo: Vec<StereoEntry>,
}

/// State shared between the control thread and the audio thread.
pub(crate) struct EngineShared {
    state: Mutex<EngineState>,
    next_id: AtomicU64,
    events_tx: Sender<EngineEvent>,
}

impl EngineShared {
    pub fn allocate_id(&self) -> SourceId {
        SourceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn events_tx(&self) -> Sender<EngineEvent> {
        self.events_tx.clone()
    }

    pub fn add_spatial(&self, entry: SpatialEntry) {
        let mut state = self.state.lock().unwrap();
        if state.spatial.iter().any(|e| e.id == entry.id) {
            log::warn!("spatial sound {} already registered, ignoring", entry.id);
            return;
        }
        state.spatial.push(entry);
    }

    pub fn remove_spatial(&self, id: SourceId) {
        let mut state = self.state.lock().unwrap();
        let before = state.spatial.len();
        state.spatial.retain(|e| e.id != id);
        if state.spatial.len() == before {
            log::warn!("spatial sound {} not registered, ignoring remove", id);
        }
    }

    pub fn add_stereo(&self, entry: StereoEntry) {
        let mut state = self.state.lock().unwrap();
        if state.stereo.iter().any(|e| e.id == entry.id) {
            log::warn!("stereo sound {} already registered, ignoring", entry.id);
            return;
        }
        state.stereo.push(entry);
    }

    pub fn remove_stereo(&self, id: SourceId) {
        let mut state = self.state.lock().unwrap();
        let before = state.stereo.len();
        state.stereo.retain(|e| e.id != id);
        if state.stereo.len() == before {
            log::warn!("stereo sound {} not registered, ignoring remove", id);
        }
    }

    pub fn with_spatial_entry(&self, id: SourceId, f: impl FnOnce(&mut SpatialEntry)) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.spatial.iter_mut().find(|e| e.id == id) {
            f(entry);
        }
    }

    pub fn read_spatial_entry<T>(&self, id: SourceId, f: impl FnOnce(&SpatialEntry) -> T) -> Option<T> {
        let state = self.state.lock().unwrap();
        state.spatial.iter().find(|e| e.id == id).map(f)
    }

    pub fn with_stereo_entry(&self, id: SourceId, f: impl FnOnce(&mut StereoEntry)) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.stereo.iter_mut().find(|e| e.id == id) {
            f(entry);
        }
    }

    pub fn read_stereo_entry<T>(&self, id: SourceId, f: impl FnOnce(&StereoEntry) -> T) -> Option<T> {
        let state = self.state.lock().unwrap();
        state.stereo.iter().find(|e| e.id == id).map(f)
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Copy everything a render pass needs, holding the lock only for the
    /// duration of the copy.
    pub fn snapshot_into(&self, snap: &mut RenderSnapshot) {
        let state = self.state.lock().unwrap();
        snap.master_volume = state.master_volume;
        snap.output_mode = state.output_mode;
        snap.room_effects = state.room_effects;
        snap.listener = state.listener;
        snap.spatial.clear();
        snap.spatial.extend(state.spatial.iter().cloned());
        snap.stereo.clear();
        snap.stereo.extend(state.stereo.iter().cloned());
    }
}

/// A consistent copy of the shared state, taken once per buffer period.
///
/// Stale by at most one buffer period relative to the latest client-side
/// mutation; the expensive render step runs entirely against this copy with
/// the engine mutex released.
pub struct RenderSnapshot {
    pub(crate) master_volume: f32,
    pub(crate) output_mode: OutputMode,
    pub(crate) room_effects: bool,
    pub(crate) listener: Pose,
    pub(crate) spatial: Vec<SpatialEntry>,
    pub(crate) stereo: Vec<StereoEntry>,
}

impl RenderSnapshot {
    pub fn empty() -> Self {
        Self {
            master_volume: 1.0,
            output_mode: OutputMode::Normal,
            room_effects: true,
            listener: Pose::identity(),
            spatial: Vec::new(),
            stereo: Vec::new(),
        }
    }
}

/// Spatial audio mixing engine.
///
/// One engine instance drives one audio thread and one output stream at a
/// time. Sounds are created against the engine (see
/// [`SpatialSound`](crate::SpatialSound) and
/// [`StereoSound`](crate::StereoSound)); configuration setters take effect on
/// the next buffer period, never mid-render.
pub struct Engine {
    desc: EngineDesc,
    shared: Arc<EngineShared>,
    driver: Option<OutputStreamDriver>,
    events_rx: Receiver<EngineEvent>,
}

impl Engine {
    pub fn new(desc: EngineDesc) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(EngineShared {
            state: Mutex::new(EngineState {
                master_volume: 1.0,
                output_mode: OutputMode::Normal,
                room_effects: true,
                listener: Pose::identity(),
                spatial: Vec::new(),
                stereo: Vec::new(),
            }),
            next_id: AtomicU64::new(0),
            events_tx,
        });
        Self {
            desc,
            shared,
            driver: None,
            events_rx,
        }
    }

    pub fn desc(&self) -> &EngineDesc {
        &self.desc
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    /// Negotiate the output device and format, build the spatial renderer,
    /// and spawn the audio thread.
    ///
    /// Device, format, and renderer-init failures surface here synchronously.
    /// Starting a started engine is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.driver.is_some() {
            return Ok(());
        }
        let negotiated = crate::device::negotiate(&self.desc)?;
        log::info!(
            "starting engine: device \"{}\", {} Hz",
            negotiated.device_name,
            self.desc.sample_rate
        );
        let renderer = SteamRenderer::new(self.desc.sample_rate)?;
        let driver = OutputStreamDriver::start(
            self.desc.clone(),
            Arc::clone(&self.shared),
            Box::new(renderer),
            negotiated,
        )?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Signal the audio thread to exit and join it. Idempotent: stopping a
    /// stopped engine is a no-op.
    ///
    /// The join happens before this returns, so no render pass can observe
    /// the engine (or its sources) after `stop` completes.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(mut driver) = self.driver.take() {
            driver.stop()?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_some()
    }

    /// Master volume as linear gain, applied as the final stage of every
    /// render pass.
    pub fn set_master_volume(&self, volume: f32) {
        self.shared.with_state(|s| s.master_volume = volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.with_state(|s| s.master_volume)
    }

    /// Takes effect on the next buffer period; no buffer is decoded with a
    /// mismatched mode.
    pub fn set_output_mode(&self, mode: OutputMode) {
        self.shared.with_state(|s| s.output_mode = mode);
    }

    pub fn output_mode(&self) -> OutputMode {
        self.shared.with_state(|s| s.output_mode)
    }

    pub fn set_room_effects_enabled(&self, enabled: bool) {
        self.shared.with_state(|s| s.room_effects = enabled);
    }

    pub fn room_effects_enabled(&self) -> bool {
        self.shared.with_state(|s| s.room_effects)
    }

    pub fn set_listener_pose(&self, pose: Pose) {
        self.shared.with_state(|s| s.listener = pose);
    }

    pub fn listener_pose(&self) -> Pose {
        self.shared.with_state(|s| s.listener)
    }

    pub fn spatial_sound_count(&self) -> usize {
        self.shared.with_state(|s| s.spatial.len())
    }

    pub fn stereo_sound_count(&self) -> usize {
        self.shared.with_state(|s| s.stereo.len())
    }

    /// Drain pending events from the audio thread.
    pub fn poll_events(&self) -> Vec<EngineEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Copy the current shared state into `snap`.
    ///
    /// This is the per-period snapshot step used by the audio thread; it is
    /// public so a render pass can be driven manually against a mock
    /// renderer.
    pub fn snapshot_into(&self, snap: &mut RenderSnapshot) {
        self.shared.snapshot_into(snap);
    }

    pub(crate) fn shared(&self) -> Arc<EngineShared> {
        Arc::clone(&self.shared)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("engine teardown failed: {e}");
        }
    }
}
