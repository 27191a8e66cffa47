//! The per-buffer render pass.
//!
//! [`RenderPass`] owns everything that belongs exclusively to the audio
//! thread: the boxed renderer, per-source playback cursors, the renderer
//! handle map, and the reusable ambisonic bus. Each period it snapshots the
//! engine state under the lock, releases the lock, and renders against the
//! copy.

use crate::audio_data::{AudioData, LoopMode};
use crate::buffer::AmbisonicBuffer;
use crate::config::{BUFFER_FRAMES, OUTPUT_CHANNELS};
use crate::engine::RenderSnapshot;
use crate::events::EngineEvent;
use crate::renderer::{RendererSourceId, SpatialRenderer};
use crate::sound::SourceId;
use crossbeam_channel::Sender;
use std::collections::{HashMap, HashSet};

/// Samples in one interleaved output buffer.
pub const OUTPUT_SAMPLES: usize = BUFFER_FRAMES * OUTPUT_CHANNELS;

pub struct RenderPass {
    renderer: Box<dyn SpatialRenderer>,
    /// Renderer handles for currently registered spatial sources.
    handles: HashMap<SourceId, RendererSourceId>,
    /// Playback cursors, keyed by source id (spatial and stereo share the
    /// engine's id space).
    cursors: HashMap<SourceId, usize>,
    /// Sources whose renderer handle failed to allocate; skipped in the mix
    /// and logged once, not every buffer.
    failed: HashSet<SourceId>,
    /// Mono input staging for spatial sources, one `BUFFER_FRAMES` slot per
    /// source; grows to the high-water mark and is never shrunk.
    scratch: Vec<f32>,
    bus: AmbisonicBuffer,
    events: Sender<EngineEvent>,
}

impl RenderPass {
    pub fn new(renderer: Box<dyn SpatialRenderer>, events: Sender<EngineEvent>) -> Self {
        Self {
            renderer,
            handles: HashMap::new(),
            cursors: HashMap::new(),
            failed: HashSet::new(),
            scratch: Vec::new(),
            bus: AmbisonicBuffer::new(),
            events,
        }
    }

    /// Render one buffer period from `snap` into `out` (interleaved stereo,
    /// exactly [`OUTPUT_SAMPLES`] samples). A mis-sized `out` is rejected
    /// and left untouched.
    ///
    /// Zero active sources still produce a full-length silent buffer so the
    /// sink's clock never starves.
    pub fn render(&mut self, snap: &RenderSnapshot, out: &mut [f32]) {
        if out.len() != OUTPUT_SAMPLES {
            log::error!(
                "output buffer holds {} samples, expected {OUTPUT_SAMPLES}; skipping render",
                out.len()
            );
            return;
        }

        self.sync_sources(snap);

        self.renderer.set_room_effects(snap.room_effects);
        self.renderer.set_output_mode(snap.output_mode);
        self.renderer.set_listener(snap.listener);

        let needed = snap.spatial.len() * BUFFER_FRAMES;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }

        // Stage mono input for every spatial source that has a live handle,
        // pushing its current params to the renderer along the way.
        let mut staged: Vec<RendererSourceId> = Vec::with_capacity(snap.spatial.len());
        for entry in &snap.spatial {
            let Some(&handle) = self.handles.get(&entry.id) else {
                continue;
            };
            self.renderer.set_source_params(handle, &entry.params);
            let cursor = self.cursors.entry(entry.id).or_insert(0);
            let slot = staged.len();
            let dst = &mut self.scratch[slot * BUFFER_FRAMES..(slot + 1) * BUFFER_FRAMES];
            fill_mono(&entry.audio, cursor, entry.loop_mode, dst);
            staged.push(handle);
        }

        let inputs: Vec<(RendererSourceId, &[f32])> = staged
            .iter()
            .enumerate()
            .map(|(slot, &handle)| {
                (
                    handle,
                    &self.scratch[slot * BUFFER_FRAMES..(slot + 1) * BUFFER_FRAMES],
                )
            })
            .collect();

        self.bus.clear();
        if let Err(e) = self.renderer.process(&inputs, &mut self.bus) {
            log::error!("spatial render step failed: {e}");
            self.bus.clear();
        }

        out.fill(0.0);
        if let Err(e) = self.renderer.decode(&self.bus, out) {
            log::error!("ambisonic decode failed: {e}");
            out.fill(0.0);
        }

        // Stereo sources bypass 3D processing and mix straight into the
        // decoded output.
        for entry in &snap.stereo {
            let cursor = self.cursors.entry(entry.id).or_insert(0);
            mix_stereo(&entry.audio, cursor, entry.loop_mode, entry.gain, out);
        }

        // Master volume is the final linear gain stage.
        for sample in out.iter_mut() {
            *sample *= snap.master_volume;
        }
    }

    /// Reconcile renderer handles with the snapshot's registry: release
    /// handles of removed sources, lazily allocate handles for new ones.
    fn sync_sources(&mut self, snap: &RenderSnapshot) {
        let spatial_live: HashSet<SourceId> = snap.spatial.iter().map(|e| e.id).collect();
        let stereo_live: HashSet<SourceId> = snap.stereo.iter().map(|e| e.id).collect();

        let removed: Vec<(SourceId, RendererSourceId)> = self
            .handles
            .iter()
            .filter(|(id, _)| !spatial_live.contains(id))
            .map(|(id, handle)| (*id, *handle))
            .collect();
        for (id, handle) in removed {
            self.renderer.destroy_source(handle);
            self.handles.remove(&id);
        }
        self.failed.retain(|id| spatial_live.contains(id));
        self.cursors
            .retain(|id, _| spatial_live.contains(id) || stereo_live.contains(id));

        for entry in &snap.spatial {
            if self.handles.contains_key(&entry.id) || self.failed.contains(&entry.id) {
                continue;
            }
            match self.renderer.create_source() {
                Ok(handle) => {
                    self.handles.insert(entry.id, handle);
                }
                Err(e) => {
                    log::warn!("skipping {} in the mix: {e}", entry.id);
                    let _ = self
                        .events
                        .send(EngineEvent::SourceAllocationFailed { source: entry.id });
                    self.failed.insert(entry.id);
                }
            }
        }
    }
}

/// Copy the next `dst.len()` frames of `audio` as mono, advancing `cursor`
/// and honoring the loop mode. Exhausted `Once` sources pad with silence.
fn fill_mono(audio: &AudioData, cursor: &mut usize, loop_mode: LoopMode, dst: &mut [f32]) {
    dst.fill(0.0);
    let frames = audio.frames();
    if frames == 0 {
        return;
    }
    let channels = audio.channels() as usize;
    let samples = audio.samples();
    for value in dst.iter_mut() {
        if *cursor >= frames {
            match loop_mode {
                LoopMode::Infinite => *cursor = 0,
                LoopMode::Once => break,
            }
        }
        let base = *cursor * channels;
        let frame = &samples[base..base + channels];
        *value = frame.iter().sum::<f32>() / channels as f32;
        *cursor += 1;
    }
}

/// Mix the next `BUFFER_FRAMES` frames of `audio` into the interleaved
/// stereo output, upmixing mono data by duplication.
fn mix_stereo(audio: &AudioData, cursor: &mut usize, loop_mode: LoopMode, gain: f32, out: &mut [f32]) {
    let frames = audio.frames();
    if frames == 0 {
        return;
    }
    let channels = audio.channels() as usize;
    let samples = audio.samples();
    for frame_idx in 0..BUFFER_FRAMES {
        if *cursor >= frames {
            match loop_mode {
                LoopMode::Infinite => *cursor = 0,
                LoopMode::Once => break,
            }
        }
        let base = *cursor * channels;
        let (left, right) = if channels >= 2 {
            (samples[base], samples[base + 1])
        } else {
            (samples[base], samples[base])
        };
        out[frame_idx * 2] += left * gain;
        out[frame_idx * 2 + 1] += right * gain;
        *cursor += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockRenderer;
    use super::*;
    use crate::audio_data::AudioData;
    use crate::config::{EngineDesc, OutputMode};
    use crate::engine::{Engine, RenderSnapshot};
    use crate::math::Vec3;
    use crate::sound::{SpatialSound, StereoSound};

    fn render_once(engine: &Engine, pass: &mut RenderPass) -> Vec<f32> {
        let mut snap = RenderSnapshot::empty();
        engine.snapshot_into(&mut snap);
        let mut out = vec![0.0f32; OUTPUT_SAMPLES];
        pass.render(&snap, &mut out);
        out
    }

    fn new_pass() -> (RenderPass, crossbeam_channel::Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (RenderPass::new(Box::new(MockRenderer::new()), tx), rx)
    }

    /// A 128-frame repeating pattern, so every rendered period is identical.
    fn looping_pattern(value: f32) -> std::sync::Arc<AudioData> {
        AudioData::from_mono(vec![value; BUFFER_FRAMES], 44100)
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_zero_sources_yield_full_silent_buffer() {
        let engine = Engine::new(EngineDesc::default());
        let (mut pass, _rx) = new_pass();
        let out = render_once(&engine, &mut pass);
        assert_eq!(out.len(), OUTPUT_SAMPLES);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_golden_gain_chain_at_one_meter() {
        let engine = Engine::new(EngineDesc::default());
        engine.set_master_volume(0.5);
        let sound = SpatialSound::new(&engine, looping_pattern(0.8));
        sound.set_position(Vec3::new(0.0, 0.0, -1.0)); // 1 m dead ahead
        sound.set_gain(1.0);
        sound.set_loop_mode(crate::audio_data::LoopMode::Infinite);

        let (mut pass, _rx) = new_pass();
        let out = render_once(&engine, &mut pass);

        // Mock attenuation at 1 m is 1.0, so the chain reduces to
        // source * gain * master volume.
        let expected = 0.8 * 0.5;
        assert!((rms(&out) - expected).abs() < 1e-6);
        assert!((out[0] - expected).abs() < 1e-6);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn test_same_snapshot_renders_identically() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, looping_pattern(0.3));
        sound.set_loop_mode(crate::audio_data::LoopMode::Infinite);
        sound.set_position(Vec3::new(0.0, 0.0, -2.0));

        let (mut pass, _rx) = new_pass();
        let first = render_once(&engine, &mut pass);
        let second = render_once(&engine, &mut pass);
        assert_eq!(first, second);
    }

    #[test]
    fn test_register_then_unregister_leaves_mix_untouched() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, looping_pattern(0.9));
        drop(sound); // removed before any render pass

        let (mut pass, _rx) = new_pass();
        let with_churn = render_once(&engine, &mut pass);

        let clean_engine = Engine::new(EngineDesc::default());
        let (mut clean_pass, _rx2) = new_pass();
        let clean = render_once(&clean_engine, &mut clean_pass);

        assert_eq!(with_churn, clean);
    }

    #[test]
    fn test_mode_switch_applies_on_next_buffer() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, looping_pattern(0.8));
        sound.set_loop_mode(crate::audio_data::LoopMode::Infinite);

        let (mut pass, _rx) = new_pass();
        let normal = render_once(&engine, &mut pass);
        assert!((normal[0] - 0.8).abs() < 1e-6);

        engine.set_output_mode(OutputMode::Binaural);
        let binaural = render_once(&engine, &mut pass);
        assert!((binaural[0] - 0.4).abs() < 1e-6);
        // Uniform across the whole buffer: no mid-buffer decoder change.
        assert!(binaural.iter().all(|s| (*s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_failed_allocation_is_skipped_and_reported_once() {
        let engine = Engine::new(EngineDesc::default());
        let _sound = SpatialSound::new(&engine, looping_pattern(0.8));

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut renderer = MockRenderer::new();
        renderer.fail_allocation = true;
        let mut pass = RenderPass::new(Box::new(renderer), tx);

        let first = render_once(&engine, &mut pass);
        let second = render_once(&engine, &mut pass);
        assert!(first.iter().all(|s| *s == 0.0));
        assert!(second.iter().all(|s| *s == 0.0));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1, "allocation failure reported once, not per buffer");
        assert!(matches!(events[0], EngineEvent::SourceAllocationFailed { .. }));
    }

    #[test]
    fn test_stereo_bypasses_spatialization() {
        let engine = Engine::new(EngineDesc::default());
        // Left at 0.6, right at 0.2 for every frame.
        let mut samples = Vec::with_capacity(BUFFER_FRAMES * 2);
        for _ in 0..BUFFER_FRAMES {
            samples.push(0.6);
            samples.push(0.2);
        }
        let audio = AudioData::from_stereo(samples, 44100).unwrap();
        let sound = StereoSound::new(&engine, audio);
        sound.set_loop_mode(crate::audio_data::LoopMode::Infinite);
        sound.set_gain(0.5);

        let (mut pass, _rx) = new_pass();
        let out = render_once(&engine, &mut pass);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_mis_sized_output_is_left_untouched() {
        let engine = Engine::new(EngineDesc::default());
        let sound = SpatialSound::new(&engine, looping_pattern(0.5));
        sound.set_loop_mode(crate::audio_data::LoopMode::Infinite);

        let (mut pass, _rx) = new_pass();
        let mut snap = RenderSnapshot::empty();
        engine.snapshot_into(&mut snap);

        let mut short = vec![0.25f32; OUTPUT_SAMPLES - 2];
        pass.render(&snap, &mut short);
        assert!(short.iter().all(|s| *s == 0.25));

        let mut long = vec![0.25f32; OUTPUT_SAMPLES + 2];
        pass.render(&snap, &mut long);
        assert!(long.iter().all(|s| *s == 0.25));
    }

    #[test]
    fn test_once_source_pads_with_silence_after_end() {
        let engine = Engine::new(EngineDesc::default());
        // Half a period of samples, played once.
        let sound = SpatialSound::new(&engine, AudioData::from_mono(vec![0.5; 64], 44100));
        sound.set_loop_mode(crate::audio_data::LoopMode::Once);

        let (mut pass, _rx) = new_pass();
        let out = render_once(&engine, &mut pass);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out[64 * 2..].iter().all(|s| *s == 0.0));

        let next = render_once(&engine, &mut pass);
        assert!(next.iter().all(|s| *s == 0.0));
    }
}
