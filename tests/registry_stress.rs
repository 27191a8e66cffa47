//! Concurrency stress: client threads churn the source registry while a
//! render loop runs against snapshots. The strict renderer panics the test
//! if the render pass ever touches a handle that was already destroyed.

use soundfield::{
    AmbisonicBuffer, AudioData, DistanceModel, Engine, EngineDesc, LoopMode, OutputMode, Pose,
    RenderPass, RenderSnapshot, RendererSourceId, Result, SoundfieldError, SpatialParams,
    SpatialRenderer, SpatialSound, StereoSound, Vec3, BUFFER_FRAMES,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Renderer that validates the handle discipline of the render pass: every
/// processed handle must have been created and not yet destroyed.
struct StrictRenderer {
    next: u64,
    live: HashSet<RendererSourceId>,
}

impl StrictRenderer {
    fn new() -> Self {
        Self {
            next: 0,
            live: HashSet::new(),
        }
    }
}

impl SpatialRenderer for StrictRenderer {
    fn create_source(&mut self) -> Result<RendererSourceId> {
        let id = RendererSourceId(self.next);
        self.next += 1;
        self.live.insert(id);
        Ok(id)
    }

    fn destroy_source(&mut self, id: RendererSourceId) {
        assert!(self.live.remove(&id), "destroyed unknown handle {id}");
    }

    fn set_source_params(&mut self, id: RendererSourceId, _params: &SpatialParams) {
        assert!(self.live.contains(&id), "params pushed for dead handle {id}");
    }

    fn set_listener(&mut self, _pose: Pose) {}
    fn set_room_effects(&mut self, _enabled: bool) {}
    fn set_output_mode(&mut self, _mode: OutputMode) {}

    fn process(
        &mut self,
        inputs: &[(RendererSourceId, &[f32])],
        bus: &mut AmbisonicBuffer,
    ) -> Result<()> {
        for (id, samples) in inputs {
            assert!(self.live.contains(id), "rendered dead handle {id}");
            assert_eq!(samples.len(), BUFFER_FRAMES);
            let w = bus.channel_mut(0);
            for (dst, src) in w.iter_mut().zip(samples.iter()) {
                *dst += src;
            }
        }
        Ok(())
    }

    fn decode(&mut self, bus: &AmbisonicBuffer, out: &mut [f32]) -> Result<()> {
        let w = bus.channel(0);
        for (frame, sample) in w.iter().enumerate() {
            out[frame * 2] = *sample;
            out[frame * 2 + 1] = *sample;
        }
        Ok(())
    }
}

fn spawn_render_loop(
    engine: Arc<Engine>,
    done: Arc<AtomicBool>,
) -> std::thread::JoinHandle<std::result::Result<usize, SoundfieldError>> {
    std::thread::spawn(move || {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut pass = RenderPass::new(Box::new(StrictRenderer::new()), tx);
        let mut snap = RenderSnapshot::empty();
        let mut out = vec![0.0f32; BUFFER_FRAMES * 2];
        let mut periods = 0usize;
        while !done.load(Ordering::Acquire) {
            engine.snapshot_into(&mut snap);
            pass.render(&snap, &mut out);
            assert!(out.iter().all(|s| s.is_finite()));
            periods += 1;
        }
        Ok(periods)
    })
}

#[test]
fn concurrent_registry_churn_never_dangles() {
    let _ = env_logger::builder().is_test(true).try_init();

    let engine = Arc::new(Engine::new(EngineDesc::default()));
    let done = Arc::new(AtomicBool::new(false));
    let render = spawn_render_loop(Arc::clone(&engine), Arc::clone(&done));

    let mut clients = Vec::new();
    for worker in 0..4 {
        let engine = Arc::clone(&engine);
        clients.push(std::thread::spawn(move || {
            for round in 0..200 {
                let audio = AudioData::from_mono(vec![0.1; BUFFER_FRAMES], 44100);
                let sound = SpatialSound::new(&engine, audio);
                sound.set_loop_mode(LoopMode::Infinite);
                sound.set_position(Vec3::new(worker as f32, 0.0, -(round as f32 % 7.0) - 1.0));
                sound.set_gain(0.5);
                sound.set_distance_model(DistanceModel::None);
                if round % 3 == 0 {
                    let stereo_audio =
                        AudioData::from_stereo(vec![0.05; BUFFER_FRAMES * 2], 44100).unwrap();
                    let stereo = StereoSound::new(&engine, stereo_audio);
                    stereo.set_gain(0.2);
                    drop(stereo);
                }
                std::thread::yield_now();
                drop(sound); // deregisters before destruction completes
            }
        }));
    }

    for client in clients {
        client.join().expect("client thread panicked");
    }
    done.store(true, Ordering::Release);
    let periods = render
        .join()
        .expect("render thread panicked")
        .expect("render loop failed");
    assert!(periods > 0);

    // All churn settled: registry is empty and a final render is silent.
    assert_eq!(engine.spatial_sound_count(), 0);
    assert_eq!(engine.stereo_sound_count(), 0);

    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut pass = RenderPass::new(Box::new(StrictRenderer::new()), tx);
    let mut snap = RenderSnapshot::empty();
    engine.snapshot_into(&mut snap);
    let mut out = vec![1.0f32; BUFFER_FRAMES * 2];
    pass.render(&snap, &mut out);
    assert!(out.iter().all(|s| *s == 0.0));
}
