use crate::buffer::{AmbisonicBuffer, AMBISONIC_CHANNELS};
use crate::config::{DistanceModel, OutputMode, BUFFER_FRAMES, OUTPUT_CHANNELS};
use crate::error::{Result, SoundfieldError};
use crate::math::{Pose, Vec3};
use crate::renderer::{RendererSourceId, SpatialParams, SpatialRenderer};
use crate::spatial::effects::{SourceEffects, SourceEffectsMap};
use crate::spatial::hrtf;
use audionimbus::{
    AirAbsorptionModel, AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams,
    AmbisonicsDecodeEffectSettings, AmbisonicsEncodeEffectParams, AudioBufferSettings,
    AudioSettings, Context, CoordinateSystem, Direct, DirectEffectParams,
    DirectSimulationParameters, DirectSimulationSettings, Direction, DistanceAttenuationModel,
    Equalizer, Hrtf, Point, Scene, SceneParams, SceneSettings, SimulationFlags, SimulationInputs,
    SimulationSharedInputs, Simulator, SpeakerLayout, Vector3,
    audio_buffer::AudioBuffer as SteamAudioBuffer, geometry,
};
use std::collections::HashMap;

/// Steam Audio implementation of [`SpatialRenderer`].
///
/// Positions and distances are in meters. The direct path (distance
/// attenuation, air absorption) is simulated per buffer period; sources are
/// encoded into an order-2 ambisonic bus and decoded to stereo, with HRTF
/// applied when the output mode is binaural.
pub struct SteamRenderer {
    context: Context,
    simulator: Simulator<Direct>,
    #[allow(dead_code)] // kept alive for the simulator's lifetime
    scene: Scene,
    hrtf: Hrtf,
    decode_effect: AmbisonicsDecodeEffect,

    effects: SourceEffectsMap,
    params: HashMap<RendererSourceId, SpatialParams>,
    next_handle: u64,

    sample_rate: u32,
    room_effects: bool,
    output_mode: OutputMode,
    listener: Pose,

    // Reused every period; nothing below allocates after construction.
    input_buf: Vec<f32>,
    direct_buf: Vec<f32>,
    encode_buf: Vec<f32>,
    decode_buf: Vec<f32>,
}

impl SteamRenderer {
    pub fn new(sample_rate: u32) -> Result<Self> {
        log::info!(
            "initializing Steam Audio renderer ({sample_rate} Hz, {BUFFER_FRAMES} frames/period)"
        );

        let context = Context::try_new(&audionimbus::ContextSettings::default())
            .map_err(|e| SoundfieldError::RendererInit(format!("context: {e}")))?;

        let audio_settings = AudioSettings {
            sampling_rate: sample_rate,
            frame_size: BUFFER_FRAMES as u32,
        };

        let hrtf = hrtf::create_default_hrtf(&context, &audio_settings)?;

        let decode_effect = AmbisonicsDecodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: 2,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| SoundfieldError::RendererInit(format!("decode effect: {e}")))?;

        let mut simulator =
            Simulator::builder(SceneParams::Default, sample_rate, BUFFER_FRAMES as u32)
                .with_direct(DirectSimulationSettings {
                    max_num_occlusion_samples: 32,
                })
                .try_build(&context)
                .map_err(|e| SoundfieldError::RendererInit(format!("simulator: {e}")))?;

        let scene = Scene::try_new(&context, &SceneSettings::default())
            .map_err(|e| SoundfieldError::RendererInit(format!("scene: {e}")))?;
        simulator.set_scene(&scene);
        simulator.commit();

        Ok(Self {
            context,
            simulator,
            scene,
            hrtf,
            decode_effect,
            effects: SourceEffectsMap::new(),
            params: HashMap::new(),
            next_handle: 0,
            sample_rate,
            room_effects: true,
            output_mode: OutputMode::Normal,
            listener: Pose::identity(),
            input_buf: vec![0.0; BUFFER_FRAMES],
            direct_buf: vec![0.0; BUFFER_FRAMES],
            encode_buf: vec![0.0; AMBISONIC_CHANNELS * BUFFER_FRAMES],
            decode_buf: vec![0.0; OUTPUT_CHANNELS * BUFFER_FRAMES],
        })
    }

    fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            sampling_rate: self.sample_rate,
            frame_size: BUFFER_FRAMES as u32,
        }
    }

    /// Push per-source and listener state into the simulator and run the
    /// direct simulation for this period.
    fn simulate(&mut self, inputs: &[(RendererSourceId, &[f32])]) {
        for (id, _) in inputs {
            let Some(params) = self.params.get(id).copied() else {
                continue;
            };
            let simulation_inputs = SimulationInputs {
                source: source_coordinates(&params),
                direct_simulation: Some(DirectSimulationParameters {
                    distance_attenuation: Some(DistanceAttenuationModel::Default),
                    air_absorption: if self.room_effects {
                        Some(AirAbsorptionModel::Default)
                    } else {
                        None
                    },
                    directivity: None,
                    occlusion: None,
                }),
                reflections_simulation: None,
                pathing_simulation: None,
            };
            if let Some(effects) = self.effects.get_mut(*id) {
                effects
                    .source
                    .set_inputs(SimulationFlags::DIRECT, simulation_inputs);
            }
        }

        self.simulator.commit();

        let shared_inputs = SimulationSharedInputs {
            listener: geometry::CoordinateSystem {
                origin: point(self.listener.position),
                right: vector(self.listener.right()),
                up: vector(self.listener.up()),
                ahead: vector(self.listener.forward()),
            },
            num_rays: 1024,
            num_bounces: 10,
            duration: 3.0,
            order: 2,
            irradiance_min_distance: 1.0,
            pathing_visualization_callback: None,
        };
        self.simulator
            .set_shared_inputs(SimulationFlags::DIRECT, &shared_inputs);
        self.simulator.run_direct();
    }

    /// Direction from the listener to the source in the listener's frame.
    fn listener_relative_direction(&self, source_position: Vec3) -> Vec3 {
        let to_source = source_position - self.listener.position;
        if to_source.length_squared() < 1e-12 {
            // Co-located with the listener; encode straight ahead.
            return Vec3::new(0.0, 0.0, 1.0);
        }
        let direction = to_source.normalize();
        Vec3::new(
            direction.dot(self.listener.right()),
            direction.dot(self.listener.up()),
            direction.dot(self.listener.forward()),
        )
    }

    fn render_source(
        &mut self,
        id: RendererSourceId,
        samples: &[f32],
        bus: &mut AmbisonicBuffer,
    ) -> Result<()> {
        let Some(params) = self.params.get(&id).copied() else {
            return Ok(());
        };
        let direction = self.listener_relative_direction(params.position);
        let room_effects = self.room_effects;
        // The simulated value backs the default inverse curve; the other
        // distance models are computed here instead.
        let model_attenuation = match params.distance_model {
            DistanceModel::Inverse => None,
            DistanceModel::Linear { max_distance } => Some(if max_distance <= 0.0 {
                0.0
            } else {
                let distance = params.position.distance(self.listener.position);
                (1.0 - distance / max_distance).clamp(0.0, 1.0)
            }),
            DistanceModel::None => Some(1.0),
        };

        for (dst, src) in self.input_buf.iter_mut().zip(samples.iter()) {
            *dst = src * params.gain;
        }
        if samples.len() < BUFFER_FRAMES {
            self.input_buf[samples.len()..].fill(0.0);
        }

        let Some(effects) = self.effects.get_mut(id) else {
            return Ok(());
        };

        let outputs = effects.source.get_outputs(SimulationFlags::DIRECT);
        let direct_outputs = outputs.direct();
        let distance_attenuation = model_attenuation
            .unwrap_or_else(|| direct_outputs.distance_attenuation.unwrap_or(1.0));
        let air_absorption = if room_effects {
            direct_outputs
                .air_absorption
                .as_ref()
                .map(|eq| Equalizer([eq[0], eq[1], eq[2]]))
                .unwrap_or(Equalizer([1.0, 1.0, 1.0]))
        } else {
            Equalizer([1.0, 1.0, 1.0])
        };

        let direct_effect_params = DirectEffectParams {
            distance_attenuation: Some(distance_attenuation),
            air_absorption: Some(air_absorption),
            directivity: None,
            occlusion: None,
            transmission: None,
        };

        let input_buf = SteamAudioBuffer::try_with_data_and_settings(
            &self.input_buf,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("input buffer: {e}")))?;
        let direct_buf = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.direct_buf,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("direct buffer: {e}")))?;

        effects
            .direct_effect
            .apply(&direct_effect_params, &input_buf, &direct_buf);

        let encode_params = AmbisonicsEncodeEffectParams {
            direction: Direction::new(direction.x, direction.y, direction.z),
            order: 2,
        };
        let encode_input = SteamAudioBuffer::try_with_data_and_settings(
            &self.direct_buf,
            AudioBufferSettings {
                num_channels: Some(1),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("encode input buffer: {e}")))?;
        let encode_output = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.encode_buf,
            AudioBufferSettings {
                num_channels: Some(AMBISONIC_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("encode output buffer: {e}")))?;

        effects
            .encode_effect
            .apply(&encode_params, &encode_input, &encode_output);

        for (dst, src) in bus.samples_mut().iter_mut().zip(self.encode_buf.iter()) {
            *dst += src;
        }

        Ok(())
    }
}

impl SpatialRenderer for SteamRenderer {
    fn create_source(&mut self) -> Result<RendererSourceId> {
        let audio_settings = self.audio_settings();
        let effects = SourceEffects::new(&self.context, &self.simulator, &audio_settings)?;
        self.simulator.add_source(&effects.source);
        self.simulator.commit();

        let id = RendererSourceId(self.next_handle);
        self.next_handle += 1;
        self.effects.insert(id, effects);
        self.params.insert(id, SpatialParams::default());
        log::debug!("allocated renderer source {id}");
        Ok(id)
    }

    fn destroy_source(&mut self, id: RendererSourceId) {
        self.effects.remove(id);
        self.params.remove(&id);
    }

    fn set_source_params(&mut self, id: RendererSourceId, params: &SpatialParams) {
        self.params.insert(id, *params);
    }

    fn set_listener(&mut self, pose: Pose) {
        self.listener = pose;
    }

    fn set_room_effects(&mut self, enabled: bool) {
        self.room_effects = enabled;
    }

    fn set_output_mode(&mut self, mode: OutputMode) {
        self.output_mode = mode;
    }

    fn process(
        &mut self,
        inputs: &[(RendererSourceId, &[f32])],
        bus: &mut AmbisonicBuffer,
    ) -> Result<()> {
        if inputs.is_empty() {
            return Ok(());
        }
        self.simulate(inputs);
        for (id, samples) in inputs {
            self.render_source(*id, samples, bus)?;
        }
        Ok(())
    }

    fn decode(&mut self, bus: &AmbisonicBuffer, out: &mut [f32]) -> Result<()> {
        let decode_params = AmbisonicsDecodeEffectParams {
            order: 2,
            hrtf: &self.hrtf,
            orientation: CoordinateSystem {
                ahead: Vector3::new(0.0, 0.0, -1.0),
                ..Default::default()
            },
            binaural: self.output_mode == OutputMode::Binaural,
        };

        let input_buf = SteamAudioBuffer::try_with_data_and_settings(
            bus.samples(),
            AudioBufferSettings {
                num_channels: Some(AMBISONIC_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("decode input buffer: {e}")))?;
        let output_buf = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.decode_buf,
            AudioBufferSettings {
                num_channels: Some(OUTPUT_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("decode output buffer: {e}")))?;

        self.decode_effect
            .apply(&decode_params, &input_buf, &output_buf);

        let decoded = SteamAudioBuffer::try_with_data_and_settings(
            &mut self.decode_buf,
            AudioBufferSettings {
                num_channels: Some(OUTPUT_CHANNELS as u32),
                ..Default::default()
            },
        )
        .map_err(|e| SoundfieldError::Engine(format!("decoded buffer: {e}")))?;
        decoded.interleave(&self.context, out);

        Ok(())
    }
}

fn point(v: Vec3) -> Point {
    Point::new(v.x, v.y, v.z)
}

fn vector(v: Vec3) -> Vector3 {
    Vector3::new(v.x, v.y, v.z)
}

fn source_coordinates(params: &SpatialParams) -> geometry::CoordinateSystem {
    let pose = Pose::new(params.position, params.orientation);
    geometry::CoordinateSystem {
        origin: point(pose.position),
        right: vector(pose.right()),
        up: vector(pose.up()),
        ahead: vector(pose.forward()),
    }
}
