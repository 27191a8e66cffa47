use crate::error::{Result, SoundfieldError};
use crate::renderer::RendererSourceId;
use audionimbus::{
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectSettings, AudioSettings, Context, Direct,
    DirectEffect, DirectEffectSettings, SimulationFlags, Simulator, Source, SourceSettings,
};
use std::collections::HashMap;

/// Per-source DSP state: the simulation source plus the direct and
/// ambisonics-encode effects.
pub(crate) struct SourceEffects {
    pub source: Source,
    pub direct_effect: DirectEffect,
    pub encode_effect: AmbisonicsEncodeEffect,
}

impl SourceEffects {
    pub fn new(
        context: &Context,
        simulator: &Simulator<Direct>,
        audio_settings: &AudioSettings,
    ) -> Result<Self> {
        let source = Source::try_new(
            simulator,
            &SourceSettings {
                flags: SimulationFlags::DIRECT,
            },
        )
        .map_err(|e| SoundfieldError::SourceAllocation(format!("simulation source: {e}")))?;

        // Mono input per source.
        let direct_effect = DirectEffect::try_new(
            context,
            audio_settings,
            &DirectEffectSettings { num_channels: 1 },
        )
        .map_err(|e| SoundfieldError::SourceAllocation(format!("direct effect: {e}")))?;

        let encode_effect = AmbisonicsEncodeEffect::try_new(
            context,
            audio_settings,
            &AmbisonicsEncodeEffectSettings { max_order: 2 },
        )
        .map_err(|e| SoundfieldError::SourceAllocation(format!("encode effect: {e}")))?;

        Ok(Self {
            source,
            direct_effect,
            encode_effect,
        })
    }
}

/// Effects for every live renderer source, keyed by handle.
pub(crate) struct SourceEffectsMap {
    effects: HashMap<RendererSourceId, SourceEffects>,
}

impl SourceEffectsMap {
    pub fn new() -> Self {
        Self {
            effects: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: RendererSourceId, effects: SourceEffects) {
        if self.effects.insert(id, effects).is_some() {
            log::warn!("effects for {id} already existed, replaced");
        }
    }

    pub fn remove(&mut self, id: RendererSourceId) {
        if self.effects.remove(&id).is_some() {
            log::debug!("released effects for {id}");
        }
    }

    pub fn get_mut(&mut self, id: RendererSourceId) -> Option<&mut SourceEffects> {
        self.effects.get_mut(&id)
    }
}
