use crate::error::{Result, SoundfieldError};
use audionimbus::{AudioSettings, Context, Hrtf, HrtfSettings, VolumeNormalization};

/// Load Steam Audio's built-in default HRTF.
pub fn create_default_hrtf(context: &Context, audio_settings: &AudioSettings) -> Result<Hrtf> {
    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information: None,
            ..Default::default()
        },
    )
    .map_err(|e| SoundfieldError::RendererInit(format!("failed to create HRTF: {e}")))?;

    log::info!("created default HRTF");
    Ok(hrtf)
}
