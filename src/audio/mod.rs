// src/audio/mod.rs  —  AudioOutput trait + cpal backend
use anyhow::Result;

/// Platform-agnostic audio output interface
pub trait AudioOutput: Send {
    /// Play a pre-rendered sample buffer (blocking) — the path used by the
    /// offline synthesizer and the parallel mixer.
    fn play_samples(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;
    /// Start a continuous tone (for sidetone monitor)
    fn tone_on(&mut self)  -> Result<()>;
    /// Stop a continuous tone
    fn tone_off(&mut self) -> Result<()>;
    fn set_frequency(&mut self, hz: f32);
    fn set_volume(&mut self, vol: f32);
}

// ── cpal backend ─────────────────────────────────────────────────────────────
#[cfg(feature = "audio-cpal")]
mod cpal_backend;
#[cfg(feature = "audio-cpal")]
pub use cpal_backend::CpalAudio;

pub mod mixer;

#[cfg(feature = "audio-cpal")]
pub mod input;
#[cfg(feature = "audio-cpal")]
pub use input::{CpalAudioInput, InputRing};

/// Null backend (no sound — useful for testing / no-audio builds)
pub struct NullAudio;
impl AudioOutput for NullAudio {
    fn play_samples(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        let secs = samples.len() as f32 / sample_rate.max(1) as f32;
        std::thread::sleep(std::time::Duration::from_secs_f32(secs.max(0.0)));
        Ok(())
    }
    fn tone_on(&mut self)  -> Result<()> { Ok(()) }
    fn tone_off(&mut self) -> Result<()> { Ok(()) }
    fn set_frequency(&mut self, _hz: f32)  {}
    fn set_volume(&mut self,    _vol: f32) {}
}

/// Factory: returns the best available backend
pub fn create_audio(hz: f32, volume: f32) -> Box<dyn AudioOutput> {
    #[cfg(feature = "audio-cpal")]
    {
        match CpalAudio::new(hz, volume) {
            Ok(a)  => return Box::new(a),
            Err(e) => log::warn!("cpal init failed: {e}  →  using NullAudio"),
        }
    }
    Box::new(NullAudio)
}

/// Owns the live capture stream and exposes its ring for draining. Kept as a
/// named type (rather than returning `InputRing` alone) so the `Stream`
/// stays alive for as long as the runtime worker needs samples.
#[cfg(feature = "audio-cpal")]
pub struct CpalAudioInputHandle {
    ring: InputRing,
    _input: CpalAudioInput,
}

#[cfg(feature = "audio-cpal")]
impl CpalAudioInputHandle {
    pub fn ring(&self) -> InputRing { self.ring.clone() }
}

/// Open a live microphone capture stream. `device_name` selects a specific
/// input device (`None` uses the host default); `ring_capacity_secs` bounds
/// the capture ring so a stalled consumer loses at most that much audio
/// history.
#[cfg(feature = "audio-cpal")]
pub fn create_audio_input(device_name: Option<&str>, ring_capacity_secs: f32) -> anyhow::Result<CpalAudioInputHandle> {
    let input = CpalAudioInput::new(device_name, ring_capacity_secs)?;
    Ok(CpalAudioInputHandle { ring: input.ring(), _input: input })
}

#[cfg(not(feature = "audio-cpal"))]
pub fn create_audio_input(_device_name: Option<&str>, _ring_capacity_secs: f32) -> anyhow::Result<()> {
    anyhow::bail!("this build has no audio input support (feature \"audio-cpal\" disabled)")
}

/// List available input/output device names, for `--list-devices`.
pub fn list_devices() -> (Vec<String>, Vec<String>) {
    #[cfg(feature = "audio-cpal")]
    {
        use cpal::traits::{DeviceTrait, HostTrait};
        let host = cpal::default_host();
        let inputs = host
            .input_devices()
            .map(|it| it.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default();
        let outputs = host
            .output_devices()
            .map(|it| it.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default();
        (inputs, outputs)
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        (Vec::new(), Vec::new())
    }
}
