//! Audio-mixer control boundary.
//!
//! The OS-level mixer is an external collaborator; implement `MixerBackend`
//! for the platform (per-application session volumes) and wire it into the
//! orchestrator. Failures become spoken feedback, never errors upward.

use crate::error::{VoiceError, VoiceResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::info;

/// What a volume command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerTarget {
    /// The system master channel.
    Master,
    /// A known application channel, by canonical name ("music", "discord", ...).
    App(String),
}

impl fmt::Display for MixerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixerTarget::Master => write!(f, "звук"),
            MixerTarget::App(name) => write!(f, "{name}"),
        }
    }
}

/// Mixer collaborator: absolute volume, mute, unmute per target.
pub trait MixerBackend: Send + Sync {
    /// Current level (0.0-1.0) of the target channel.
    fn volume(&self, target: &MixerTarget) -> VoiceResult<f32>;

    /// Set the target channel to an absolute level (0.0-1.0).
    fn set_volume(&self, target: &MixerTarget, level: f32) -> VoiceResult<()>;

    fn mute(&self, target: &MixerTarget) -> VoiceResult<()> {
        self.set_volume(target, 0.0)
    }

    fn unmute(&self, target: &MixerTarget) -> VoiceResult<()> {
        self.set_volume(target, 1.0)
    }
}

/// In-memory mixer used when no platform backend is wired (and in tests).
/// Remembers levels so relative commands behave sensibly.
#[derive(Debug, Default)]
pub struct NullMixer {
    levels: Mutex<HashMap<String, f32>>,
}

impl NullMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(target: &MixerTarget) -> String {
        match target {
            MixerTarget::Master => "__master__".to_string(),
            MixerTarget::App(name) => name.clone(),
        }
    }
}

impl MixerBackend for NullMixer {
    fn volume(&self, target: &MixerTarget) -> VoiceResult<f32> {
        let levels = self
            .levels
            .lock()
            .map_err(|_| VoiceError::Mixer("mixer state poisoned".into()))?;
        Ok(*levels.get(&Self::key(target)).unwrap_or(&1.0))
    }

    fn set_volume(&self, target: &MixerTarget, level: f32) -> VoiceResult<()> {
        let level = level.clamp(0.0, 1.0);
        let mut levels = self
            .levels
            .lock()
            .map_err(|_| VoiceError::Mixer("mixer state poisoned".into()))?;
        levels.insert(Self::key(target), level);
        info!(target: "iris::mixer", "volume of {} set to {}%", target, (level * 100.0) as u32);
        Ok(())
    }
}
