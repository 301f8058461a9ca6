//! Runtime configuration loaded from `.env`.
//!
//! Toggles for the stream co-host: ingest bind address, speech queue bound,
//! ambient comment cadence, clutch/ace thresholds. Change behavior without
//! code edits.

use serde::{Deserialize, Serialize};

/// Configuration loaded from environment.
///
/// | Env | Default | Description |
/// |-----|---------|--------------|
/// | IRIS_GSI_BIND | 127.0.0.1:3000 | Bind address for the game-state ingest listener. |
/// | IRIS_SPEECH_QUEUE_CAP | 8 | Max queued speech requests before lowest-priority drop. |
/// | IRIS_AMBIENT_INTERVAL_SECS | 120 | Cadence of ambient commentary / session ticks. |
/// | IRIS_VOLUME_STEP | 0.2 | Fixed step for "quieter"/"louder" voice commands. |
/// | IRIS_TEAM_SIZE | 5 | Full enemy team size; round kills at or above this is an ace. |
/// | IRIS_CHAT_REPLY_CHANCE | 0.2 | Probability of replying to a single chat message. |
/// | IRIS_PROGRESS_DB | iris_progress.sqlite3 | Path of the persisted achievement store. |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrisConfig {
    /// IRIS_GSI_BIND: address the snapshot/feed/utterance listener binds to.
    pub gsi_bind: String,
    /// IRIS_SPEECH_QUEUE_CAP: backpressure bound of the reaction arbiter queue.
    pub speech_queue_cap: usize,
    /// IRIS_AMBIENT_INTERVAL_SECS: seconds between ambient comment attempts.
    pub ambient_interval_secs: u64,
    /// IRIS_VOLUME_STEP: delta applied by relative volume commands (0.0-1.0).
    pub volume_step: f32,
    /// IRIS_TEAM_SIZE: opponents per round; used for ace detection.
    pub team_size: u32,
    /// IRIS_CHAT_REPLY_CHANCE: chance of narrating any one chat message (0.0-1.0).
    pub chat_reply_chance: f32,
    /// IRIS_PROGRESS_DB: SQLite file for achievement progress.
    pub progress_db: String,
}

impl Default for IrisConfig {
    fn default() -> Self {
        Self {
            gsi_bind: "127.0.0.1:3000".to_string(),
            speech_queue_cap: 8,
            ambient_interval_secs: 120,
            volume_step: 0.2,
            team_size: 5,
            chat_reply_chance: 0.2,
            progress_db: "iris_progress.sqlite3".to_string(),
        }
    }
}

impl IrisConfig {
    /// Load from environment. Unset or invalid => defaults (see struct field docs).
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            gsi_bind: env_string("IRIS_GSI_BIND", &d.gsi_bind),
            speech_queue_cap: env_usize("IRIS_SPEECH_QUEUE_CAP", d.speech_queue_cap).max(1),
            ambient_interval_secs: env_u64("IRIS_AMBIENT_INTERVAL_SECS", d.ambient_interval_secs)
                .max(5),
            volume_step: env_f32("IRIS_VOLUME_STEP", d.volume_step).clamp(0.05, 1.0),
            team_size: env_u32("IRIS_TEAM_SIZE", d.team_size).max(1),
            chat_reply_chance: env_f32("IRIS_CHAT_REPLY_CHANCE", d.chat_reply_chance)
                .clamp(0.0, 1.0),
            progress_db: env_string("IRIS_PROGRESS_DB", &d.progress_db),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
