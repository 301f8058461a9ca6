//! # Iris Voice — one mouth, many things to say
//!
//! Everything the co-host says goes through the [`arbiter`]: producers
//! submit prioritized [`SpeechRequest`]s and a single worker speaks them
//! one at a time through the TTS backend and the playback sink. The
//! command interpreter and mixer boundary cover the listening side.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ producers ──submit──▶ ┌────────────────┐                │
//! │  (events, chat,       │ Reaction       │──▶ TTS ──▶ 🔊  │
//! │   unlocks, voice)     │ Arbiter queue  │   (one worker) │
//! │                       └────────────────┘                │
//! │ transcripts ──▶ CommandInterpreter ──▶ Intent ──▶ mixer │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod arbiter;
pub mod commands;
pub mod error;
pub mod mixer;
pub mod output;
pub mod stt;
pub mod tts;

pub use arbiter::{Arbiter, ArbiterHandle, SpeechPriority, SpeechRequest};
pub use commands::{execute_intent, Command, CommandInterpreter, Intent, VolumeChange, WAKE_WORDS};
pub use error::{VoiceError, VoiceResult};
pub use mixer::{MixerBackend, MixerTarget, NullMixer};
pub use output::{AudioSink, SpeakerSink};
pub use stt::{CloudStt, PlaceholderStt, SttBackend};
pub use tts::{CloudTts, Emotion, PlaceholderTts, TtsBackend};
