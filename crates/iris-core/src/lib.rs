//! # Iris Core — stream co-host domain logic
//!
//! Turns raw game-state snapshots and stream feed events into discrete
//! domain events, cumulative achievement progress and narration text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Snapshot::parse ──▶ StateDiffer ──▶ Event ──┬─▶ Tracker     │
//! │        (normalize)       (diff)              │   (rules+db)  │
//! │                                              └─▶ Brain       │
//! │  feed / ticker ─────────────────▶ Event ─────┘   (LLM/canned)│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Speech scheduling and voice commands live in `iris-voice`; process
//! wiring lives in the gateway.

pub mod achievements;
pub mod brain;
pub mod config;
pub mod differ;
pub mod error;
pub mod events;
pub mod snapshot;
pub mod store;

pub use achievements::{default_rules, AchievementRule, AchievementTracker, RuleKind, Unlock};
pub use brain::{Brain, GameContext, LlmBridge};
pub use config::IrisConfig;
pub use differ::{DifferConfig, StateDiffer};
pub use error::{CoreError, CoreResult};
pub use events::{Event, EventId, EventIdGen, EventKind};
pub use snapshot::{AliveSnapshot, BombState, RoundPhase, Snapshot};
pub use store::{ProgressEntry, ProgressStore};
