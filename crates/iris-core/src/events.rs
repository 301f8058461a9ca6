//! Discrete domain events.
//!
//! Everything downstream of ingestion (tracker rules, narration, speech
//! arbitration) consumes these, whether the occurrence was derived from a
//! snapshot diff, pushed by the stream feed, or synthesized by the
//! orchestrator's session ticker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identity of one delivered event. The tracker uses it for
/// at-most-once application when a producer retries delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Process-wide allocator of [`EventId`]s. Cheap to clone; every producer
/// (differ, feed ingestion, session ticker) draws from the same sequence.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen(Arc<AtomicU64>);

impl EventIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> EventId {
        EventId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// One discrete occurrence with identity and a wall timestamp.
///
/// For derived events the timestamp comes from the snapshot pair, never from
/// the clock at derivation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(id: EventId, timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            id,
            timestamp,
            kind,
        }
    }
}

/// Event payloads. Game-derived variants come out of the state differ;
/// donation/chat variants arrive from the stream feed; `SessionTick` is
/// synthesized so duration achievements stay in the data-driven rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RoundStart {
        round: u32,
        eco: bool,
    },
    Kill {
        round_kills: u32,
        streak: u32,
        headshot: bool,
        weapon: String,
    },
    Death {
        total_deaths: u32,
    },
    LowHealth {
        health: u32,
    },
    HeavyDamage {
        damage: u32,
    },
    BombPlanted {
        round: u32,
    },
    BombDefused {
        round: u32,
        ninja: bool,
    },
    BombExploded {
        round: u32,
    },
    RoundEnd {
        round: u32,
        won: bool,
        round_kills: u32,
        eco: bool,
    },
    Clutch {
        opponents: u32,
    },
    Ace {
        round_kills: u32,
    },
    Mvp {
        total: u32,
    },
    MatchEnd {
        won: bool,
        kills: u32,
        deaths: u32,
    },
    MapChange {
        map: String,
    },
    Donation {
        amount: f64,
        currency: String,
        from: String,
    },
    Subscription {
        from: String,
    },
    Raid {
        viewers: u32,
        from: String,
    },
    ChatMessage {
        from: String,
        text: String,
    },
    SessionTick {
        minutes: u32,
    },
}

impl EventKind {
    /// Stable category label used for cooldown keys, dedup keys and logs.
    pub fn category(&self) -> &'static str {
        match self {
            EventKind::RoundStart { .. } => "round_start",
            EventKind::Kill { .. } => "kill",
            EventKind::Death { .. } => "death",
            EventKind::LowHealth { .. } => "low_health",
            EventKind::HeavyDamage { .. } => "heavy_damage",
            EventKind::BombPlanted { .. } => "bomb_planted",
            EventKind::BombDefused { .. } => "bomb_defused",
            EventKind::BombExploded { .. } => "bomb_exploded",
            EventKind::RoundEnd { .. } => "round_end",
            EventKind::Clutch { .. } => "clutch",
            EventKind::Ace { .. } => "ace",
            EventKind::Mvp { .. } => "mvp",
            EventKind::MatchEnd { .. } => "match_end",
            EventKind::MapChange { .. } => "map_change",
            EventKind::Donation { .. } => "donation",
            EventKind::Subscription { .. } => "subscription",
            EventKind::Raid { .. } => "raid",
            EventKind::ChatMessage { .. } => "chat_message",
            EventKind::SessionTick { .. } => "session_tick",
        }
    }
}
