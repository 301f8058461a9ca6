//! Normalized game-state snapshots.
//!
//! The game client pushes "any shape" JSON documents at its own cadence.
//! Everything past this boundary works on the explicit [`Snapshot`] schema:
//! required sections are validated here, optional fields get explicit
//! defaults, and partial dynamic structures never travel downstream.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Round phase as reported by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Freezetime,
    Live,
    Over,
    #[serde(other)]
    #[default]
    Unknown,
}

/// Bomb lifecycle as reported by the game. States like "carried"/"planting"
/// collapse into `Idle`; only the three discrete transitions narrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BombState {
    Planted,
    Defused,
    Exploded,
    #[serde(other)]
    #[default]
    Idle,
}

/// The tracked (local) player at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerSnapshot {
    pub name: String,
    pub team: String,
    pub health: u32,
    pub armor: u32,
    pub helmet: bool,
    pub money: u32,
    pub round_kills: u32,
    pub round_killhs: u32,
    pub equip_value: u32,
    pub kills: u32,
    pub assists: u32,
    pub deaths: u32,
    pub mvps: u32,
    pub score: u32,
    /// Name of the currently active weapon, empty when unknown.
    pub weapon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoundSnapshot {
    pub phase: RoundPhase,
    pub bomb: BombState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapSnapshot {
    pub name: String,
    pub mode: String,
    pub phase: String,
    pub round: u32,
    pub ct_score: u32,
    pub t_score: u32,
}

/// Live head-count derived from the `allplayers` section, excluding the
/// tracked player. Absent when the game does not report other players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveSnapshot {
    pub teammates: u32,
    pub opponents: u32,
}

/// One normalized snapshot of observable game state. Immutable once built;
/// the differ retains at most the two most recent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub player: PlayerSnapshot,
    pub round: RoundSnapshot,
    pub map: MapSnapshot,
    pub alive: Option<AliveSnapshot>,
    /// Winning team of the round, set while `round.phase` is `Over`.
    pub win_team: String,
}

// ── Wire shape ──────────────────────────────────────────────────────────────
// Mirrors the game-state-integration payload. Every field is optional on the
// wire; normalization decides what is required.

#[derive(Debug, Deserialize, Default)]
struct RawDocument {
    #[serde(default)]
    provider: RawProvider,
    player: Option<RawPlayer>,
    #[serde(default)]
    round: RawRound,
    map: Option<RawMap>,
    #[serde(default)]
    allplayers: HashMap<String, RawOtherPlayer>,
}

#[derive(Debug, Deserialize, Default)]
struct RawProvider {
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Deserialize, Default)]
struct RawPlayer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    team: String,
    #[serde(default)]
    state: RawPlayerState,
    #[serde(default)]
    match_stats: RawMatchStats,
    #[serde(default)]
    weapons: HashMap<String, RawWeapon>,
}

#[derive(Debug, Deserialize)]
struct RawPlayerState {
    #[serde(default = "full_health")]
    health: u32,
    #[serde(default)]
    armor: u32,
    #[serde(default)]
    helmet: bool,
    #[serde(default)]
    money: u32,
    #[serde(default)]
    round_kills: u32,
    #[serde(default)]
    round_killhs: u32,
    #[serde(default)]
    equip_value: u32,
}

fn full_health() -> u32 {
    100
}

impl Default for RawPlayerState {
    fn default() -> Self {
        Self {
            health: 100,
            armor: 0,
            helmet: false,
            money: 0,
            round_kills: 0,
            round_killhs: 0,
            equip_value: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawMatchStats {
    #[serde(default)]
    kills: u32,
    #[serde(default)]
    assists: u32,
    #[serde(default)]
    deaths: u32,
    #[serde(default)]
    mvps: u32,
    #[serde(default)]
    score: u32,
}

#[derive(Debug, Deserialize, Default)]
struct RawWeapon {
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawRound {
    #[serde(default)]
    phase: RoundPhase,
    #[serde(default)]
    bomb: BombState,
    #[serde(default)]
    win_team: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawMap {
    #[serde(default)]
    name: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    phase: String,
    #[serde(default)]
    round: u32,
    #[serde(default)]
    team_ct: RawTeam,
    #[serde(default)]
    team_t: RawTeam,
}

#[derive(Debug, Deserialize, Default)]
struct RawTeam {
    #[serde(default)]
    score: u32,
}

#[derive(Debug, Deserialize, Default)]
struct RawOtherPlayer {
    #[serde(default)]
    team: String,
    #[serde(default)]
    state: RawOtherPlayerState,
}

#[derive(Debug, Deserialize, Default)]
struct RawOtherPlayerState {
    #[serde(default)]
    health: u32,
}

impl Snapshot {
    /// Normalize one pushed document. `player` and `map` sections are
    /// required; everything else defaults explicitly.
    pub fn parse(value: serde_json::Value) -> CoreResult<Self> {
        let raw: RawDocument = serde_json::from_value(value)
            .map_err(|e| CoreError::Snapshot(format!("malformed document: {e}")))?;

        let player = raw
            .player
            .ok_or_else(|| CoreError::Snapshot("missing required 'player' section".into()))?;
        let map = raw
            .map
            .ok_or_else(|| CoreError::Snapshot("missing required 'map' section".into()))?;

        let weapon = player
            .weapons
            .values()
            .find(|w| w.state == "active")
            .map(|w| w.name.clone())
            .unwrap_or_default();

        let alive = if raw.allplayers.is_empty() {
            None
        } else {
            let mut teammates = 0;
            let mut opponents = 0;
            for other in raw.allplayers.values() {
                if other.state.health == 0 {
                    continue;
                }
                if other.team.eq_ignore_ascii_case(&player.team) {
                    teammates += 1;
                } else {
                    opponents += 1;
                }
            }
            // The tracked player shows up in allplayers too; count others only.
            if player.state.health > 0 && teammates > 0 {
                teammates -= 1;
            }
            Some(AliveSnapshot {
                teammates,
                opponents,
            })
        };

        Ok(Self {
            timestamp: DateTime::from_timestamp(raw.provider.timestamp, 0).unwrap_or_default(),
            player: PlayerSnapshot {
                name: player.name,
                team: player.team,
                health: player.state.health,
                armor: player.state.armor,
                helmet: player.state.helmet,
                money: player.state.money,
                round_kills: player.state.round_kills,
                round_killhs: player.state.round_killhs,
                equip_value: player.state.equip_value,
                kills: player.match_stats.kills,
                assists: player.match_stats.assists,
                deaths: player.match_stats.deaths,
                mvps: player.match_stats.mvps,
                score: player.match_stats.score,
                weapon,
            },
            round: RoundSnapshot {
                phase: raw.round.phase,
                bomb: raw.round.bomb,
            },
            map: MapSnapshot {
                name: map.name,
                mode: map.mode,
                phase: map.phase,
                round: map.round,
                ct_score: map.team_ct.score,
                t_score: map.team_t.score,
            },
            alive,
            win_team: raw.round.win_team,
        })
    }
}
