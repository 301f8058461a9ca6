//! State differ: turns consecutive snapshots into discrete events.
//!
//! Derivation is deterministic — no clock reads, no randomness. Event
//! timestamps come from the snapshot pair, ids from the shared allocator.
//! Malformed or out-of-order input (round number decreasing without a map
//! change) resets the baseline instead of raising.

use crate::events::{Event, EventIdGen, EventKind};
use crate::snapshot::{BombState, RoundPhase, Snapshot};
use tracing::{debug, warn};

/// Thresholds for derivation. Defaults follow competitive 5v5 conventions.
#[derive(Debug, Clone)]
pub struct DifferConfig {
    /// Round kills at or above this is an ace.
    pub team_size: u32,
    /// Health at or below this after taking damage is a low-health event.
    pub low_health: u32,
    /// Single-diff damage at or above this is a heavy-damage event.
    pub heavy_damage: u32,
    /// Defusing at or below this health counts as a ninja defuse.
    pub ninja_health: u32,
    /// Round-start money below this marks the round as eco.
    pub eco_money: u32,
    /// Minimum live opponents for a clutch situation to arm.
    pub clutch_min_opponents: u32,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            team_size: 5,
            low_health: 25,
            heavy_damage: 50,
            ninja_health: 10,
            eco_money: 2000,
            clutch_min_opponents: 2,
        }
    }
}

/// Per-round bookkeeping, reset at every round start and baseline reset.
/// This is the "round-open state" retained apart from the last raw snapshot.
#[derive(Debug, Clone, Copy, Default)]
struct RoundContext {
    start_kills: u32,
    eco: bool,
    kill_streak: u32,
    /// Opponent count captured when the clutch situation armed.
    clutch: Option<u32>,
}

/// Compares consecutive normalized snapshots and emits discrete events.
/// Owns the two most recent snapshots; older ones are discarded.
pub struct StateDiffer {
    config: DifferConfig,
    ids: EventIdGen,
    previous: Option<Snapshot>,
    round: RoundContext,
}

impl StateDiffer {
    pub fn new(config: DifferConfig, ids: EventIdGen) -> Self {
        Self {
            config,
            ids,
            previous: None,
            round: RoundContext::default(),
        }
    }

    /// The most recent accepted snapshot (for health/context reporting).
    pub fn last(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    /// Ingest the next snapshot and derive events from the transition.
    ///
    /// First snapshot, a map change, or a round regression makes the new
    /// snapshot the baseline: no combat events are derived from comparing
    /// unrelated rounds.
    pub fn ingest(&mut self, snap: Snapshot) -> Vec<Event> {
        let mut events = Vec::new();

        let prev = match self.previous.take() {
            None => {
                self.reset_round(&snap);
                self.previous = Some(snap);
                return events;
            }
            Some(p) if p.map.name != snap.map.name => {
                debug!(target: "iris::differ", old_map = %p.map.name, new_map = %snap.map.name, "map changed, new baseline");
                self.push(&mut events, &snap, EventKind::MapChange {
                    map: snap.map.name.clone(),
                });
                self.reset_round(&snap);
                self.previous = Some(snap);
                return events;
            }
            Some(p) if snap.map.round < p.map.round => {
                warn!(
                    target: "iris::differ",
                    prev_round = p.map.round,
                    round = snap.map.round,
                    "round number regressed without a map change, new baseline"
                );
                self.reset_round(&snap);
                self.previous = Some(snap);
                return events;
            }
            Some(p) => p,
        };

        self.diff(&prev, &snap, &mut events);
        self.previous = Some(snap);
        events
    }

    fn diff(&mut self, prev: &Snapshot, snap: &Snapshot, events: &mut Vec<Event>) {
        // Combat counters first, in derivation order: kills, death, damage.
        let kill_delta = snap.player.kills.saturating_sub(prev.player.kills);
        if kill_delta > 0 {
            self.round.kill_streak += kill_delta;
            let headshot = snap.player.round_killhs > prev.player.round_killhs;
            self.push(events, snap, EventKind::Kill {
                round_kills: snap.player.round_kills,
                streak: self.round.kill_streak,
                headshot,
                weapon: snap.player.weapon.clone(),
            });
        }

        if snap.player.deaths > prev.player.deaths {
            self.round.kill_streak = 0;
            self.push(events, snap, EventKind::Death {
                total_deaths: snap.player.deaths,
            });
        }

        if snap.player.health < prev.player.health && snap.player.health > 0 {
            let damage = prev.player.health - snap.player.health;
            if snap.player.health <= self.config.low_health {
                self.push(events, snap, EventKind::LowHealth {
                    health: snap.player.health,
                });
            } else if damage >= self.config.heavy_damage {
                self.push(events, snap, EventKind::HeavyDamage { damage });
            }
        }

        // Round phase edges.
        if snap.round.phase == RoundPhase::Freezetime && prev.round.phase != RoundPhase::Freezetime
        {
            self.reset_round(snap);
            self.push(events, snap, EventKind::RoundStart {
                round: snap.map.round,
                eco: self.round.eco,
            });
        }

        if snap.round.phase == RoundPhase::Over && prev.round.phase != RoundPhase::Over {
            let round_kills = snap.player.kills.saturating_sub(self.round.start_kills);
            let won = !snap.win_team.is_empty()
                && snap.win_team.eq_ignore_ascii_case(&snap.player.team);
            if let Some(opponents) = self.round.clutch {
                if won && round_kills > 0 {
                    self.push(events, snap, EventKind::Clutch { opponents });
                }
            }
            if round_kills >= self.config.team_size {
                self.push(events, snap, EventKind::Ace { round_kills });
            }
            self.push(events, snap, EventKind::RoundEnd {
                round: snap.map.round,
                won,
                round_kills,
                eco: self.round.eco,
            });
            self.round.clutch = None;
        }

        // Bomb edges: each fires at most once per occurrence.
        if snap.round.bomb != prev.round.bomb {
            match snap.round.bomb {
                BombState::Planted => self.push(events, snap, EventKind::BombPlanted {
                    round: snap.map.round,
                }),
                BombState::Defused => self.push(events, snap, EventKind::BombDefused {
                    round: snap.map.round,
                    ninja: snap.player.health <= self.config.ninja_health,
                }),
                BombState::Exploded => self.push(events, snap, EventKind::BombExploded {
                    round: snap.map.round,
                }),
                BombState::Idle => {}
            }
        }

        if snap.player.mvps > prev.player.mvps {
            self.push(events, snap, EventKind::Mvp {
                total: snap.player.mvps,
            });
        }

        if snap.map.phase == "gameover" && prev.map.phase != "gameover" {
            let won = (snap.player.team.eq_ignore_ascii_case("CT")
                && snap.map.ct_score > snap.map.t_score)
                || (snap.player.team.eq_ignore_ascii_case("T")
                    && snap.map.t_score > snap.map.ct_score);
            self.push(events, snap, EventKind::MatchEnd {
                won,
                kills: snap.player.kills,
                deaths: snap.player.deaths,
            });
        }

        // Clutch arming: last teammate standing against enough opponents.
        if snap.round.phase == RoundPhase::Live
            && self.round.clutch.is_none()
            && snap.player.health > 0
        {
            if let Some(alive) = snap.alive {
                if alive.teammates == 0 && alive.opponents >= self.config.clutch_min_opponents {
                    self.round.clutch = Some(alive.opponents);
                    debug!(target: "iris::differ", opponents = alive.opponents, "clutch situation armed");
                }
            }
        }
    }

    fn reset_round(&mut self, snap: &Snapshot) {
        self.round = RoundContext {
            start_kills: snap.player.kills,
            eco: snap.player.money < self.config.eco_money,
            kill_streak: 0,
            clutch: None,
        };
    }

    fn push(&self, events: &mut Vec<Event>, snap: &Snapshot, kind: EventKind) {
        events.push(Event::new(self.ids.next(), snap.timestamp, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AliveSnapshot, MapSnapshot, PlayerSnapshot, RoundSnapshot};
    use chrono::DateTime;

    fn base_snapshot(round: u32) -> Snapshot {
        Snapshot {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            player: PlayerSnapshot {
                name: "streamer".into(),
                team: "CT".into(),
                health: 100,
                money: 4000,
                ..PlayerSnapshot::default()
            },
            round: RoundSnapshot {
                phase: RoundPhase::Live,
                bomb: BombState::Idle,
            },
            map: MapSnapshot {
                name: "de_dust2".into(),
                mode: "competitive".into(),
                phase: "live".into(),
                round,
                ct_score: 0,
                t_score: 0,
            },
            alive: None,
            win_team: String::new(),
        }
    }

    fn differ() -> StateDiffer {
        StateDiffer::new(DifferConfig::default(), EventIdGen::new())
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.category()).collect()
    }

    #[test]
    fn first_snapshot_emits_nothing() {
        let mut d = differ();
        assert!(d.ingest(base_snapshot(3)).is_empty());
    }

    #[test]
    fn kill_then_bomb_planted_in_that_order() {
        let mut d = differ();
        let mut a = base_snapshot(3);
        a.player.kills = 2;
        d.ingest(a);

        let mut b = base_snapshot(3);
        b.player.kills = 3;
        b.player.round_kills = 3;
        b.round.bomb = BombState::Planted;
        let events = d.ingest(b);
        assert_eq!(kinds(&events), vec!["kill", "bomb_planted"]);
    }

    #[test]
    fn derivation_is_deterministic() {
        let run = || {
            let mut d = differ();
            let mut a = base_snapshot(3);
            a.player.kills = 1;
            let mut b = base_snapshot(3);
            b.player.kills = 2;
            b.player.deaths = 1;
            b.round.bomb = BombState::Planted;
            d.ingest(a);
            let events = d.ingest(b);
            serde_json::to_string(&events.iter().map(|e| &e.kind).collect::<Vec<_>>()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn correlated_kill_and_death_emitted_once() {
        let mut d = differ();
        d.ingest(base_snapshot(3));
        let mut b = base_snapshot(3);
        b.player.kills = 1;
        b.player.deaths = 1;
        let events = d.ingest(b);
        assert_eq!(kinds(&events), vec!["kill", "death"]);
    }

    #[test]
    fn round_regression_resets_baseline() {
        let mut d = differ();
        d.ingest(base_snapshot(5));
        let mut b = base_snapshot(3);
        b.player.kills = 7; // would be a kill diff against a related round
        let events = d.ingest(b);
        assert!(events.is_empty());
    }

    #[test]
    fn map_change_suppresses_combat_diff() {
        let mut d = differ();
        d.ingest(base_snapshot(10));
        let mut b = base_snapshot(1);
        b.map.name = "de_mirage".into();
        b.player.kills = 4;
        let events = d.ingest(b);
        assert_eq!(kinds(&events), vec!["map_change"]);
    }

    #[test]
    fn round_start_marks_eco() {
        let mut d = differ();
        d.ingest(base_snapshot(3));
        let mut b = base_snapshot(4);
        b.round.phase = RoundPhase::Freezetime;
        b.player.money = 1200;
        let events = d.ingest(b);
        assert!(matches!(
            events[0].kind,
            EventKind::RoundStart { round: 4, eco: true }
        ));
    }

    #[test]
    fn clutch_won_round_emits_clutch_then_round_end() {
        let mut d = differ();
        // Round opens.
        let mut start = base_snapshot(7);
        start.round.phase = RoundPhase::Freezetime;
        d.ingest(base_snapshot(7));
        d.ingest(start);

        // Live, alone against two opponents: clutch arms.
        let mut alone = base_snapshot(7);
        alone.alive = Some(AliveSnapshot {
            teammates: 0,
            opponents: 2,
        });
        d.ingest(alone);

        // A kill, then the round is won.
        let mut frag = base_snapshot(7);
        frag.alive = Some(AliveSnapshot {
            teammates: 0,
            opponents: 1,
        });
        frag.player.kills = 1;
        d.ingest(frag);

        let mut over = base_snapshot(7);
        over.round.phase = RoundPhase::Over;
        over.player.kills = 2;
        over.win_team = "CT".into();
        let events = d.ingest(over);
        assert_eq!(kinds(&events), vec!["kill", "clutch", "round_end"]);
        assert!(matches!(events[1].kind, EventKind::Clutch { opponents: 2 }));
        assert!(matches!(
            events[2].kind,
            EventKind::RoundEnd { won: true, round_kills: 2, .. }
        ));
    }

    #[test]
    fn lost_clutch_stays_silent() {
        let mut d = differ();
        let mut start = base_snapshot(7);
        start.round.phase = RoundPhase::Freezetime;
        d.ingest(base_snapshot(7));
        d.ingest(start);

        let mut alone = base_snapshot(7);
        alone.alive = Some(AliveSnapshot {
            teammates: 0,
            opponents: 3,
        });
        d.ingest(alone);

        let mut over = base_snapshot(7);
        over.round.phase = RoundPhase::Over;
        over.win_team = "T".into();
        let events = d.ingest(over);
        assert_eq!(kinds(&events), vec!["round_end"]);
    }

    #[test]
    fn five_round_kills_is_an_ace_at_round_end() {
        let mut d = differ();
        let mut start = base_snapshot(9);
        start.round.phase = RoundPhase::Freezetime;
        d.ingest(base_snapshot(9));
        d.ingest(start);

        let mut over = base_snapshot(9);
        over.round.phase = RoundPhase::Over;
        over.player.kills = 5;
        over.win_team = "CT".into();
        let events = d.ingest(over);
        assert_eq!(kinds(&events), vec!["kill", "ace", "round_end"]);
    }

    #[test]
    fn ninja_defuse_checks_health() {
        let mut d = differ();
        let mut planted = base_snapshot(3);
        planted.round.bomb = BombState::Planted;
        d.ingest(planted);

        let mut defused = base_snapshot(3);
        defused.round.bomb = BombState::Defused;
        defused.player.health = 5;
        let events = d.ingest(defused);
        // Health drop also yields a low-health event before the defuse.
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::BombDefused { ninja: true, .. }
        )));
    }

    #[test]
    fn mvp_counter_increase_fires_once() {
        let mut d = differ();
        d.ingest(base_snapshot(3));
        let mut b = base_snapshot(3);
        b.player.mvps = 1;
        let events = d.ingest(b);
        assert_eq!(kinds(&events), vec!["mvp"]);
        // Same counter again: nothing new.
        let mut c = base_snapshot(3);
        c.player.mvps = 1;
        assert!(d.ingest(c).is_empty());
    }

    #[test]
    fn streak_carries_across_rounds_until_death() {
        let mut d = differ();
        d.ingest(base_snapshot(3));
        let mut b = base_snapshot(3);
        b.player.kills = 1;
        let events = d.ingest(b);
        assert!(matches!(events[0].kind, EventKind::Kill { streak: 1, .. }));

        let mut c = base_snapshot(3);
        c.player.kills = 2;
        c.player.deaths = 1;
        let events = d.ingest(c);
        assert!(matches!(events[0].kind, EventKind::Kill { streak: 2, .. }));

        let mut e = base_snapshot(3);
        e.player.kills = 3;
        e.player.deaths = 1;
        let events = d.ingest(e);
        assert!(matches!(events[0].kind, EventKind::Kill { streak: 1, .. }));
    }
}
