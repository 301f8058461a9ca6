//! Achievement tracker: folds the event stream into persistent progress.
//!
//! Rules are data, not code — adding an achievement means adding a table
//! entry. Counters only ever grow, an unlock fires at most once per
//! persisted progress lifetime, and replayed events are ignored via a
//! bounded recent-id history.

use crate::events::{Event, EventId, EventKind};
use crate::store::{ProgressEntry, ProgressStore};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

/// How a rule folds matched values into its counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Counter accumulates the matched value.
    Accumulate,
    /// Counter becomes the maximum matched value seen (streaks, durations).
    HighWater,
}

/// One declarative achievement rule. The matcher returns the contribution
/// of an event, or `None` when the event is not relevant.
pub struct AchievementRule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub threshold: u32,
    pub kind: RuleKind,
    pub matcher: fn(&EventKind) -> Option<u32>,
}

/// First-time threshold crossing, for narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlock {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// The default stream-achievement rule table.
pub fn default_rules() -> Vec<AchievementRule> {
    use EventKind::*;
    use RuleKind::*;
    vec![
        AchievementRule {
            id: "first_blood",
            title: "Первая кровь",
            description: "Первое убийство на стриме",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| matches!(e, Kill { .. }).then_some(1),
        },
        AchievementRule {
            id: "killing_spree",
            title: "Серия убийств",
            description: "5 убийств подряд без смерти",
            threshold: 5,
            kind: HighWater,
            matcher: |e| match e {
                Kill { streak, .. } => Some(*streak),
                _ => None,
            },
        },
        AchievementRule {
            id: "unstoppable",
            title: "Неостановимый",
            description: "10 убийств подряд без смерти",
            threshold: 10,
            kind: HighWater,
            matcher: |e| match e {
                Kill { streak, .. } => Some(*streak),
                _ => None,
            },
        },
        AchievementRule {
            id: "headhunter",
            title: "Охотник за головами",
            description: "50 хедшотов за стрим",
            threshold: 50,
            kind: Accumulate,
            matcher: |e| matches!(e, Kill { headshot: true, .. }).then_some(1),
        },
        AchievementRule {
            id: "ace_master",
            title: "Мастер ACE",
            description: "Убить всю команду противника за раунд",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| matches!(e, Ace { .. }).then_some(1),
        },
        AchievementRule {
            id: "clutch_king",
            title: "Король клатчей",
            description: "Выиграть 3 clutch ситуации",
            threshold: 3,
            kind: Accumulate,
            matcher: |e| matches!(e, Clutch { .. }).then_some(1),
        },
        AchievementRule {
            id: "mvp_collector",
            title: "Звезда раунда",
            description: "Получить 5 MVP",
            threshold: 5,
            kind: Accumulate,
            matcher: |e| matches!(e, Mvp { .. }).then_some(1),
        },
        AchievementRule {
            id: "survivor",
            title: "Выживший",
            description: "Выжить с 1 HP",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| match e {
                LowHealth { health } if *health <= 1 => Some(1),
                _ => None,
            },
        },
        AchievementRule {
            id: "ninja",
            title: "Ниндзя",
            description: "Дефуз бомбы на последних HP",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| matches!(e, BombDefused { ninja: true, .. }).then_some(1),
        },
        AchievementRule {
            id: "economical",
            title: "Экономный",
            description: "Выиграть эко раунд",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| matches!(e, RoundEnd { won: true, eco: true, .. }).then_some(1),
        },
        AchievementRule {
            id: "loved",
            title: "Любимец",
            description: "Получить 5 донатов",
            threshold: 5,
            kind: Accumulate,
            matcher: |e| matches!(e, Donation { .. }).then_some(1),
        },
        AchievementRule {
            id: "whale_friend",
            title: "Друг китов",
            description: "Получить крупный донат",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| match e {
                Donation { amount, currency, .. } => {
                    let big = (currency.eq_ignore_ascii_case("RUB") && *amount >= 1000.0)
                        || (currency.eq_ignore_ascii_case("USD") && *amount >= 15.0);
                    big.then_some(1)
                }
                _ => None,
            },
        },
        AchievementRule {
            id: "raided",
            title: "Под рейдом",
            description: "Получить рейд 50+ зрителей",
            threshold: 1,
            kind: Accumulate,
            matcher: |e| match e {
                Raid { viewers, .. } if *viewers >= 50 => Some(1),
                _ => None,
            },
        },
        AchievementRule {
            id: "popular",
            title: "Популярный",
            description: "Получить 10 сообщений в чате",
            threshold: 10,
            kind: Accumulate,
            matcher: |e| matches!(e, ChatMessage { .. }).then_some(1),
        },
        AchievementRule {
            id: "sub_love",
            title: "Любовь подписчиков",
            description: "10 новых подписчиков",
            threshold: 10,
            kind: Accumulate,
            matcher: |e| matches!(e, Subscription { .. }).then_some(1),
        },
        AchievementRule {
            id: "dedication",
            title: "Преданность",
            description: "10 матчей за сессию",
            threshold: 10,
            kind: Accumulate,
            matcher: |e| matches!(e, MatchEnd { .. }).then_some(1),
        },
        AchievementRule {
            id: "marathon",
            title: "Марафонец",
            description: "Стримить 4+ часа",
            threshold: 240,
            kind: HighWater,
            matcher: |e| match e {
                SessionTick { minutes } => Some(*minutes),
                _ => None,
            },
        },
    ]
}

/// How many processed event ids are remembered for replay protection.
const RECENT_EVENT_HISTORY: usize = 256;

/// Single-writer owner of [`ProgressEntry`] state. All mutation goes through
/// [`AchievementTracker::apply`]; readers get unlocks as events, never the
/// map itself.
pub struct AchievementTracker {
    rules: Vec<AchievementRule>,
    progress: HashMap<String, ProgressEntry>,
    store: Option<ProgressStore>,
    store_warned: bool,
    seen_ids: HashSet<EventId>,
    seen_order: VecDeque<EventId>,
}

impl AchievementTracker {
    /// Build a tracker over the given rules. When a store is present, its
    /// rows seed the progress map; an unreadable store degrades to
    /// in-memory progress with one warning.
    pub fn new(rules: Vec<AchievementRule>, store: Option<ProgressStore>) -> Self {
        let mut progress = HashMap::new();
        let mut store_warned = false;
        if let Some(ref s) = store {
            match s.load_all() {
                Ok(rows) => progress = rows,
                Err(e) => {
                    warn!(target: "iris::achievements", "progress store unreadable, starting from zero: {e}");
                    store_warned = true;
                }
            }
        }
        Self {
            rules,
            progress,
            store,
            store_warned,
            seen_ids: HashSet::new(),
            seen_order: VecDeque::new(),
        }
    }

    /// Apply one event; returns unlocks that crossed their threshold for
    /// the first time. Replays of an already-processed event id are no-ops.
    pub fn apply(&mut self, event: &Event) -> Vec<Unlock> {
        if !self.remember(event.id) {
            return Vec::new();
        }

        let mut unlocks = Vec::new();
        let mut dirty_rows: Vec<(&'static str, ProgressEntry)> = Vec::new();
        for rule in &self.rules {
            let Some(value) = (rule.matcher)(&event.kind) else {
                continue;
            };
            let entry = self.progress.entry(rule.id.to_string()).or_default();
            let next = match rule.kind {
                RuleKind::Accumulate => entry.counter.saturating_add(value),
                RuleKind::HighWater => entry.counter.max(value),
            };
            let mut dirty = next != entry.counter;
            entry.counter = next;

            if !entry.unlocked && entry.counter >= rule.threshold {
                entry.unlocked = true;
                entry.unlocked_at_ms = Some(chrono::Utc::now().timestamp_millis());
                dirty = true;
                info!(target: "iris::achievements", id = rule.id, title = rule.title, "achievement unlocked");
                unlocks.push(Unlock {
                    id: rule.id.to_string(),
                    title: rule.title.to_string(),
                    description: rule.description.to_string(),
                });
            }

            if dirty {
                dirty_rows.push((rule.id, entry.clone()));
            }
        }
        for (id, entry) in dirty_rows {
            self.flush(id, &entry);
        }
        unlocks
    }

    /// Read-only export of the progress map (for status endpoints).
    pub fn snapshot(&self) -> HashMap<String, ProgressEntry> {
        self.progress.clone()
    }

    /// Count of unlocked / total rules, for the spoken progress summary.
    pub fn unlocked_count(&self) -> (usize, usize) {
        let unlocked = self
            .rules
            .iter()
            .filter(|r| self.progress.get(r.id).map(|p| p.unlocked).unwrap_or(false))
            .count();
        (unlocked, self.rules.len())
    }

    /// Flush every row (shutdown checkpoint).
    pub fn checkpoint(&mut self) {
        let rows: Vec<(String, ProgressEntry)> = self
            .progress
            .iter()
            .map(|(id, e)| (id.clone(), e.clone()))
            .collect();
        for (id, entry) in rows {
            self.flush(&id, &entry);
        }
    }

    /// Record a processed id; false when it was already seen.
    fn remember(&mut self, id: EventId) -> bool {
        if !self.seen_ids.insert(id) {
            return false;
        }
        self.seen_order.push_back(id);
        while self.seen_order.len() > RECENT_EVENT_HISTORY {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen_ids.remove(&old);
            }
        }
        true
    }

    fn flush(&mut self, id: &str, entry: &ProgressEntry) {
        let Some(ref store) = self.store else {
            return;
        };
        if let Err(e) = store.upsert(id, entry) {
            if !self.store_warned {
                warn!(target: "iris::achievements", "progress store unwritable, continuing in memory: {e}");
                self.store_warned = true;
            }
        }
    }
}
