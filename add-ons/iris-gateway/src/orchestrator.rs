//! The orchestrator: one consumer task owns the whole event pipeline.
//!
//! Snapshots, feed events, transcripts and session ticks arrive on one
//! channel; the differ and tracker run sequentially per event on this task
//! (single-owner, no shared mutable state), and everything worth saying
//! fans out to the reaction arbiter.

use chrono::Utc;
use iris_core::{
    AchievementTracker, Brain, Event, EventIdGen, EventKind, GameContext, IrisConfig, LlmBridge,
    Snapshot, StateDiffer,
};
use iris_core::differ::DifferConfig;
use iris_voice::{
    execute_intent, ArbiterHandle, Command, CommandInterpreter, Emotion, Intent, MixerBackend,
    SpeechPriority, SpeechRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Everything the pipeline consumes, in arrival order.
pub enum Inbound {
    /// Raw snapshot document pushed by the game client.
    Snapshot(serde_json::Value),
    /// Structured event pushed by the chat/donation feed.
    Feed(EventKind),
    /// Transcribed utterance from the voice recognition collaborator.
    Utterance(String),
    /// Periodic tick from the ambient timer.
    Tick,
}

/// Read-only summary for the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSummary {
    pub status: String,
    pub player: String,
    pub map: String,
    pub round: u32,
    pub achievements_unlocked: usize,
    pub achievements_total: usize,
}

impl Default for StatusSummary {
    fn default() -> Self {
        Self {
            status: "running".to_string(),
            player: String::new(),
            map: String::new(),
            round: 0,
            achievements_unlocked: 0,
            achievements_total: 0,
        }
    }
}

pub struct Orchestrator {
    differ: StateDiffer,
    tracker: AchievementTracker,
    brain: Brain,
    interpreter: CommandInterpreter,
    mixer: Box<dyn MixerBackend>,
    arbiter: ArbiterHandle,
    ids: EventIdGen,
    status: Arc<RwLock<StatusSummary>>,
    session_start: Instant,
}

impl Orchestrator {
    pub fn new(
        config: &IrisConfig,
        tracker: AchievementTracker,
        mixer: Box<dyn MixerBackend>,
        arbiter: ArbiterHandle,
        status: Arc<RwLock<StatusSummary>>,
    ) -> Self {
        let ids = EventIdGen::new();
        let differ_config = DifferConfig {
            team_size: config.team_size,
            ..DifferConfig::default()
        };
        Self {
            differ: StateDiffer::new(differ_config, ids.clone()),
            tracker,
            brain: Brain::new(LlmBridge::from_env(), config.chat_reply_chance),
            interpreter: CommandInterpreter::new(config.volume_step),
            mixer,
            arbiter,
            ids,
            status,
            session_start: Instant::now(),
        }
    }

    /// Consume until every producer hangs up, then checkpoint and say bye.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) {
        self.arbiter.submit(
            SpeechRequest::new(
                SpeechPriority::Highlight,
                "greeting",
                "Привет! Я Ирис, готова к стриму!",
            )
            .with_emotion(Emotion::Happy),
        );

        while let Some(msg) = rx.recv().await {
            match msg {
                Inbound::Snapshot(doc) => self.on_snapshot(doc).await,
                Inbound::Feed(kind) => self.on_feed(kind).await,
                Inbound::Utterance(text) => self.on_utterance(&text).await,
                Inbound::Tick => self.on_tick().await,
            }
        }

        self.finish().await;
    }

    async fn on_snapshot(&mut self, doc: serde_json::Value) {
        let snap = match Snapshot::parse(doc) {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "iris::gsi", "rejected snapshot: {e}");
                return;
            }
        };
        for event in self.differ.ingest(snap) {
            self.process_event(event).await;
        }
        self.update_status().await;
    }

    async fn on_feed(&mut self, kind: EventKind) {
        let event = Event::new(self.ids.next(), Utc::now(), kind);
        self.process_event(event).await;
    }

    async fn on_utterance(&mut self, text: &str) {
        match self.interpreter.interpret(text) {
            None => debug!(target: "iris::voice", "utterance without wake phrase ignored"),
            Some(Command::Feedback(feedback)) => self.speak_feedback(feedback),
            Some(Command::Intent(Intent::Converse(message))) => {
                let ctx = self.game_context();
                let reply = self.brain.converse(&message, ctx.as_ref()).await;
                self.arbiter.submit(
                    SpeechRequest::new(SpeechPriority::Highlight, "conversation", reply)
                        .with_emotion(Emotion::Gentle),
                );
            }
            Some(Command::Intent(intent)) => {
                if let Some(feedback) = execute_intent(self.mixer.as_ref(), &intent) {
                    self.speak_feedback(feedback);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        let minutes = (self.session_start.elapsed().as_secs() / 60) as u32;
        let event = Event::new(self.ids.next(), Utc::now(), EventKind::SessionTick { minutes });
        self.process_event(event).await;

        if !self.arbiter.is_busy() {
            let ctx = self.game_context();
            if let Some(text) = self.brain.ambient(ctx.as_ref()).await {
                self.arbiter.submit(
                    SpeechRequest::new(SpeechPriority::Ambient, "ambient", text),
                );
            }
        }
    }

    /// Tracker first, then narration, then unlock congratulations. Events
    /// from one snapshot pair keep their derivation order in the queue.
    async fn process_event(&mut self, event: Event) {
        debug!(target: "iris::events", category = event.kind.category(), "event");
        let unlocks = self.tracker.apply(&event);

        let ctx = self.game_context();
        if let Some(text) = self.brain.narrate_event(&event, ctx.as_ref()).await {
            let (priority, emotion) = speech_class(&event.kind);
            let mut request = SpeechRequest::new(priority, event.kind.category(), text)
                .with_emotion(emotion);
            if let Some(key) = dedup_key(&event.kind) {
                request = request.with_dedup_key(key);
            }
            self.arbiter.submit(request);
        }

        for unlock in unlocks {
            self.arbiter.submit(
                SpeechRequest::new(
                    SpeechPriority::Achievement,
                    "achievement",
                    format!("Достижение разблокировано! {}!", unlock.title),
                )
                .with_emotion(Emotion::Excited),
            );
        }
    }

    fn speak_feedback(&self, feedback: String) {
        self.arbiter.submit(
            SpeechRequest::new(SpeechPriority::Highlight, "voice_feedback", feedback),
        );
    }

    fn game_context(&self) -> Option<GameContext> {
        self.differ.last().map(|snap| GameContext {
            map: snap.map.name.clone(),
            round: snap.map.round,
            ct_score: snap.map.ct_score,
            t_score: snap.map.t_score,
            kills: snap.player.kills,
            deaths: snap.player.deaths,
        })
    }

    async fn update_status(&self) {
        let (unlocked, total) = self.tracker.unlocked_count();
        let mut status = self.status.write().await;
        if let Some(snap) = self.differ.last() {
            status.player = snap.player.name.clone();
            status.map = snap.map.name.clone();
            status.round = snap.map.round;
        }
        status.achievements_unlocked = unlocked;
        status.achievements_total = total;
    }

    async fn finish(mut self) {
        info!(target: "iris", "pipeline drained, checkpointing progress");
        self.tracker.checkpoint();
        self.arbiter.submit(
            SpeechRequest::new(
                SpeechPriority::Highlight,
                "farewell",
                "До встречи! Было весело!",
            )
            .with_emotion(Emotion::Gentle),
        );
        // Give the farewell a chance to play before the arbiter is torn down.
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.arbiter.is_busy() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn speech_class(kind: &EventKind) -> (SpeechPriority, Emotion) {
    match kind {
        EventKind::Ace { .. } | EventKind::Clutch { .. } | EventKind::Mvp { .. } => {
            (SpeechPriority::Highlight, Emotion::Excited)
        }
        EventKind::Donation { .. } | EventKind::Subscription { .. } | EventKind::Raid { .. } => {
            (SpeechPriority::Donation, Emotion::Excited)
        }
        EventKind::ChatMessage { .. } => (SpeechPriority::ChatReply, Emotion::Neutral),
        EventKind::Kill { round_kills, .. } if *round_kills >= 3 => {
            (SpeechPriority::Combat, Emotion::Excited)
        }
        EventKind::Kill { .. } => (SpeechPriority::Combat, Emotion::Happy),
        EventKind::Death { .. } => (SpeechPriority::Combat, Emotion::Supportive),
        EventKind::BombPlanted { .. } => (SpeechPriority::Combat, Emotion::Tense),
        EventKind::BombDefused { .. } => (SpeechPriority::Combat, Emotion::Excited),
        EventKind::BombExploded { .. } => (SpeechPriority::Combat, Emotion::Supportive),
        EventKind::RoundEnd { won: true, .. } => (SpeechPriority::Combat, Emotion::Excited),
        EventKind::RoundEnd { .. } => (SpeechPriority::Combat, Emotion::Supportive),
        _ => (SpeechPriority::Ambient, Emotion::Neutral),
    }
}

/// Rapid-fire kills and deaths collapse in the queue instead of spamming.
fn dedup_key(kind: &EventKind) -> Option<&'static str> {
    match kind {
        EventKind::Kill { .. } => Some("kill"),
        EventKind::Death { .. } => Some("death"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::default_rules;
    use iris_voice::{Arbiter, AudioSink, NullMixer, TtsBackend, VoiceResult};
    use std::sync::Mutex;

    /// Captures everything the arbiter would speak; returns no audio so the
    /// worker never touches a real device.
    struct CaptureTts {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl TtsBackend for CaptureTts {
        fn synthesize(&self, text: &str, _emotion: Emotion) -> VoiceResult<Vec<u8>> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(Vec::new())
        }
    }

    struct NoopSink;

    impl AudioSink for NoopSink {
        fn play(&mut self, _bytes: &[u8]) -> VoiceResult<()> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    fn test_rig() -> (
        Arbiter,
        Arc<Mutex<Vec<String>>>,
        Orchestrator,
        Arc<RwLock<StatusSummary>>,
    ) {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let arbiter = Arbiter::spawn_with(
            8,
            Box::new(CaptureTts {
                spoken: Arc::clone(&spoken),
            }),
            || Ok(NoopSink),
        );
        let status = Arc::new(RwLock::new(StatusSummary::default()));
        let config = IrisConfig::default();
        let tracker = AchievementTracker::new(default_rules(), None);
        let orchestrator = Orchestrator::new(
            &config,
            tracker,
            Box::new(NullMixer::new()),
            arbiter.handle(),
            Arc::clone(&status),
        );
        (arbiter, spoken, orchestrator, status)
    }

    fn snapshot_doc(round: u32, kills: u32) -> serde_json::Value {
        serde_json::json!({
            "provider": { "timestamp": 1_700_000_000 },
            "player": {
                "name": "streamer",
                "team": "CT",
                "state": { "health": 100, "money": 4000, "round_kills": 1 },
                "match_stats": { "kills": kills, "deaths": 0 }
            },
            "round": { "phase": "live" },
            "map": { "name": "de_dust2", "round": round,
                     "team_ct": { "score": 0 }, "team_t": { "score": 0 } }
        })
    }

    async fn drain(spoken: &Arc<Mutex<Vec<String>>>, min_len: usize) {
        for _ in 0..100 {
            if spoken.lock().unwrap().len() >= min_len {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn snapshot_pipeline_speaks_and_updates_status() {
        let (arbiter, spoken, orchestrator, status) = test_rig();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(orchestrator.run(rx));

        tx.send(Inbound::Snapshot(snapshot_doc(3, 0))).await.unwrap();
        tx.send(Inbound::Snapshot(snapshot_doc(3, 1))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        drain(&spoken, 3).await;
        let spoken = spoken.lock().unwrap().clone();
        assert!(spoken.iter().any(|s| s == "Привет! Я Ирис, готова к стриму!"));
        // Kill narration and first-blood unlock both made it to the mouth.
        assert!(spoken
            .iter()
            .any(|s| s.contains("Достижение разблокировано! Первая кровь")));

        let status = status.read().await;
        assert_eq!(status.player, "streamer");
        assert_eq!(status.map, "de_dust2");
        assert_eq!(status.round, 3);
        assert!(status.achievements_unlocked >= 1);
        arbiter.shutdown_and_join();
    }

    #[tokio::test]
    async fn volume_command_reaches_the_mixer_and_the_mouth() {
        let (arbiter, spoken, orchestrator, _status) = test_rig();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(orchestrator.run(rx));

        tx.send(Inbound::Utterance("Ирис сделай музыку тише".into()))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        drain(&spoken, 2).await;
        let spoken = spoken.lock().unwrap().clone();
        assert!(spoken
            .iter()
            .any(|s| s == "Установила громкость music на 80%"));
        arbiter.shutdown_and_join();
    }

    #[tokio::test]
    async fn donation_feed_event_is_thanked() {
        let (arbiter, spoken, orchestrator, _status) = test_rig();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(orchestrator.run(rx));

        tx.send(Inbound::Feed(EventKind::Donation {
            amount: 500.0,
            currency: "RUB".into(),
            from: "viewer1".into(),
        }))
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        drain(&spoken, 2).await;
        // Greeting + donation thanks + farewell at minimum.
        assert!(spoken.lock().unwrap().len() >= 3);
        arbiter.shutdown_and_join();
    }

    #[tokio::test]
    async fn utterance_without_wake_phrase_stays_silent() {
        let (arbiter, spoken, orchestrator, _status) = test_rig();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(orchestrator.run(rx));

        tx.send(Inbound::Utterance("сделай музыку тише".into()))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        let spoken = spoken.lock().unwrap().clone();
        // Only greeting and farewell.
        assert_eq!(spoken.len(), 2);
        arbiter.shutdown_and_join();
    }
}
