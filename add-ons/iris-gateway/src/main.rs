//! Axum-based gateway: entry point for the Iris stream co-host.
//!
//! Accepts game-state snapshots (POST /), stream feed events
//! (POST /stream-event) and voice transcripts (POST /utterance), and feeds
//! everything to the single orchestrator task. Ingestion never blocks a
//! producer: a full pipeline logs and drops, and the game client always
//! gets its ack.

mod orchestrator;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use iris_core::{default_rules, AchievementTracker, IrisConfig, ProgressStore};
use iris_voice::{Arbiter, CloudTts, NullMixer, PlaceholderTts, TtsBackend};
use orchestrator::{Inbound, Orchestrator, StatusSummary};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    inbound: mpsc::Sender<Inbound>,
    status: Arc<RwLock<StatusSummary>>,
}

#[derive(Deserialize)]
struct UtterancePayload {
    text: String,
}

/// Game-state push. Always acks: a malformed document is the game's
/// problem to log, never a reason to make the client retry.
async fn ingest_snapshot(
    State(state): State<AppState>,
    Json(doc): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    if state.inbound.try_send(Inbound::Snapshot(doc)).is_err() {
        warn!(target: "iris::gsi", "snapshot dropped: pipeline full or shutting down");
    }
    Json(serde_json::json!({ "status": "ok" }))
}

/// Chat/donation feed boundary: the external transport posts structured
/// events here and they join the same pipeline as game events.
async fn ingest_stream_event(
    State(state): State<AppState>,
    Json(kind): Json<iris_core::EventKind>,
) -> Json<serde_json::Value> {
    if state.inbound.try_send(Inbound::Feed(kind)).is_err() {
        warn!(target: "iris::feed", "stream event dropped: pipeline full or shutting down");
    }
    Json(serde_json::json!({ "status": "ok" }))
}

/// Voice recognition boundary: the STT collaborator posts transcripts here.
async fn ingest_utterance(
    State(state): State<AppState>,
    Json(payload): Json<UtterancePayload>,
) -> Json<serde_json::Value> {
    if state
        .inbound
        .try_send(Inbound::Utterance(payload.text))
        .is_err()
    {
        warn!(target: "iris::voice", "utterance dropped: pipeline full or shutting down");
    }
    Json(serde_json::json!({ "status": "ok" }))
}

async fn health(State(state): State<AppState>) -> Json<StatusSummary> {
    Json(state.status.read().await.clone())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(ingest_snapshot))
        .route("/stream-event", post(ingest_stream_event))
        .route("/utterance", post(ingest_utterance))
        .route("/health", get(health))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = IrisConfig::from_env();
    info!(target: "iris", "🌸 starting Iris stream co-host");

    let tts: Box<dyn TtsBackend> = match CloudTts::from_env() {
        Ok(t) => {
            info!(target: "iris::voice", "TTS: [Cloud] (OpenAI-compatible)");
            Box::new(t)
        }
        Err(_) => {
            info!(target: "iris::voice", "TTS: [Placeholder] (set IRIS_TTS_API_KEY for Iris to speak)");
            Box::new(PlaceholderTts)
        }
    };
    let arbiter = Arbiter::spawn(config.speech_queue_cap, tts);

    let store = match ProgressStore::new(PathBuf::from(&config.progress_db)) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(target: "iris::achievements", "progress store unavailable, session-only progress: {e}");
            None
        }
    };
    let tracker = AchievementTracker::new(default_rules(), store);

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(256);
    let status = Arc::new(RwLock::new(StatusSummary::default()));
    let orchestrator = Orchestrator::new(
        &config,
        tracker,
        Box::new(NullMixer::new()),
        arbiter.handle(),
        Arc::clone(&status),
    );
    let pipeline = tokio::spawn(orchestrator.run(inbound_rx));

    // Ambient timer: session ticks for duration achievements and idle chatter.
    let ticker_tx = inbound_tx.clone();
    let ambient_interval = Duration::from_secs(config.ambient_interval_secs);
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ambient_interval);
        interval.tick().await; // the immediate first tick
        loop {
            interval.tick().await;
            if ticker_tx.send(Inbound::Tick).await.is_err() {
                break;
            }
        }
    });

    let app = router(AppState {
        inbound: inbound_tx.clone(),
        status,
    });
    let listener = match tokio::net::TcpListener::bind(&config.gsi_bind).await {
        Ok(l) => l,
        Err(e) => {
            error!(target: "iris", "cannot bind {}: {e}", config.gsi_bind);
            return;
        }
    };
    info!(target: "iris", "listening on {} (snapshots on POST /)", config.gsi_bind);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(target: "iris", "shutdown signal received");
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(target: "iris", "server error: {e}");
    }

    // Close every producer so the pipeline drains, checkpoints and says bye.
    ticker.abort();
    drop(inbound_tx);
    let _ = pipeline.await;
    arbiter.shutdown_and_join();
    info!(target: "iris", "stopped. До встречи на следующем стриме!");
}
