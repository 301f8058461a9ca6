//! **Reaction arbiter** — serializes all narration onto one audio output.
//!
//! Any producer may `submit` concurrently; submission only enqueues. A
//! single worker thread owns the playback resource and speaks one request
//! at a time: higher priority reorders the queue but never interrupts the
//! utterance in flight. A bounded queue drops the lowest-priority entries
//! under bursts, and a failed synthesis marks the request done and moves on.

use crate::error::VoiceResult;
use crate::output::{AudioSink, SpeakerSink};
use crate::tts::{Emotion, TtsBackend};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, error, warn};

/// Priority bands, lowest first. Within a band the queue is FIFO by
/// submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpeechPriority {
    /// Idle filler commentary.
    Ambient,
    /// Replies to chat messages.
    ChatReply,
    /// Ordinary kill/death/bomb/round commentary.
    Combat,
    /// Ace/clutch/MVP commentary and voice-command acknowledgements.
    Highlight,
    /// Donation / subscription / raid thanks.
    Donation,
    /// Achievement unlock congratulations.
    Achievement,
}

/// One unit of narration awaiting synthesis and playback.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub priority: SpeechPriority,
    /// Category label for logs and drop accounting.
    pub category: &'static str,
    pub text: String,
    pub emotion: Emotion,
    /// Requests with a matching key collapse while queued.
    pub dedup_key: Option<String>,
}

impl SpeechRequest {
    pub fn new(priority: SpeechPriority, category: &'static str, text: impl Into<String>) -> Self {
        Self {
            priority,
            category,
            text: text.into(),
            emotion: Emotion::Neutral,
            dedup_key: None,
        }
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = emotion;
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

struct Queued {
    req: SpeechRequest,
    seq: u64,
}

struct Shared {
    queue: Mutex<Vec<Queued>>,
    available: Condvar,
    cap: usize,
    next_seq: AtomicU64,
    shutdown: AtomicBool,
    speaking: AtomicBool,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, Vec<Queued>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Highest priority wins; FIFO (smallest sequence) within a band.
fn pop_next(queue: &mut Vec<Queued>) -> Option<SpeechRequest> {
    let idx = queue
        .iter()
        .enumerate()
        .max_by_key(|(_, q)| (q.req.priority, Reverse(q.seq)))
        .map(|(i, _)| i)?;
    Some(queue.swap_remove(idx).req)
}

/// Cloneable submission side of the arbiter.
#[derive(Clone)]
pub struct ArbiterHandle {
    shared: Arc<Shared>,
}

impl ArbiterHandle {
    /// Enqueue a request. Never blocks on playback. A queued (not yet
    /// speaking) request with the same dedup key is replaced in place,
    /// keeping its spot in line.
    pub fn submit(&self, req: SpeechRequest) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            debug!(target: "iris::arbiter", category = req.category, "shutting down, request dropped");
            return;
        }
        let mut queue = self.shared.lock_queue();

        if let Some(key) = req.dedup_key.clone() {
            if let Some(existing) = queue
                .iter_mut()
                .find(|q| q.req.dedup_key.as_deref() == Some(key.as_str()))
            {
                debug!(target: "iris::arbiter", category = req.category, "replaced queued request with same dedup key");
                existing.req = req;
                drop(queue);
                self.shared.available.notify_one();
                return;
            }
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        queue.push(Queued { req, seq });

        if queue.len() > self.shared.cap {
            // Backpressure: shed the lowest-priority band, newest first.
            let victim = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, q)| (q.req.priority, Reverse(q.seq)))
                .map(|(i, _)| i);
            if let Some(idx) = victim {
                let dropped = queue.swap_remove(idx);
                debug!(
                    target: "iris::arbiter",
                    category = dropped.req.category,
                    "queue full, dropped lowest-priority request"
                );
            }
        }

        drop(queue);
        self.shared.available.notify_one();
    }

    /// True while an utterance is being synthesized or played.
    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::Acquire)
    }

    /// True when speaking or anything is queued.
    pub fn is_busy(&self) -> bool {
        self.is_speaking() || !self.shared.lock_queue().is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Begin shutdown: the current utterance finishes, the rest of the
    /// queue is discarded, the playback resource is released.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
    }
}

/// Owns the worker thread. Producers get clones of [`ArbiterHandle`].
pub struct Arbiter {
    handle: ArbiterHandle,
    worker: Option<thread::JoinHandle<()>>,
}

impl Arbiter {
    /// Spawn with the default speaker output. The sink is constructed
    /// inside the worker thread (it is not `Send` on all platforms).
    pub fn spawn(cap: usize, tts: Box<dyn TtsBackend>) -> Self {
        Self::spawn_with(cap, tts, SpeakerSink::new)
    }

    /// Spawn with a custom sink factory (tests, alternate outputs).
    pub fn spawn_with<S, F>(cap: usize, tts: Box<dyn TtsBackend>, make_sink: F) -> Self
    where
        S: AudioSink,
        F: FnOnce() -> VoiceResult<S> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Vec::new()),
            available: Condvar::new(),
            cap: cap.max(1),
            next_seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || run_worker(worker_shared, tts, make_sink));
        Self {
            handle: ArbiterHandle { shared },
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> ArbiterHandle {
        self.handle.clone()
    }

    /// Signal shutdown and wait for the worker to finish the current
    /// utterance and exit.
    pub fn shutdown_and_join(mut self) {
        self.handle.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Arbiter {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

fn run_worker<S, F>(shared: Arc<Shared>, tts: Box<dyn TtsBackend>, make_sink: F)
where
    S: AudioSink,
    F: FnOnce() -> VoiceResult<S>,
{
    let mut sink = match make_sink() {
        Ok(s) => s,
        Err(e) => {
            error!(target: "iris::arbiter", "audio sink init failed, narration disabled: {e}");
            return;
        }
    };

    loop {
        let req = {
            let mut queue = shared.lock_queue();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    let discarded = queue.len();
                    queue.clear();
                    if discarded > 0 {
                        debug!(target: "iris::arbiter", discarded, "discarded queued requests on shutdown");
                    }
                    sink.stop();
                    return;
                }
                if let Some(req) = pop_next(&mut queue) {
                    // Flip to speaking under the lock so `is_busy` never
                    // observes a gap between dequeue and synthesis.
                    shared.speaking.store(true, Ordering::Release);
                    break req;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        debug!(target: "iris::arbiter", category = req.category, "speaking");
        match tts.synthesize(&req.text, req.emotion) {
            Ok(bytes) if !bytes.is_empty() => {
                if let Err(e) = sink.play(&bytes) {
                    warn!(target: "iris::arbiter", category = req.category, "playback failed, moving on: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target: "iris::arbiter", category = req.category, "TTS failed, moving on: {e}");
            }
        }
        shared.speaking.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// TTS that yields the text bytes (or fails on demand).
    struct EchoTts {
        fail_on: Option<&'static str>,
    }

    impl TtsBackend for EchoTts {
        fn synthesize(&self, text: &str, _emotion: Emotion) -> VoiceResult<Vec<u8>> {
            if self.fail_on == Some(text) {
                return Err(VoiceError::Tts("synthesis refused".into()));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Sink that records what it played and can gate on an external signal.
    struct RecordingSink {
        played: Arc<Mutex<Vec<String>>>,
        gate: Option<mpsc::Receiver<()>>,
    }

    impl AudioSink for RecordingSink {
        fn play(&mut self, bytes: &[u8]) -> VoiceResult<()> {
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).to_string());
            if let Some(ref gate) = self.gate {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn gated_arbiter(cap: usize) -> (Arbiter, Arc<Mutex<Vec<String>>>, mpsc::Sender<()>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        let played_clone = Arc::clone(&played);
        let (release_tx, release_rx) = mpsc::channel();
        let arbiter = Arbiter::spawn_with(cap, Box::new(EchoTts { fail_on: None }), move || {
            Ok(RecordingSink {
                played: played_clone,
                gate: Some(release_rx),
            })
        });
        (arbiter, played, release_tx)
    }

    fn req(priority: SpeechPriority, category: &'static str, text: &str) -> SpeechRequest {
        SpeechRequest::new(priority, category, text)
    }

    /// Block the worker inside the first utterance so later submissions
    /// race only against each other, not against the worker.
    fn occupy(
        arbiter: &Arbiter,
        played: &Arc<Mutex<Vec<String>>>,
    ) {
        arbiter
            .handle()
            .submit(req(SpeechPriority::Ambient, "ambient", "first"));
        assert!(wait_until(1000, || played.lock().unwrap().len() == 1));
    }

    #[test]
    fn donation_overtakes_queued_kill() {
        let (arbiter, played, release) = gated_arbiter(8);
        let handle = arbiter.handle();
        occupy(&arbiter, &played);

        handle.submit(req(SpeechPriority::Combat, "kill", "nice kill"));
        handle.submit(req(SpeechPriority::Donation, "donation", "thanks for 500"));

        release.send(()).unwrap(); // finish "first"
        assert!(wait_until(1000, || played.lock().unwrap().len() == 2));
        release.send(()).unwrap();
        assert!(wait_until(1000, || played.lock().unwrap().len() == 3));
        release.send(()).unwrap();

        let order = played.lock().unwrap().clone();
        assert_eq!(order, vec!["first", "thanks for 500", "nice kill"]);
        arbiter.shutdown_and_join();
    }

    #[test]
    fn equal_priority_is_fifo() {
        let (arbiter, played, release) = gated_arbiter(8);
        let handle = arbiter.handle();
        occupy(&arbiter, &played);

        handle.submit(req(SpeechPriority::Combat, "kill", "one"));
        handle.submit(req(SpeechPriority::Combat, "death", "two"));

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        assert!(wait_until(1000, || played.lock().unwrap().len() == 3));
        assert_eq!(*played.lock().unwrap(), vec!["first", "one", "two"]);
        arbiter.shutdown_and_join();
    }

    #[test]
    fn dedup_key_replaces_queued_request() {
        let (arbiter, played, release) = gated_arbiter(8);
        let handle = arbiter.handle();
        occupy(&arbiter, &played);

        handle.submit(
            req(SpeechPriority::Combat, "kill", "nice kill").with_dedup_key("kill"),
        );
        handle.submit(
            req(SpeechPriority::Combat, "kill", "double kill!").with_dedup_key("kill"),
        );
        assert_eq!(handle.queue_len(), 1);

        release.send(()).unwrap();
        assert!(wait_until(1000, || played.lock().unwrap().len() == 2));
        release.send(()).unwrap();
        assert_eq!(*played.lock().unwrap(), vec!["first", "double kill!"]);
        arbiter.shutdown_and_join();
    }

    #[test]
    fn overflow_drops_lowest_priority() {
        let (arbiter, played, release) = gated_arbiter(2);
        let handle = arbiter.handle();
        occupy(&arbiter, &played);

        handle.submit(req(SpeechPriority::ChatReply, "chat_message", "hi chat"));
        handle.submit(req(SpeechPriority::Combat, "kill", "nice kill"));
        handle.submit(req(SpeechPriority::Donation, "donation", "thanks"));
        assert_eq!(handle.queue_len(), 2);

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        assert!(wait_until(1000, || played.lock().unwrap().len() == 3));
        assert_eq!(*played.lock().unwrap(), vec!["first", "thanks", "nice kill"]);
        arbiter.shutdown_and_join();
    }

    #[test]
    fn tts_failure_never_stalls_the_queue() {
        let played = Arc::new(Mutex::new(Vec::new()));
        let played_clone = Arc::clone(&played);
        let arbiter = Arbiter::spawn_with(
            8,
            Box::new(EchoTts {
                fail_on: Some("boom"),
            }),
            move || {
                Ok(RecordingSink {
                    played: played_clone,
                    gate: None,
                })
            },
        );
        let handle = arbiter.handle();
        handle.submit(req(SpeechPriority::Donation, "donation", "boom"));
        handle.submit(req(SpeechPriority::Combat, "kill", "still speaking"));

        assert!(wait_until(1000, || {
            played.lock().unwrap().as_slice() == ["still speaking"]
        }));
        arbiter.shutdown_and_join();
    }

    #[test]
    fn shutdown_finishes_current_and_discards_rest() {
        let (arbiter, played, release) = gated_arbiter(8);
        let handle = arbiter.handle();
        occupy(&arbiter, &played);

        handle.submit(req(SpeechPriority::Combat, "kill", "queued"));
        handle.shutdown();
        release.send(()).unwrap(); // let the in-flight utterance finish

        arbiter.shutdown_and_join();
        assert_eq!(*played.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn empty_synthesis_skips_playback() {
        let played = Arc::new(Mutex::new(Vec::new()));
        let played_clone = Arc::clone(&played);
        let arbiter = Arbiter::spawn_with(
            8,
            Box::new(crate::tts::PlaceholderTts),
            move || {
                Ok(RecordingSink {
                    played: played_clone,
                    gate: None,
                })
            },
        );
        let handle = arbiter.handle();
        handle.submit(req(SpeechPriority::Combat, "kill", "anything"));
        assert!(wait_until(500, || !handle.is_busy()));
        assert!(played.lock().unwrap().is_empty());
        arbiter.shutdown_and_join();
    }
}
