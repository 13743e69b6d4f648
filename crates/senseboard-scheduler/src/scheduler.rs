//! Queue mechanics and the worker loops.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use senseboard_ai::{collect_ai_input, has_ai_signal, DiagramEngine};
use senseboard_core::config::{
    MAIN_QUEUE_POLL_MS, MAIN_QUEUE_WAIT_TIMEOUT_MS, MIN_PATCH_INTERVAL_MS, QUEUE_BOUND,
    TRANSCRIPT_DEBOUNCE_MS,
};
use senseboard_core::types::{now_ms, RoomId};
use senseboard_profiles::ProfileStore;
use senseboard_protocol::frames::AiStatus;
use senseboard_rooms::{AiPatchMeta, RoomStore};

use crate::types::{PatchOutcome, PatchReason, PatchRequest};

struct Job {
    request: PatchRequest,
    /// Member name key for personalized jobs.
    member: Option<String>,
    resolver: Option<oneshot::Sender<PatchOutcome>>,
}

impl Job {
    fn resolve(mut self, outcome: PatchOutcome) {
        if let Some(tx) = self.resolver.take() {
            let _ = tx.send(outcome);
        }
    }
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    running: bool,
}

struct SchedulerInner {
    store: Arc<RoomStore>,
    engine: Arc<DiagramEngine>,
    profiles: Arc<ProfileStore>,
    queues: Mutex<HashMap<String, QueueState>>,
    debouncers: Mutex<HashMap<String, JoinHandle<()>>>,
    min_interval_ms: i64,
    debounce_ms: u64,
}

/// Handle shared by the transport and the transcript path. Cloneable; all
/// clones drive the same queues.
#[derive(Clone)]
pub struct AiScheduler {
    inner: Arc<SchedulerInner>,
}

impl AiScheduler {
    pub fn new(
        store: Arc<RoomStore>,
        engine: Arc<DiagramEngine>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                engine,
                profiles,
                queues: Mutex::new(HashMap::new()),
                debouncers: Mutex::new(HashMap::new()),
                min_interval_ms: MIN_PATCH_INTERVAL_MS,
                debounce_ms: TRANSCRIPT_DEBOUNCE_MS,
            }),
        }
    }

    /// Test hook: shrink the pacing knobs so suites don't sleep for real.
    #[doc(hidden)]
    pub fn with_pacing(
        store: Arc<RoomStore>,
        engine: Arc<DiagramEngine>,
        profiles: Arc<ProfileStore>,
        min_interval_ms: i64,
        debounce_ms: u64,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                engine,
                profiles,
                queues: Mutex::new(HashMap::new()),
                debouncers: Mutex::new(HashMap::new()),
                min_interval_ms,
                debounce_ms,
            }),
        }
    }

    /// Enqueue on the main queue and await the job's resolution.
    pub async fn submit_main(&self, request: PatchRequest) -> PatchOutcome {
        match self.inner.enqueue_main(request) {
            Enqueued::Immediate(outcome) => outcome,
            Enqueued::Pending(rx) => rx
                .await
                .unwrap_or_else(|_| PatchOutcome::skipped("ai_error")),
        }
    }

    /// Enqueue on the main queue without waiting for the result.
    pub fn submit_main_detached(&self, request: PatchRequest) {
        let _ = self.inner.enqueue_main(request);
    }

    /// Enqueue a personalized job; resolves immediately as queued
    /// (fire-and-forget semantics at the HTTP surface).
    pub fn submit_personal_detached(&self, request: PatchRequest, member_key: &str) {
        self.inner.enqueue_personal(request, member_key);
    }

    /// Enqueue a personalized job and await it (used by tests).
    #[doc(hidden)]
    pub async fn submit_personal(&self, request: PatchRequest, member_key: &str) -> PatchOutcome {
        match self.inner.enqueue_personal(request, member_key) {
            Enqueued::Immediate(outcome) => outcome,
            Enqueued::Pending(rx) => rx
                .await
                .unwrap_or_else(|_| PatchOutcome::skipped("ai_error")),
        }
    }

    /// Reset the room's debounce timer. On expiry, one main tick fires plus
    /// one personalized tick per distinct connected member name.
    pub fn note_transcript(&self, room_id: &RoomId) {
        let inner = Arc::clone(&self.inner);
        let key = room_id.as_str().to_string();
        let room_id = room_id.clone();

        let mut debouncers = self.inner.debouncers.lock().unwrap();
        if let Some(previous) = debouncers.remove(&key) {
            previous.abort();
        }
        let delay = self.inner.debounce_ms;
        debouncers.insert(
            key,
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                let members = inner
                    .store
                    .with_room(&room_id, |room| room.member_name_keys())
                    .unwrap_or_default();
                let _ = inner.enqueue_main(PatchRequest::tick(room_id.clone()));
                for member in members {
                    inner.enqueue_personal(PatchRequest::tick(room_id.clone()), &member);
                }
            }),
        );
    }

    /// True when the main queue for the room has nothing queued or running.
    pub fn main_queue_idle(&self, room_id: &RoomId) -> bool {
        self.inner.queue_idle(room_id.as_str())
    }
}

enum Enqueued {
    Immediate(PatchOutcome),
    Pending(oneshot::Receiver<PatchOutcome>),
}

impl SchedulerInner {
    fn enqueue_main(self: &Arc<Self>, request: PatchRequest) -> Enqueued {
        let key = request.room_id.as_str().to_string();
        self.enqueue(key, request, None)
    }

    fn enqueue_personal(self: &Arc<Self>, request: PatchRequest, member_key: &str) -> Enqueued {
        let key = format!("{}::{}", request.room_id.as_str(), member_key);
        self.enqueue(key, request, Some(member_key.to_string()))
    }

    fn queue_idle(&self, key: &str) -> bool {
        let queues = self.queues.lock().unwrap();
        queues
            .get(key)
            .map(|q| !q.running && q.jobs.is_empty())
            .unwrap_or(true)
    }

    /// Queue admission: coalesce redundant ticks, shed on overflow, append,
    /// and make sure a worker is draining.
    fn enqueue(
        self: &Arc<Self>,
        key: String,
        request: PatchRequest,
        member: Option<String>,
    ) -> Enqueued {
        let (tx, rx) = oneshot::channel();
        let mut start_worker = false;
        {
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(key.clone()).or_default();

            if request.coalescible()
                && state.jobs.iter().any(|job| job.request.coalescible())
            {
                return Enqueued::Immediate(PatchOutcome::skipped("queued"));
            }

            while state.jobs.len() >= QUEUE_BOUND {
                if let Some(evicted) = state.jobs.pop_front() {
                    evicted.resolve(PatchOutcome::skipped("queue_overflow"));
                }
            }

            state.jobs.push_back(Job {
                request,
                member,
                resolver: Some(tx),
            });
            if !state.running {
                state.running = true;
                start_worker = true;
            }
        }

        if start_worker {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.drain(key).await });
        }
        Enqueued::Pending(rx)
    }

    /// Worker loop: pop → run → repeat until the queue is empty. The
    /// `running` flag flips back under the same lock that observed the empty
    /// queue, so a second worker can never start while one is active.
    async fn drain(self: Arc<Self>, key: String) {
        loop {
            let job = {
                let mut queues = self.queues.lock().unwrap();
                let state = queues.entry(key.clone()).or_default();
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        state.running = false;
                        return;
                    }
                }
            };

            let member = job.member.clone();
            let outcome = match member {
                Some(member_key) => self.run_personal_job(&job.request, &member_key).await,
                None => self.run_main_job(&job.request).await,
            };
            debug!(queue = %key, applied = outcome.applied, reason = ?outcome.reason, "job resolved");
            job.resolve(outcome);
        }
    }

    async fn run_main_job(&self, request: &PatchRequest) -> PatchOutcome {
        let room_id = &request.room_id;
        if !self.store.exists(room_id) {
            return PatchOutcome::skipped("room_not_found");
        }

        let frozen = self
            .store
            .with_room(room_id, |room| room.ai.frozen)
            .unwrap_or(false);
        if frozen && !request.regenerate {
            return PatchOutcome::skipped("frozen");
        }

        if !request.regenerate {
            let last = self
                .store
                .with_room(room_id, |room| room.last_ai_patch_at)
                .unwrap_or(0);
            let wait = (self.min_interval_ms - (now_ms() - last)).max(0);
            if wait > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(wait as u64)).await;
            }
        }

        if request.reason == PatchReason::Tick {
            let live = self
                .store
                .with_room(room_id, |room| {
                    has_ai_signal(room, request.window_seconds, now_ms())
                })
                .unwrap_or(false);
            if !live {
                self.store.set_ai_status(room_id, AiStatus::Idle);
                return PatchOutcome::skipped("no_signal");
            }
        }

        self.store.set_ai_status(room_id, AiStatus::Updating);

        let Some(input) = self.store.with_room(room_id, |room| {
            collect_ai_input(room, request.window_seconds, now_ms(), None)
        }) else {
            return PatchOutcome::skipped("room_not_found");
        };

        let reply = match self.engine.generate(&input, now_ms()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(room = %room_id, error = %e, "engine failed");
                self.store.set_ai_status(room_id, AiStatus::Idle);
                return PatchOutcome::skipped("ai_error");
            }
        };

        if request.reason == PatchReason::Tick && !request.regenerate {
            let previous = self
                .store
                .with_room(room_id, |room| room.last_ai_fingerprint)
                .unwrap_or(0);
            if previous == reply.fingerprint {
                self.store.set_ai_status(room_id, AiStatus::Idle);
                return PatchOutcome::skipped("no_change");
            }
        }

        let meta = AiPatchMeta {
            reason: request.reason.to_string(),
            provider: reply.provider.clone(),
            confidence: Some(reply.confidence),
            topic: reply.topic.clone(),
            fingerprint: reply.fingerprint,
        };
        let result = self.store.apply_ai_patch(room_id, reply.ops, meta);
        self.store.set_ai_status(room_id, AiStatus::Idle);

        match result {
            Some(applied) if applied.changed => {
                self.store.broadcast(room_id);
                PatchOutcome::applied(applied.revision)
            }
            Some(_) => PatchOutcome::skipped("no_change"),
            None => PatchOutcome::skipped("room_not_found"),
        }
    }

    /// Personal boards lag behind the shared board: wait (bounded) for the
    /// room's main queue to drain, then mirror the main worker against the
    /// member's own board state.
    async fn run_personal_job(&self, request: &PatchRequest, member_key: &str) -> PatchOutcome {
        let room_id = &request.room_id;
        if !self.store.exists(room_id) {
            return PatchOutcome::skipped("room_not_found");
        }

        let deadline = std::time::Duration::from_millis(MAIN_QUEUE_WAIT_TIMEOUT_MS);
        let waited = tokio::time::timeout(deadline, async {
            while !self.queue_idle(room_id.as_str()) {
                tokio::time::sleep(std::time::Duration::from_millis(MAIN_QUEUE_POLL_MS)).await;
            }
        })
        .await;
        if waited.is_err() {
            debug!(room = %room_id, member = member_key, "main queue still busy, proceeding");
        }

        let frozen = self
            .store
            .with_room(room_id, |room| room.ai.frozen)
            .unwrap_or(false);
        if frozen && !request.regenerate {
            return PatchOutcome::skipped("frozen");
        }

        if !request.regenerate {
            let last = self
                .store
                .with_room(room_id, |room| {
                    room.personal
                        .get(member_key)
                        .map(|p| p.last_ai_patch_at)
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            let wait = (self.min_interval_ms - (now_ms() - last)).max(0);
            if wait > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(wait as u64)).await;
            }
        }

        if request.reason == PatchReason::Tick {
            let live = self
                .store
                .with_room(room_id, |room| {
                    has_ai_signal(room, request.window_seconds, now_ms())
                })
                .unwrap_or(false);
            if !live {
                return PatchOutcome::skipped("no_signal");
            }
        }

        let member_context = self
            .profiles
            .get(member_key)
            .ok()
            .flatten()
            .map(|profile| profile.context_lines)
            .unwrap_or_default();

        let Some(input) = self.store.with_room(room_id, |room| {
            collect_ai_input(
                room,
                request.window_seconds,
                now_ms(),
                Some((member_key, member_context)),
            )
        }) else {
            return PatchOutcome::skipped("room_not_found");
        };

        let reply = match self.engine.generate(&input, now_ms()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(room = %room_id, member = member_key, error = %e, "personal engine failed");
                return PatchOutcome::skipped("ai_error");
            }
        };

        if request.reason == PatchReason::Tick && !request.regenerate {
            let previous = self
                .store
                .with_room(room_id, |room| {
                    room.personal
                        .get(member_key)
                        .map(|p| p.last_ai_fingerprint)
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            if previous == reply.fingerprint {
                return PatchOutcome::skipped("no_change");
            }
        }

        match self
            .store
            .apply_personal_ai_patch(room_id, member_key, reply.ops, reply.fingerprint)
        {
            Some(applied) if applied.changed => PatchOutcome::applied(applied.revision),
            Some(_) => PatchOutcome::skipped("no_change"),
            None => PatchOutcome::skipped("room_not_found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use senseboard_ai::{DiagramProvider, ProviderError};
    use senseboard_core::config::ReviewConfig;
    use senseboard_protocol::frames::{AiConfigUpdatePayload, ClientFrame};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fixture() -> (Arc<RoomStore>, AiScheduler) {
        let store = Arc::new(RoomStore::new());
        let engine = Arc::new(DiagramEngine::deterministic());
        let profiles = Arc::new(ProfileStore::open_in_memory().unwrap());
        let scheduler = AiScheduler::with_pacing(Arc::clone(&store), engine, profiles, 0, 30);
        (store, scheduler)
    }

    fn seed_transcript(store: &RoomStore, id: &RoomId) {
        let _ = store.add_transcript(id, Some("Alex"), "tree with root A");
        let _ = store.add_transcript(id, Some("Alex"), "children B and C");
    }

    #[tokio::test]
    async fn manual_job_applies_ops_and_bumps_revision() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let outcome = scheduler
            .submit_main(PatchRequest::manual(id.clone(), false))
            .await;
        assert!(outcome.applied, "{outcome:?}");
        assert!(outcome.revision.unwrap() > 0);

        store.with_room(&id, |room| {
            assert!(room.board.len() >= 5);
            assert!(room.last_ai_patch_at > 0);
            assert_eq!(room.ai.status, AiStatus::Idle);
        }).unwrap();
    }

    #[tokio::test]
    async fn tick_without_signal_resolves_no_signal() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        let outcome = scheduler.submit_main(PatchRequest::tick(id)).await;
        assert_eq!(outcome.reason.as_deref(), Some("no_signal"));
    }

    #[tokio::test]
    async fn tick_coalescing_resolves_extras_as_queued() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let mut receivers = Vec::new();
        for _ in 0..10 {
            receivers.push(scheduler.inner.enqueue_main(PatchRequest::tick(id.clone())));
        }

        let mut queued = 0;
        let mut settled = 0;
        for enq in receivers {
            let outcome = match enq {
                Enqueued::Immediate(outcome) => outcome,
                Enqueued::Pending(rx) => rx.await.unwrap(),
            };
            if outcome.reason.as_deref() == Some("queued") {
                queued += 1;
            } else {
                settled += 1;
            }
        }
        assert_eq!(settled, 1);
        assert_eq!(queued, 9);
    }

    #[tokio::test]
    async fn frozen_room_skips_unless_regenerate() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);
        let _ = store.apply_message(
            &id,
            "Alex",
            ClientFrame::AiConfigUpdate(AiConfigUpdatePayload {
                frozen: Some(true),
                ..Default::default()
            }),
        );

        let outcome = scheduler
            .submit_main(PatchRequest::manual(id.clone(), false))
            .await;
        assert_eq!(outcome.reason.as_deref(), Some("frozen"));
        store.with_room(&id, |room| assert!(room.board.is_empty())).unwrap();

        let outcome = scheduler
            .submit_main(PatchRequest::manual(id.clone(), true))
            .await;
        assert!(outcome.applied, "{outcome:?}");
        store.with_room(&id, |room| assert!(!room.board.is_empty())).unwrap();
    }

    #[tokio::test]
    async fn repeated_tick_with_same_input_is_no_change() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let first = scheduler.submit_main(PatchRequest::tick(id.clone())).await;
        assert!(first.applied);
        let second = scheduler.submit_main(PatchRequest::tick(id.clone())).await;
        assert_eq!(second.reason.as_deref(), Some("no_change"));
    }

    #[tokio::test]
    async fn debounce_fires_one_tick_after_the_burst() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");

        let _ = store.add_transcript(&id, Some("Alex"), "tree with root A");
        scheduler.note_transcript(&id);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let _ = store.add_transcript(&id, Some("Alex"), "children B and C");
        scheduler.note_transcript(&id);

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;

        store.with_room(&id, |room| {
            let rects = room
                .board
                .iter_ordered()
                .filter(|el| el.kind() == "rect")
                .count();
            let arrows = room
                .board
                .iter_ordered()
                .filter(|el| el.kind() == "arrow")
                .count();
            assert!(rects >= 3, "want >=3 rects, got {rects}");
            assert!(arrows >= 2, "want >=2 arrows, got {arrows}");
            assert_eq!(room.ai_history.len(), 1, "exactly one applied patch");
        }).unwrap();
    }

    #[tokio::test]
    async fn queue_overflow_sheds_oldest() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        // fill the queue with non-coalescible manual jobs
        let mut receivers = Vec::new();
        for _ in 0..(QUEUE_BOUND + 5) {
            receivers.push(scheduler.inner.enqueue_main(PatchRequest::manual(id.clone(), true)));
        }
        let mut overflowed = 0;
        for enq in receivers {
            let outcome = match enq {
                Enqueued::Immediate(outcome) => outcome,
                Enqueued::Pending(rx) => rx.await.unwrap(),
            };
            if outcome.reason.as_deref() == Some("queue_overflow") {
                overflowed += 1;
            }
        }
        assert!(overflowed >= 5, "got {overflowed}");
    }

    struct GateProvider {
        active: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl DiagramProvider for GateProvider {
        fn name(&self) -> &str {
            "gate"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({
                "topic": "t",
                "diagramType": "tree",
                "confidence": 1.0,
                "actions": [{ "kind": "upsertNode", "id": "n", "label": "N" }],
            })
            .to_string())
        }
    }

    #[tokio::test]
    async fn single_flight_per_queue() {
        let provider = Arc::new(GateProvider {
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        });
        let engine = Arc::new(DiagramEngine::with_provider(
            provider.clone(),
            ReviewConfig::default(),
        ));
        let store = Arc::new(RoomStore::new());
        let profiles = Arc::new(ProfileStore::open_in_memory().unwrap());
        let scheduler = AiScheduler::with_pacing(Arc::clone(&store), engine, profiles, 0, 30);
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let scheduler = scheduler.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                scheduler.submit_main(PatchRequest::manual(id, true)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(provider.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn personal_job_waits_for_main_and_uses_own_board() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let main = scheduler
            .submit_main(PatchRequest::manual(id.clone(), false))
            .await;
        assert!(main.applied);

        let personal = scheduler
            .submit_personal(PatchRequest::manual(id.clone(), false), "alex")
            .await;
        assert!(personal.applied, "{personal:?}");

        store.with_room(&id, |room| {
            let personal = room.personal.get("alex").unwrap();
            assert!(personal.board.len() >= 5);
            // the shared board is untouched by the personal patch
            assert!(room.board.revision > 0);
            assert_ne!(
                personal.board.revision, 0,
                "personal board should have its own revisions"
            );
        }).unwrap();
    }

    #[tokio::test]
    async fn personal_fingerprint_suppresses_repeat_ticks() {
        let (store, scheduler) = fixture();
        let id = store.get_or_create("R1");
        seed_transcript(&store, &id);

        let first = scheduler
            .submit_personal(PatchRequest::tick(id.clone()), "alex")
            .await;
        assert!(first.applied);
        let second = scheduler
            .submit_personal(PatchRequest::tick(id.clone()), "alex")
            .await;
        assert_eq!(second.reason.as_deref(), Some("no_change"));
    }

    #[tokio::test]
    async fn unknown_room_resolves_room_not_found() {
        let (_store, scheduler) = fixture();
        let ghost = RoomId::normalize("GHOST");
        let outcome = scheduler
            .submit_main(PatchRequest::manual(ghost, false))
            .await;
        assert_eq!(outcome.reason.as_deref(), Some("room_not_found"));
    }
}
