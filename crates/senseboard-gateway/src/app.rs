use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use senseboard_ai::{
    DeterministicTranscriber, DiagramEngine, OpenAiTranscriber, TranscriptionProvider,
};
use senseboard_core::config::SenseConfig;
use senseboard_core::types::now_ms;
use senseboard_profiles::ProfileStore;
use senseboard_rooms::RoomStore;
use senseboard_scheduler::AiScheduler;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: SenseConfig,
    pub store: Arc<RoomStore>,
    pub scheduler: AiScheduler,
    pub engine: Arc<DiagramEngine>,
    pub transcriber: Arc<dyn TranscriptionProvider>,
    pub profiles: Arc<ProfileStore>,
    /// Random per-process id; clients use it with `instanceStartedAt` to
    /// pick the freshest server among port-scan candidates.
    pub instance_id: String,
    pub started_at: i64,
}

impl AppState {
    pub fn new(config: SenseConfig) -> anyhow::Result<Self> {
        let store = Arc::new(RoomStore::new());
        let engine = Arc::new(DiagramEngine::from_config(&config.ai));
        let profiles = Arc::new(ProfileStore::open(&config.profiles.path)?);
        let scheduler = AiScheduler::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&profiles),
        );

        let transcriber: Arc<dyn TranscriptionProvider> = match &config.ai.openai_api_key {
            Some(key) => Arc::new(OpenAiTranscriber::new(
                key.clone(),
                config.ai.openai_transcription_model.clone(),
                config.ai.provider_timeout_ms,
            )),
            None => Arc::new(DeterministicTranscriber),
        };

        Ok(Self {
            config,
            store,
            scheduler,
            engine,
            transcriber,
            profiles,
            instance_id: uuid::Uuid::new_v4().to_string(),
            started_at: now_ms(),
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ai/preflight", get(crate::http::preflight::preflight_handler))
        .route("/rooms", post(crate::http::rooms::create_room))
        .route("/rooms/{id}", get(crate::http::rooms::get_room))
        .route("/rooms/{id}/ai-patch", post(crate::http::rooms::ai_patch))
        .route(
            "/rooms/{id}/transcribe",
            post(crate::http::transcribe::transcribe_handler),
        )
        .route(
            "/rooms/{id}/personal-board",
            get(crate::http::rooms::personal_board),
        )
        .route(
            "/rooms/{id}/personal-board/ai-patch",
            post(crate::http::rooms::personal_ai_patch),
        )
        .route(
            "/personalization/context",
            get(crate::http::personalization::get_context)
                .post(crate::http::personalization::append_context),
        )
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
