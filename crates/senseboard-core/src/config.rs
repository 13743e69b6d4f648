use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Wire protocol constants — must match the senseboard web client exactly
pub const WS_PROTOCOL: &str = "senseboard-ws-v1";
pub const DEFAULT_PORT: u16 = 4310;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT_SCAN_SPAN: u16 = 10;
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't ack in 10s

// AI pipeline pacing
pub const MIN_PATCH_INTERVAL_MS: i64 = 2_500; // floor between non-regenerate patches
pub const TRANSCRIPT_DEBOUNCE_MS: u64 = 500;
pub const MAIN_QUEUE_WAIT_TIMEOUT_MS: u64 = 6_000; // personal workers wait this long for main drain
pub const MAIN_QUEUE_POLL_MS: u64 = 80;
pub const QUEUE_BOUND: usize = 120; // per main queue and per personal queue

// Transcription gating
pub const MIN_AUDIO_BYTES: usize = 1_600; // below this the chunk is noise, reject pre-provider
pub const DEFAULT_TRANSCRIPT_WINDOW_SECS: u64 = 30;

/// Top-level config (senseboard.toml + SENSEBOARD_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SenseConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Ports tried on bind: `port`, `port+1`, … `port + port_scan_span - 1`.
    #[serde(default = "default_port_scan_span")]
    pub port_scan_span: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            port_scan_span: DEFAULT_PORT_SCAN_SPAN,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Which diagram generator backs the AI engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline lexical generator — no credentials, fully reproducible.
    Deterministic,
    Openai,
    CodexCli,
    Anthropic,
    /// First configured hosted provider, deterministic as last resort.
    #[default]
    Auto,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Deterministic => "deterministic",
            ProviderKind::Openai => "openai",
            ProviderKind::CodexCli => "codex_cli",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Auto => "auto",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_codex_model")]
    pub codex_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_transcription_model")]
    pub openai_transcription_model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Per provider-call timeout in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default)]
    pub review: ReviewConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Auto,
            openai_model: default_openai_model(),
            codex_model: default_codex_model(),
            anthropic_model: default_anthropic_model(),
            openai_transcription_model: default_transcription_model(),
            openai_api_key: None,
            anthropic_api_key: None,
            provider_timeout_ms: default_provider_timeout_ms(),
            review: ReviewConfig::default(),
        }
    }
}

/// Bounds for the confidence-driven revision loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Accepts either a 0–1 fraction or a 0–10 score; normalized by
    /// [`ReviewConfig::threshold`].
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl ReviewConfig {
    /// Threshold normalized to [0, 1]. Values above 1 are read on the 0–10
    /// scale; everything is clamped so a bad config can't disable the loop.
    pub fn threshold(&self) -> f64 {
        let raw = if self.confidence_threshold > 1.0 {
            self.confidence_threshold / 10.0
        } else {
            self.confidence_threshold
        };
        raw.clamp(0.0, 1.0)
    }

    pub fn revisions(&self) -> u32 {
        self.max_revisions.max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing level: debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Optional raw-audio dump for debugging the transcription path.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    #[serde(default, alias = "transcriptionChunks")]
    pub transcription_chunks: TranscriptionCaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionCaptureConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_capture_dir")]
    pub directory: String,
}

impl Default for TranscriptionCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_capture_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default = "default_profiles_path")]
    pub path: String,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            path: default_profiles_path(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_port_scan_span() -> u16 {
    DEFAULT_PORT_SCAN_SPAN
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_codex_model() -> String {
    "gpt-5-codex".to_string()
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_transcription_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}
fn default_provider_timeout_ms() -> u64 {
    45_000
}
fn default_max_revisions() -> u32 {
    20
}
fn default_confidence_threshold() -> f64 {
    0.98
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_capture_dir() -> String {
    ".senseboard/capture".to_string()
}
fn default_profiles_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.senseboard/profiles.db", home)
}

impl SenseConfig {
    /// Load config from a TOML file with SENSEBOARD_* env var overrides.
    ///
    /// Env keys use `__` as the section separator so snake_case keys survive:
    /// `SENSEBOARD_AI__OPENAI_API_KEY`, `SENSEBOARD_SERVER__PORT`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./senseboard.toml
    ///   3. ~/.senseboard/senseboard.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SenseConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SENSEBOARD_").split("__"))
            .extract()
            .map_err(|e| crate::error::SenseError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    if std::path::Path::new("senseboard.toml").exists() {
        return "senseboard.toml".to_string();
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.senseboard/senseboard.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_normalizes_ten_scale() {
        let review = ReviewConfig {
            max_revisions: 5,
            confidence_threshold: 9.8,
        };
        assert!((review.threshold() - 0.98).abs() < 1e-9);
    }

    #[test]
    fn threshold_passes_fraction_through() {
        let review = ReviewConfig {
            max_revisions: 5,
            confidence_threshold: 0.75,
        };
        assert!((review.threshold() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn threshold_clamps_garbage() {
        let review = ReviewConfig {
            max_revisions: 0,
            confidence_threshold: 42.0,
        };
        assert!((review.threshold() - 1.0).abs() < 1e-9);
        assert_eq!(review.revisions(), 1);
    }

    #[test]
    fn defaults_are_complete() {
        let cfg = SenseConfig::default();
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.ai.provider, ProviderKind::Auto);
        assert_eq!(cfg.ai.review.max_revisions, 20);
        assert!(!cfg.capture.transcription_chunks.enabled);
    }
}
