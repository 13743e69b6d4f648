use async_trait::async_trait;

/// Common interface for all diagram generators (OpenAI, Anthropic, codex
/// CLI, deterministic).
///
/// `generate` receives the full prompt pair and returns the provider's raw
/// reply text; the engine owns parsing and the revision loop.
#[async_trait]
pub trait DiagramProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// One full generation call. Implementations apply their own timeout.
    async fn generate(&self, system: &str, user: &str) -> Result<String, ProviderError>;

    /// Cheap self-check used by `GET /ai/preflight`: credentials present,
    /// binary on PATH, etc. No network round-trip.
    async fn preflight(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
