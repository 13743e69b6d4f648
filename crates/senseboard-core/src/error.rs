use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Room not found: {id}")]
    RoomNotFound { id: String },

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Personalization store error: {0}")]
    Profiles(String),

    #[error("AI provider error: {0}")]
    Provider(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SenseError {
    /// Short error code string for HTTP error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            SenseError::Config(_) => "CONFIG_ERROR",
            SenseError::RoomNotFound { .. } => "ROOM_NOT_FOUND",
            SenseError::Protocol(_) => "PROTOCOL_ERROR",
            SenseError::InvalidInput(_) => "INVALID_INPUT",
            SenseError::Profiles(_) => "PROFILES_ERROR",
            SenseError::Provider(_) => "PROVIDER_ERROR",
            SenseError::Transcription(_) => "TRANSCRIPTION_ERROR",
            SenseError::Serialization(_) => "SERIALIZATION_ERROR",
            SenseError::Io(_) => "IO_ERROR",
            SenseError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            SenseError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SenseError>;
