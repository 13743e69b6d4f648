use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Profile not found: {name_key}")]
    NotFound { name_key: String },

    #[error("Invalid profile input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;
