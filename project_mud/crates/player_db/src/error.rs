use thiserror::Error;
use world::StoreError;

#[derive(Debug, Error)]
pub enum PlayerDbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt document for {id}: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid password")]
    InvalidPassword,

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PlayerDbError> for StoreError {
    fn from(e: PlayerDbError) -> Self {
        match e {
            PlayerDbError::Corrupt { .. } => StoreError::Corrupt(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
