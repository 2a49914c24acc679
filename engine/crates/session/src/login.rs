use async_trait::async_trait;
use net::Connection;
use world::{Character, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("connection closed during login")]
    Disconnected,

    #[error("too many failed password attempts")]
    TooManyAttempts,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("character initializer '{name}' failed: {reason}")]
    Initializer { name: String, reason: String },
}

/// Authenticates a connection and yields the character it plays.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self, conn: &mut Connection) -> Result<Character, LoginError>;
}

/// A plugin step run after login, before the player enters the world.
/// Implementations only prompt when their data is missing.
#[async_trait]
pub trait CharacterInitializer: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(
        &self,
        conn: &mut Connection,
        character: &mut Character,
    ) -> Result<(), LoginError>;
}

/// Write a prompt and read the trimmed answer.
pub async fn ask(conn: &mut Connection, prompt: &str) -> Result<String, LoginError> {
    conn.write_prompt(prompt).await?;
    match conn.read_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(LoginError::Disconnected),
    }
}
