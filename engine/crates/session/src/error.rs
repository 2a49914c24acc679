use world::{StoreError, WorldError};

use crate::command::CommandError;
use crate::login::LoginError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("registration failed: {0}")]
    Registration(#[source] WorldError),

    #[error("command failed: {0}")]
    Command(#[source] CommandError),

    #[error("login failed: {0}")]
    Login(#[from] LoginError),

    #[error("character store: {0}")]
    Store(#[from] StoreError),
}
