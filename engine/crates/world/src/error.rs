use engine_core::PubSubError;

use crate::id::{PlayerId, SessionId};

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("player {0} is already online")]
    AlreadyOnline(PlayerId),

    #[error("player {0} is not online")]
    NotFound(PlayerId),

    #[error("player {player} is no longer bound to session {session}")]
    Superseded { player: PlayerId, session: SessionId },

    #[error(transparent)]
    PubSub(#[from] PubSubError),
}
