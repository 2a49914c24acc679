pub mod character;
pub mod error;
pub mod id;
pub mod inbox;
pub mod state;
pub mod store;

pub use character::Character;
pub use error::WorldError;
pub use id::{PlayerId, RoomId, SessionId, ZoneId};
pub use inbox::Inbox;
pub use state::{Location, OnlinePlayer, SessionBinding, WorldState};
pub use store::{CharacterStore, MemoryStore, StoreError};
