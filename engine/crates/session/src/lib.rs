pub mod command;
pub mod error;
pub mod login;
pub mod manager;
pub mod session;

pub use command::{Command, CommandContext, CommandError, CommandRegistry, Dispatcher};
pub use error::SessionError;
pub use login::{ask, CharacterInitializer, LoginError, LoginFlow};
pub use manager::{SessionConfig, SessionManager};
pub use session::{Session, SessionEnd};
