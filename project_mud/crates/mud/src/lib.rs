pub mod commands;
pub mod login;
pub mod plugins;

pub use commands::build_registry;
pub use login::PasswordLogin;
pub use plugins::{Pronouns, PronounsInitializer, RaceInitializer};
