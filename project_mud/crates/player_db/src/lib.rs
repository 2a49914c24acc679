pub mod credential;
pub mod db;
pub mod error;
mod schema;

pub use credential::{hash_password, verify_password};
pub use db::PlayerDb;
pub use error::PlayerDbError;
