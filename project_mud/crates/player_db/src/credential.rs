use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;

use crate::error::PlayerDbError;

/// Hash a password into a PHC string for the character's `credential` field.
pub fn hash_password(password: &str) -> Result<String, PlayerDbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PlayerDbError::HashError(e.to_string()))
}

pub fn verify_password(password: &str, credential: &str) -> Result<(), PlayerDbError> {
    let parsed =
        PasswordHash::new(credential).map_err(|e| PlayerDbError::HashError(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PlayerDbError::InvalidPassword)
}
