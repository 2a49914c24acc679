use std::sync::Arc;

use async_trait::async_trait;
use net::Connection;
use session::{ask, LoginError, LoginFlow};
use world::{Character, CharacterStore, PlayerId};

const NAME_PROMPT: &str = "By what name do you wish to be known? ";
const MAX_PASSWORD_ATTEMPTS: u32 = 3;

/// Name + password login. Unknown names go through character creation.
pub struct PasswordLogin {
    store: Arc<dyn CharacterStore>,
    starting_hp: i32,
}

impl PasswordLogin {
    pub fn new(store: Arc<dyn CharacterStore>, starting_hp: i32) -> Self {
        Self { store, starting_hp }
    }

    async fn existing(&self, conn: &mut Connection, character: Character) -> Result<Character, LoginError> {
        for attempt in 1..=MAX_PASSWORD_ATTEMPTS {
            let password = ask(conn, "Password: ").await?;
            if player_db::verify_password(&password, &character.credential).is_ok() {
                conn.write_line(&format!("\nWelcome back, {}.", character.name)).await?;
                return Ok(character);
            }
            tracing::info!(player = %character.name, attempt, "wrong password");
            conn.write_line("Wrong password.").await?;
        }
        Err(LoginError::TooManyAttempts)
    }

    async fn create(&self, conn: &mut Connection, name: String) -> Result<Character, LoginError> {
        conn.write_line(&format!("Welcome, {name}. Let's create your character."))
            .await?;
        let password = loop {
            let password = ask(conn, "Choose a password: ").await?;
            if password.is_empty() {
                conn.write_line("Your password cannot be empty.").await?;
                continue;
            }
            let confirm = ask(conn, "Confirm password: ").await?;
            if password == confirm {
                break password;
            }
            conn.write_line("Passwords do not match.").await?;
        };

        let credential = player_db::hash_password(&password)
            .map_err(|e| LoginError::Credential(e.to_string()))?;
        tracing::info!(player = %name, "new character created");
        Ok(Character::new(name, credential, self.starting_hp))
    }
}

#[async_trait]
impl LoginFlow for PasswordLogin {
    async fn login(&self, conn: &mut Connection) -> Result<Character, LoginError> {
        let name = loop {
            let answer = ask(conn, NAME_PROMPT).await?;
            match normalize_name(&answer) {
                Some(name) => break name,
                None => conn.write_line("Names must be 2 to 20 letters.").await?,
            }
        };

        match self.store.get(&PlayerId::new(&name))? {
            Some(character) => self.existing(conn, character).await,
            None => self.create(conn, name).await,
        }
    }
}

/// `kAEL` becomes `Kael`. `None` unless 2-20 ASCII letters.
pub fn normalize_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !(2..=20).contains(&raw.len()) || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    let mut chars = lower.chars();
    let first = chars.next()?;
    Some(first.to_ascii_uppercase().to_string() + chars.as_str())
}
