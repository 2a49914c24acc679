use async_trait::async_trait;
use net::Connection;
use serde::{Deserialize, Serialize};
use session::{ask, CharacterInitializer, LoginError};
use world::Character;

pub const PRONOUNS_KEY: &str = "pronouns";
pub const RACE_KEY: &str = "race";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pronouns {
    pub subject: String,
    pub object: String,
    pub possessive: String,
}

/// Menu label plus subject/object/possessive forms.
const PRONOUN_SETS: [(&str, [&str; 3]); 4] = [
    ("he/him", ["he", "him", "his"]),
    ("she/her", ["she", "her", "her"]),
    ("they/them", ["they", "them", "their"]),
    ("it/its", ["it", "it", "its"]),
];

impl Pronouns {
    fn from_forms([subject, object, possessive]: [&str; 3]) -> Self {
        Self {
            subject: subject.to_string(),
            object: object.to_string(),
            possessive: possessive.to_string(),
        }
    }
}

/// Show a numbered menu until the player picks an entry by number or name.
async fn choose(
    conn: &mut Connection,
    title: &str,
    prompt: &str,
    options: &[String],
) -> Result<usize, LoginError> {
    loop {
        let mut menu = format!("\n{title}\n");
        for (i, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}) {}\n", i + 1, option));
        }
        conn.write_text(&menu).await?;

        let answer = ask(conn, prompt).await?;
        if let Some(index) = parse_choice(&answer, options) {
            return Ok(index);
        }
        conn.write_line("That is not a valid choice.").await?;
    }
}

fn parse_choice(answer: &str, options: &[String]) -> Option<usize> {
    if let Ok(n) = answer.parse::<usize>() {
        return (1..=options.len()).contains(&n).then(|| n - 1);
    }
    options
        .iter()
        .position(|option| option.eq_ignore_ascii_case(answer))
}

fn encode_error(name: &str) -> impl FnOnce(serde_json::Error) -> LoginError + '_ {
    move |e| LoginError::Initializer {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

pub struct PronounsInitializer;

#[async_trait]
impl CharacterInitializer for PronounsInitializer {
    fn name(&self) -> &str {
        PRONOUNS_KEY
    }

    async fn initialize(&self, conn: &mut Connection, character: &mut Character) -> Result<(), LoginError> {
        if character.has_extension(PRONOUNS_KEY) {
            return Ok(());
        }
        let labels: Vec<String> = PRONOUN_SETS.iter().map(|(label, _)| label.to_string()).collect();
        let index = choose(conn, "How should others refer to you?", "Choose your pronouns: ", &labels).await?;
        let pronouns = Pronouns::from_forms(PRONOUN_SETS[index].1);
        character
            .set_extension(PRONOUNS_KEY, &pronouns)
            .map_err(encode_error(PRONOUNS_KEY))
    }
}

pub struct RaceInitializer {
    races: Vec<String>,
}

impl RaceInitializer {
    pub fn new(races: Vec<String>) -> Self {
        Self { races }
    }
}

#[async_trait]
impl CharacterInitializer for RaceInitializer {
    fn name(&self) -> &str {
        RACE_KEY
    }

    async fn initialize(&self, conn: &mut Connection, character: &mut Character) -> Result<(), LoginError> {
        if character.has_extension(RACE_KEY) || self.races.is_empty() {
            return Ok(());
        }
        let index = choose(conn, "Which race are you?", "Choose your race: ", &self.races).await?;
        character
            .set_extension(RACE_KEY, &self.races[index].to_lowercase())
            .map_err(encode_error(RACE_KEY))
    }
}
