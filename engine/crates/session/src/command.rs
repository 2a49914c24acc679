use std::collections::BTreeMap;
use std::sync::Arc;

use world::{PlayerId, WorldError, WorldState};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Shown to the player; the session keeps going.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error("command fault: {0}")]
    Fault(String),
}

impl CommandError {
    pub fn user(message: impl Into<String>) -> Self {
        CommandError::User(message.into())
    }

    pub fn fault(message: impl Into<String>) -> Self {
        CommandError::Fault(message.into())
    }

    pub fn is_user_facing(&self) -> bool {
        matches!(self, CommandError::User(_))
    }
}

/// Executes a player's verb against the world.
pub trait Dispatcher: Send + Sync {
    fn exec(
        &self,
        world: &WorldState,
        actor: &PlayerId,
        verb: &str,
        args: &[&str],
    ) -> Result<(), CommandError>;
}

/// Everything a command sees for one invocation.
pub struct CommandContext<'a> {
    pub world: &'a WorldState,
    pub actor: &'a PlayerId,
    pub verb: &'a str,
    pub args: &'a [&'a str],
}

impl CommandContext<'_> {
    /// Arguments re-joined with single spaces.
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }

    /// Publish a line to the acting player.
    pub fn reply(&self, message: &str) -> Result<(), CommandError> {
        self.world.send_to_player(self.actor, message)?;
        Ok(())
    }
}

pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// One-line usage shown by `help`.
    fn usage(&self) -> &str;

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError>;
}

/// Verb table. Lookup is case-insensitive; aliases point at a registered verb.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
    aliases: BTreeMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        let verb = command.name().to_lowercase();
        if self.commands.insert(verb.clone(), command).is_some() {
            tracing::warn!(%verb, "command replaced");
        }
    }

    pub fn alias(&mut self, alias: &str, verb: &str) {
        self.aliases.insert(alias.to_lowercase(), verb.to_lowercase());
    }

    pub fn lookup(&self, verb: &str) -> Option<&Arc<dyn Command>> {
        let verb = verb.to_lowercase();
        let target = self.aliases.get(&verb).unwrap_or(&verb);
        self.commands.get(target)
    }

    /// Registered commands in verb order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.commands.values()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Dispatcher for CommandRegistry {
    fn exec(
        &self,
        world: &WorldState,
        actor: &PlayerId,
        verb: &str,
        args: &[&str],
    ) -> Result<(), CommandError> {
        let command = self
            .lookup(verb)
            .ok_or_else(|| CommandError::user(format!("Huh? \"{verb}\" is not a command.")))?;
        tracing::debug!(player = %actor, verb = command.name(), args = args.len(), "dispatch");
        command.run(&CommandContext {
            world,
            actor,
            verb,
            args,
        })
    }
}
