use std::sync::Arc;

use engine_core::WORLD_SUBJECT;
use session::{Command, CommandContext, CommandError, CommandRegistry};
use world::{Location, PlayerId, WorldError, WorldState};

fn actor_name(ctx: &CommandContext<'_>) -> Result<String, CommandError> {
    ctx.world
        .get_player(ctx.actor)
        .map(|player| player.name())
        .ok_or_else(|| WorldError::NotFound(ctx.actor.clone()).into())
}

fn actor_location(ctx: &CommandContext<'_>) -> Result<Location, CommandError> {
    ctx.world
        .get_player(ctx.actor)
        .map(|player| player.location())
        .ok_or_else(|| WorldError::NotFound(ctx.actor.clone()).into())
}

/// Room heading plus everyone else standing in it.
fn describe_room(world: &WorldState, viewer: &PlayerId, location: &Location) -> String {
    let others: Vec<String> = world
        .players_in_room(location)
        .iter()
        .filter(|player| player.id() != viewer)
        .map(|player| player.name())
        .collect();

    let mut text = format!("[{}] {}", location.zone, location.room);
    if others.is_empty() {
        text.push_str("\nYou are alone here.");
    } else {
        text.push_str(&format!("\nAlso here: {}.", others.join(", ")));
    }
    text
}

/// Move the actor, announcing departure and arrival to the two rooms.
fn relocate(ctx: &CommandContext<'_>, to: Location) -> Result<(), CommandError> {
    let name = actor_name(ctx)?;
    let from = actor_location(ctx)?;
    if from == to {
        return Err(CommandError::user("You are already there."));
    }

    // Arrival goes out before the move so the actor does not hear it.
    ctx.world.publish(&to.room_subject(), &format!("{name} arrives."))?;
    ctx.world.move_player(ctx.actor, to.clone())?;
    ctx.world.publish(&from.room_subject(), &format!("{name} leaves."))?;

    ctx.reply(&describe_room(ctx.world, ctx.actor, &to))
}

pub struct Look;

impl Command for Look {
    fn name(&self) -> &str {
        "look"
    }

    fn usage(&self) -> &str {
        "look - describe your surroundings"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let location = actor_location(ctx)?;
        ctx.reply(&describe_room(ctx.world, ctx.actor, &location))
    }
}

pub struct Say;

impl Command for Say {
    fn name(&self) -> &str {
        "say"
    }

    fn usage(&self) -> &str {
        "say <message> - speak to the room"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        if ctx.args.is_empty() {
            return Err(CommandError::user("Say what?"));
        }
        let name = actor_name(ctx)?;
        let location = actor_location(ctx)?;
        ctx.world
            .publish(&location.room_subject(), &format!("{name} says, \"{}\"", ctx.rest()))?;
        Ok(())
    }
}

pub struct Shout;

impl Command for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    fn usage(&self) -> &str {
        "shout <message> - speak to everyone online"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        if ctx.args.is_empty() {
            return Err(CommandError::user("Shout what?"));
        }
        let name = actor_name(ctx)?;
        ctx.world
            .publish(WORLD_SUBJECT, &format!("{name} shouts, \"{}\"", ctx.rest()))?;
        Ok(())
    }
}

pub struct Tell;

impl Command for Tell {
    fn name(&self) -> &str {
        "tell"
    }

    fn usage(&self) -> &str {
        "tell <player> <message> - speak privately"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let [target, words @ ..] = ctx.args else {
            return Err(CommandError::user("Tell whom what?"));
        };
        if words.is_empty() {
            return Err(CommandError::user("Tell them what?"));
        }
        let target_id = PlayerId::new(target);
        if &target_id == ctx.actor {
            return Err(CommandError::user("Talking to yourself again?"));
        }
        let Some(target) = ctx.world.get_player(&target_id) else {
            return Err(CommandError::user(format!("No one called {target} is online.")));
        };

        let message = words.join(" ");
        let name = actor_name(ctx)?;
        ctx.world
            .send_to_player(&target_id, &format!("{name} tells you, \"{message}\""))?;
        ctx.reply(&format!("You tell {}, \"{message}\"", target.name()))
    }
}

pub struct Who;

impl Command for Who {
    fn name(&self) -> &str {
        "who"
    }

    fn usage(&self) -> &str {
        "who - list players online"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let mut names = Vec::new();
        ctx.world.for_each_player(|player| names.push(player.name()));
        names.sort();

        let mut text = format!("Players online ({}):", names.len());
        for name in names {
            text.push_str(&format!("\n  {name}"));
        }
        ctx.reply(&text)
    }
}

pub struct Go;

impl Command for Go {
    fn name(&self) -> &str {
        "go"
    }

    fn usage(&self) -> &str {
        "go <room> - walk to another room in this zone"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let [room] = ctx.args else {
            return Err(CommandError::user("Go where?"));
        };
        let zone = actor_location(ctx)?.zone;
        relocate(ctx, Location::new(zone, *room))
    }
}

pub struct Travel;

impl Command for Travel {
    fn name(&self) -> &str {
        "travel"
    }

    fn usage(&self) -> &str {
        "travel <zone> <room> - journey to another zone"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let [zone, room] = ctx.args else {
            return Err(CommandError::user("Travel where? Usage: travel <zone> <room>"));
        };
        relocate(ctx, Location::new(*zone, *room))
    }
}

pub struct Quit;

impl Command for Quit {
    fn name(&self) -> &str {
        "quit"
    }

    fn usage(&self) -> &str {
        "quit - leave the game"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        ctx.world.set_quit(ctx.actor)?;
        Ok(())
    }
}

/// Lists the usages captured when the registry was built.
pub struct Help {
    lines: Vec<String>,
}

impl Command for Help {
    fn name(&self) -> &str {
        "help"
    }

    fn usage(&self) -> &str {
        "help - show this list"
    }

    fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let mut text = String::from("Commands:");
        for line in &self.lines {
            text.push_str(&format!("\n  {line}"));
        }
        ctx.reply(&text)
    }
}

/// Registry with every built-in verb and its aliases.
pub fn build_registry() -> CommandRegistry {
    let commands: Vec<Arc<dyn Command>> = vec![
        Arc::new(Look),
        Arc::new(Say),
        Arc::new(Shout),
        Arc::new(Tell),
        Arc::new(Who),
        Arc::new(Go),
        Arc::new(Travel),
        Arc::new(Quit),
    ];

    let mut registry = CommandRegistry::new();
    for command in commands {
        registry.register(command);
    }
    let mut lines: Vec<String> = registry.commands().map(|c| c.usage().to_string()).collect();
    lines.push(Help { lines: Vec::new() }.usage().to_string());
    lines.sort();
    registry.register(Arc::new(Help { lines }));
    registry.alias("l", "look");
    registry.alias("?", "help");
    registry
}
