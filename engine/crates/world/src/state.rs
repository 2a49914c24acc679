use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use engine_core::{
    player_subject, room_subject, signal_channel, zone_subject, Listener, PubSub, Subscription,
    Trigger, WORLD_SUBJECT,
};

use crate::character::Character;
use crate::error::WorldError;
use crate::id::{PlayerId, RoomId, SessionId, ZoneId};
use crate::inbox::Inbox;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub zone: ZoneId,
    pub room: RoomId,
}

impl Location {
    pub fn new(zone: impl Into<ZoneId>, room: impl Into<RoomId>) -> Self {
        Self {
            zone: zone.into(),
            room: room.into(),
        }
    }

    pub fn zone_subject(&self) -> String {
        zone_subject(&self.zone)
    }

    pub fn room_subject(&self) -> String {
        room_subject(&self.zone, &self.room)
    }
}

/// The four channels a bound session hears.
#[derive(Debug)]
struct Channels {
    _player: Subscription,
    _world: Subscription,
    zone: Subscription,
    room: Subscription,
}

/// Ties a PlayerState to the session currently driving it.
#[derive(Debug)]
pub struct SessionBinding {
    session: SessionId,
    inbox: Inbox,
    terminate: Trigger,
    channels: Option<Channels>,
}

impl SessionBinding {
    /// Returns the binding plus the listener the session waits on for termination.
    pub fn new(session: SessionId, inbox: Inbox) -> (Self, Listener) {
        let (terminate, listener) = signal_channel();
        (
            Self {
                session,
                inbox,
                terminate,
                channels: None,
            },
            listener,
        )
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

#[derive(Debug)]
struct PlayerState {
    character: Character,
    location: Location,
    linkless: bool,
    quit: bool,
    last_active: Instant,
    binding: Option<SessionBinding>,
}

/// Live view of an online character. Reads are synchronized; mutation goes
/// through [`WorldState`].
#[derive(Debug)]
pub struct OnlinePlayer {
    id: PlayerId,
    state: Mutex<PlayerState>,
}

impl OnlinePlayer {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> &PlayerId {
        &self.id
    }

    pub fn name(&self) -> String {
        self.lock().character.name.clone()
    }

    pub fn character(&self) -> Character {
        self.lock().character.clone()
    }

    pub fn location(&self) -> Location {
        self.lock().location.clone()
    }

    pub fn prompt(&self) -> String {
        self.lock().character.prompt()
    }

    pub fn is_linkless(&self) -> bool {
        self.lock().linkless
    }

    pub fn is_quit(&self) -> bool {
        self.lock().quit
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_active.elapsed()
    }

    /// Session currently bound, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.lock().binding.as_ref().map(SessionBinding::session)
    }

    /// Whether the bound session currently holds all four channel subscriptions.
    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .binding
            .as_ref()
            .is_some_and(|b| b.channels.is_some())
    }
}

/// Registry of online players, keyed by [`PlayerId`].
///
/// Lock order is always map shard, then player mutex. Pub/sub calls made while
/// a player is locked never re-enter the world.
pub struct WorldState {
    players: DashMap<PlayerId, Arc<OnlinePlayer>>,
    bus: Arc<dyn PubSub>,
}

impl WorldState {
    pub fn new(bus: Arc<dyn PubSub>) -> Self {
        Self {
            players: DashMap::new(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<dyn PubSub> {
        &self.bus
    }

    /// Publish a text message on a subject.
    pub fn publish(&self, subject: &str, message: &str) -> Result<(), WorldError> {
        self.bus.publish(subject, message.as_bytes())?;
        Ok(())
    }

    /// Publish a text message to one player.
    pub fn send_to_player(&self, id: &PlayerId, message: &str) -> Result<(), WorldError> {
        self.publish(&player_subject(id), message)
    }

    pub fn add_player(
        &self,
        id: &PlayerId,
        character: Character,
        location: Location,
    ) -> Result<Arc<OnlinePlayer>, WorldError> {
        match self.players.entry(id.clone()) {
            Entry::Occupied(_) => Err(WorldError::AlreadyOnline(id.clone())),
            Entry::Vacant(slot) => {
                let player = Arc::new(OnlinePlayer {
                    id: id.clone(),
                    state: Mutex::new(PlayerState {
                        character,
                        location,
                        linkless: false,
                        quit: false,
                        last_active: Instant::now(),
                        binding: None,
                    }),
                });
                slot.insert(Arc::clone(&player));
                tracing::debug!(player = %id, "player added to world");
                Ok(player)
            }
        }
    }

    /// Remove a player and release its subscriptions. A second call is a no-op
    /// returning `None`.
    pub fn remove_player(&self, id: &PlayerId) -> Option<Character> {
        let (_, player) = self.players.remove(id)?;
        let mut state = player.lock();
        state.binding.take();
        tracing::debug!(player = %id, "player removed from world");
        Some(state.character.clone())
    }

    /// Remove a player only while `session` is still bound to it.
    pub fn release_if_bound(&self, id: &PlayerId, session: SessionId) -> Option<Character> {
        let (_, player) = self.players.remove_if(id, |_, player| {
            player
                .lock()
                .binding
                .as_ref()
                .is_some_and(|b| b.session == session)
        })?;
        let mut state = player.lock();
        state.binding.take();
        tracing::debug!(player = %id, %session, "player released by session");
        Some(state.character.clone())
    }

    pub fn get_player(&self, id: &PlayerId) -> Option<Arc<OnlinePlayer>> {
        self.players.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn online_count(&self) -> usize {
        self.players.len()
    }

    /// Run `f` while holding the player's entry and lock.
    fn with_state<R>(
        &self,
        id: &PlayerId,
        f: impl FnOnce(&mut PlayerState) -> Result<R, WorldError>,
    ) -> Result<R, WorldError> {
        let entry = self
            .players
            .get(id)
            .ok_or_else(|| WorldError::NotFound(id.clone()))?;
        let mut state = entry.value().lock();
        f(&mut state)
    }

    pub fn mark_player_active(&self, id: &PlayerId) -> Result<(), WorldError> {
        self.with_state(id, |state| {
            state.last_active = Instant::now();
            state.linkless = false;
            Ok(())
        })
    }

    pub fn set_quit(&self, id: &PlayerId) -> Result<(), WorldError> {
        self.with_state(id, |state| {
            state.quit = true;
            Ok(())
        })
    }

    /// Mutate the live character (HP changes and the like).
    pub fn update_character<R>(
        &self,
        id: &PlayerId,
        f: impl FnOnce(&mut Character) -> R,
    ) -> Result<R, WorldError> {
        self.with_state(id, |state| Ok(f(&mut state.character)))
    }

    /// Flag the player linkless and raise its session's termination signal.
    pub fn disconnect_linkless(&self, id: &PlayerId) -> Result<(), WorldError> {
        self.with_state(id, |state| {
            state.linkless = true;
            if let Some(binding) = &state.binding {
                binding.terminate.trigger();
            }
            Ok(())
        })
    }

    /// Bind a new session. Any previous session is signalled to terminate and
    /// its subscriptions are released. Returns the superseded session.
    pub fn bind_session(
        &self,
        id: &PlayerId,
        binding: SessionBinding,
    ) -> Result<Option<SessionId>, WorldError> {
        self.with_state(id, |state| {
            let previous = state.binding.replace(binding).map(|old| {
                old.terminate.trigger();
                old.session
            });
            state.linkless = false;
            state.quit = false;
            state.last_active = Instant::now();
            if let Some(old) = previous {
                tracing::info!(player = %id, superseded = %old, "session superseded");
            }
            Ok(previous)
        })
    }

    /// Subscribe the bound session to `player-<id>`, `world`, `zone-<zone>` and
    /// `zone-<zone>-room-<room>`, in that order. On any failure the
    /// subscriptions made so far are released and nothing is attached.
    pub fn subscribe_session(&self, id: &PlayerId, session: SessionId) -> Result<(), WorldError> {
        let bus = Arc::clone(&self.bus);
        self.with_state(id, |state| {
            let location = state.location.clone();
            let binding = match state.binding.as_mut() {
                Some(b) if b.session == session => b,
                _ => {
                    return Err(WorldError::Superseded {
                        player: id.clone(),
                        session,
                    })
                }
            };

            let subjects = [
                player_subject(id),
                WORLD_SUBJECT.to_string(),
                location.zone_subject(),
                location.room_subject(),
            ];
            let mut created: Vec<Subscription> = Vec::with_capacity(subjects.len());
            for subject in &subjects {
                match bus.subscribe(subject, binding.inbox.handler()) {
                    Ok(sub) => created.push(sub),
                    Err(e) => {
                        tracing::warn!(player = %id, %subject, error = %e, rolled_back = created.len(), "subscription failed");
                        for sub in created {
                            sub.unsubscribe();
                        }
                        return Err(e.into());
                    }
                }
            }

            let mut subs = created.into_iter();
            if let (Some(player), Some(world), Some(zone), Some(room)) =
                (subs.next(), subs.next(), subs.next(), subs.next())
            {
                binding.channels = Some(Channels {
                    _player: player,
                    _world: world,
                    zone,
                    room,
                });
            }
            Ok(())
        })
    }

    /// Move a player, swapping zone/room subscriptions in the same critical
    /// section as the location change. Returns the previous location.
    pub fn move_player(&self, id: &PlayerId, to: Location) -> Result<Location, WorldError> {
        let bus = Arc::clone(&self.bus);
        self.with_state(id, |state| {
            let from = state.location.clone();
            if from == to {
                return Ok(from);
            }

            if let Some(binding) = state.binding.as_mut() {
                if let Some(channels) = binding.channels.as_mut() {
                    let zone = if from.zone != to.zone {
                        Some(bus.subscribe(&to.zone_subject(), binding.inbox.handler())?)
                    } else {
                        None
                    };
                    // A failed room subscription drops the new zone one with it.
                    let room = bus.subscribe(&to.room_subject(), binding.inbox.handler())?;
                    if let Some(zone) = zone {
                        channels.zone = zone;
                    }
                    channels.room = room;
                }
            }

            state.location = to;
            tracing::debug!(player = %id, from = %from.room_subject(), to = %state.location.room_subject(), "player moved");
            Ok(from)
        })
    }

    /// Invoke `f` once per online player. Iterates over a snapshot, so `f` may
    /// add or remove players.
    pub fn for_each_player(&self, mut f: impl FnMut(&Arc<OnlinePlayer>)) {
        let snapshot: Vec<Arc<OnlinePlayer>> = self
            .players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for player in &snapshot {
            f(player);
        }
    }

    /// Players in a room, sorted by id.
    pub fn players_in_room(&self, location: &Location) -> Vec<Arc<OnlinePlayer>> {
        let mut found = Vec::new();
        self.for_each_player(|player| {
            if player.location() == *location {
                found.push(Arc::clone(player));
            }
        });
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}
