use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::tick::HandlerError;
use engine_core::{Listener, TickHandler};
use net::Connection;
use world::{
    Character, CharacterStore, Inbox, Location, PlayerId, SessionBinding, SessionId, WorldError,
    WorldState,
};

use crate::command::Dispatcher;
use crate::error::SessionError;
use crate::login::{CharacterInitializer, LoginError, LoginFlow};
use crate::session::{Session, SessionEnd};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where new characters enter the world.
    pub start: Location,
    pub inbox_capacity: usize,
    /// Zero disables the idle reaper.
    pub idle_timeout: Duration,
    /// Zero disables autosave.
    pub autosave_ticks: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start: Location::new("town", "square"),
            inbox_capacity: world::inbox::DEFAULT_INBOX_CAPACITY,
            idle_timeout: Duration::from_secs(900),
            autosave_ticks: 150,
        }
    }
}

/// Builds sessions from raw connections and owns their registration and
/// teardown. Also the periodic maintenance step for online players.
pub struct SessionManager {
    world: Arc<WorldState>,
    store: Arc<dyn CharacterStore>,
    login: Arc<dyn LoginFlow>,
    initializers: Vec<Arc<dyn CharacterInitializer>>,
    dispatcher: Arc<dyn Dispatcher>,
    config: SessionConfig,
    next_session: AtomicU64,
}

impl SessionManager {
    pub fn new(
        world: Arc<WorldState>,
        store: Arc<dyn CharacterStore>,
        login: Arc<dyn LoginFlow>,
        dispatcher: Arc<dyn Dispatcher>,
        config: SessionConfig,
    ) -> Self {
        Self {
            world,
            store,
            login,
            initializers: Vec::new(),
            dispatcher,
            config,
            next_session: AtomicU64::new(1),
        }
    }

    /// Add a character initializer. They run in the order added.
    pub fn with_initializer(mut self, initializer: Arc<dyn CharacterInitializer>) -> Self {
        self.initializers.push(initializer);
        self
    }

    pub fn world(&self) -> &Arc<WorldState> {
        &self.world
    }

    /// Log in, initialize and register a character, returning a session ready
    /// to run. Registration is all-or-nothing.
    pub async fn new_player(&self, mut conn: Connection) -> Result<Session, SessionError> {
        let mut character = self.login.login(&mut conn).await?;
        for initializer in &self.initializers {
            tracing::debug!(initializer = initializer.name(), player = %character.name, "running character initializer");
            initializer.initialize(&mut conn, &mut character).await?;
        }

        let id = character.id();
        self.store.save(&id, &character)?;

        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let inbox = Inbox::new(self.config.inbox_capacity);
        let terminate = self.bind(&id, character, session, &inbox)?;

        if let Err(e) = self.world.subscribe_session(&id, session) {
            // A rebind already superseded the previous session, so this is
            // the last chance to persist the live character.
            if let Some(character) = self.world.release_if_bound(&id, session) {
                self.save(&id, &character);
            }
            tracing::warn!(player = %id, %session, error = %e, "registration rolled back");
            return Err(SessionError::Registration(e));
        }

        tracing::info!(player = %id, %session, peer = conn.peer(), "player entered the world");
        Ok(Session::new(
            session,
            id,
            conn,
            inbox,
            terminate,
            Arc::clone(&self.world),
            Arc::clone(&self.dispatcher),
        ))
    }

    /// Create the player's state, or take over the existing one.
    fn bind(
        &self,
        id: &PlayerId,
        character: Character,
        session: SessionId,
        inbox: &Inbox,
    ) -> Result<Listener, SessionError> {
        loop {
            match self
                .world
                .add_player(id, character.clone(), self.config.start.clone())
            {
                Ok(_) => {}
                // The live character wins; it only picks up extensions it lacks.
                Err(WorldError::AlreadyOnline(_)) => {
                    match self.world.update_character(id, |live| adopt_extensions(live, &character)) {
                        Ok(()) | Err(WorldError::NotFound(_)) => {}
                        Err(e) => return Err(SessionError::Registration(e)),
                    }
                }
                Err(e) => return Err(SessionError::Registration(e)),
            }

            let (binding, terminate) = SessionBinding::new(session, inbox.clone());
            match self.world.bind_session(id, binding) {
                Ok(_) => return Ok(terminate),
                // Removed between add and bind; try again.
                Err(WorldError::NotFound(_)) => continue,
                Err(e) => return Err(SessionError::Registration(e)),
            }
        }
    }

    /// Run one connection from login to teardown. Blocks until the session ends.
    pub async fn accept_connection(
        &self,
        conn: Connection,
        shutdown: Listener,
    ) -> Result<SessionEnd, SessionError> {
        let peer = conn.peer().to_string();
        let mut waiter = shutdown.clone();
        let registered = tokio::select! {
            biased;
            _ = waiter.wait() => return Ok(SessionEnd::Shutdown),
            registered = self.new_player(conn) => registered,
        };

        let mut session = match registered {
            Ok(session) => session,
            Err(SessionError::Login(LoginError::Disconnected)) => {
                tracing::info!(%peer, "connection closed during login");
                return Ok(SessionEnd::Disconnected);
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "connection not admitted");
                return Err(e);
            }
        };

        let result = session.run(shutdown).await;

        if let Some(character) = self.world.release_if_bound(session.player(), session.id()) {
            self.save(session.player(), &character);
        }

        match &result {
            Ok(end) => tracing::info!(player = %session.player(), session = %session.id(), ?end, "session ended"),
            Err(e) => tracing::warn!(player = %session.player(), session = %session.id(), error = %e, "session ended with error"),
        }
        result
    }

    /// Remove a player from the world and persist its final state.
    pub fn remove_player(&self, id: &PlayerId) -> Option<Character> {
        let character = self.world.remove_player(id)?;
        self.save(id, &character);
        Some(character)
    }

    /// Persist every online character. Returns how many were saved.
    pub fn save_all(&self) -> usize {
        let mut saved = 0;
        self.world.for_each_player(|player| {
            if self.save(player.id(), &player.character()) {
                saved += 1;
            }
        });
        tracing::info!(saved, "characters saved");
        saved
    }

    fn save(&self, id: &PlayerId, character: &Character) -> bool {
        match self.store.save(id, character) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(player = %id, error = %e, "character save failed");
                false
            }
        }
    }

    fn reap_idle(&self) {
        if self.config.idle_timeout.is_zero() {
            return;
        }
        self.world.for_each_player(|player| {
            if player.is_linkless() || player.idle_for() < self.config.idle_timeout {
                return;
            }
            tracing::info!(player = %player.id(), idle_secs = player.idle_for().as_secs(), "disconnecting idle player");
            if let Err(e) = self.world.disconnect_linkless(player.id()) {
                tracing::debug!(player = %player.id(), error = %e, "idle player already gone");
            }
        });
    }
}

impl TickHandler for SessionManager {
    fn name(&self) -> &str {
        "session_manager"
    }

    fn on_tick(&self, tick: u64) -> Result<(), HandlerError> {
        self.reap_idle();
        if self.config.autosave_ticks > 0 && tick % self.config.autosave_ticks == 0 {
            self.save_all();
        }
        Ok(())
    }
}

fn adopt_extensions(live: &mut Character, loaded: &Character) {
    for (key, value) in &loaded.extensions {
        live.extensions
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
