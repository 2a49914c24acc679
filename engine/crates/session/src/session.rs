use std::io;
use std::sync::Arc;

use engine_core::Listener;
use net::Connection;
use world::{Inbox, PlayerId, SessionId, WorldState};

use crate::command::Dispatcher;
use crate::error::SessionError;

const SUPERSEDED_MESSAGE: &str = "Another connection has taken over your session.";
const IDLE_MESSAGE: &str = "Disconnected for inactivity.";
const SHUTDOWN_MESSAGE: &str = "The server is shutting down. Your character has been saved.";
const FAREWELL_MESSAGE: &str = "Farewell. Come back soon!";

/// Why a session's loop returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The player used `quit`.
    Quit,
    /// The peer closed the connection, or the player was removed from the world.
    Disconnected,
    /// A newer login took over the character.
    Superseded,
    /// The idle reaper flagged the player linkless.
    TimedOut,
    /// Process-wide shutdown.
    Shutdown,
}

enum Event {
    Shutdown,
    Terminated,
    Broadcast(Vec<u8>),
    Input(io::Result<Option<String>>),
}

/// One connection bound to one online player.
pub struct Session {
    id: SessionId,
    player: PlayerId,
    conn: Connection,
    inbox: Inbox,
    terminate: Listener,
    world: Arc<WorldState>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        player: PlayerId,
        conn: Connection,
        inbox: Inbox,
        terminate: Listener,
        world: Arc<WorldState>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            id,
            player,
            conn,
            inbox,
            terminate,
            world,
            dispatcher,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    /// Drive the session until it ends. Player removal is left to the caller.
    pub async fn run(&mut self, mut shutdown: Listener) -> Result<SessionEnd, SessionError> {
        self.enter().await?;

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.wait() => Event::Shutdown,
                _ = self.terminate.wait() => Event::Terminated,
                payload = self.inbox.recv() => Event::Broadcast(payload),
                line = self.conn.read_line() => Event::Input(line),
            };

            match event {
                Event::Shutdown => {
                    let _ = self.conn.write_line(&format!("\n{SHUTDOWN_MESSAGE}")).await;
                    return Ok(SessionEnd::Shutdown);
                }
                Event::Terminated => return Ok(self.terminated().await),
                Event::Broadcast(payload) => {
                    let text = String::from_utf8_lossy(&payload);
                    // Close the pending prompt line, then leave one blank line.
                    self.conn.write_line(&format!("\n\n{text}")).await?;
                    self.prompt().await?;
                }
                Event::Input(Ok(None)) => {
                    tracing::info!(session = %self.id, player = %self.player, "connection closed by peer");
                    return Ok(SessionEnd::Disconnected);
                }
                Event::Input(Err(e)) => return Err(SessionError::Transport(e)),
                Event::Input(Ok(Some(line))) => {
                    if let Some(end) = self.handle_line(&line).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    /// Implicit `look` before the first prompt.
    async fn enter(&mut self) -> Result<(), SessionError> {
        tracing::info!(session = %self.id, player = %self.player, "session active");
        self.dispatch("look", &[]).await?;
        self.prompt().await?;
        Ok(())
    }

    async fn terminated(&mut self) -> SessionEnd {
        // A player removed out from under the session just loses its link.
        let (message, end) = match self.world.get_player(&self.player) {
            Some(player) if player.is_linkless() => (Some(IDLE_MESSAGE), SessionEnd::TimedOut),
            Some(_) => (Some(SUPERSEDED_MESSAGE), SessionEnd::Superseded),
            None => (None, SessionEnd::Disconnected),
        };
        if let Some(message) = message {
            if let Err(e) = self.conn.write_line(&format!("\n{message}")).await {
                tracing::debug!(session = %self.id, error = %e, "could not deliver termination message");
            }
        }
        let _ = self.conn.shutdown().await;
        tracing::info!(session = %self.id, player = %self.player, ?end, "session terminated");
        end
    }

    async fn handle_line(&mut self, line: &str) -> Result<Option<SessionEnd>, SessionError> {
        if let Err(e) = self.world.mark_player_active(&self.player) {
            tracing::debug!(session = %self.id, error = %e, "activity not recorded");
        }

        let mut words = line.split_whitespace();
        if let Some(verb) = words.next() {
            let args: Vec<&str> = words.collect();
            self.dispatch(verb, &args).await?;
        }

        let quit = self
            .world
            .get_player(&self.player)
            .is_some_and(|player| player.is_quit());
        if quit {
            self.conn.write_line(FAREWELL_MESSAGE).await?;
            tracing::info!(session = %self.id, player = %self.player, "player quit");
            return Ok(Some(SessionEnd::Quit));
        }

        self.prompt().await?;
        Ok(None)
    }

    /// Run a verb, show a user-facing error, then flush output it produced.
    async fn dispatch(&mut self, verb: &str, args: &[&str]) -> Result<(), SessionError> {
        match self.dispatcher.exec(&self.world, &self.player, verb, args) {
            Ok(()) => {}
            Err(e) if e.is_user_facing() => self.conn.write_line(&e.to_string()).await?,
            Err(e) => {
                tracing::error!(session = %self.id, player = %self.player, %verb, error = %e, "command fault");
                return Err(SessionError::Command(e));
            }
        }
        self.flush_inbox().await
    }

    /// Write queued messages without the broadcast blank line. Command output
    /// published during dispatch lands here before the prompt is redrawn.
    async fn flush_inbox(&mut self) -> Result<(), SessionError> {
        while let Some(payload) = self.inbox.try_recv() {
            self.conn.write_line(&String::from_utf8_lossy(&payload)).await?;
        }
        Ok(())
    }

    async fn prompt(&mut self) -> io::Result<()> {
        let prompt = self
            .world
            .get_player(&self.player)
            .map(|player| player.prompt())
            .unwrap_or_else(|| "> ".to_string());
        self.conn.write_prompt(&prompt).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("player", &self.player)
            .field("peer", &self.conn.peer())
            .finish()
    }
}

