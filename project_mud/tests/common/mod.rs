#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use engine_core::PubSub;
use mud::{build_registry, PasswordLogin, PronounsInitializer, RaceInitializer};
use net::Connection;
use player_db::PlayerDb;
use session::{CommandRegistry, SessionConfig, SessionManager};
use tokio::io::{AsyncReadExt, DuplexStream};
use world::WorldState;

pub const NEW_KAEL: &[u8] = b"Kael\nsecret\nsecret\n3\n2\n";
pub const PROMPT_TAIL: &str = "HP] > ";

pub struct Server {
    pub manager: Arc<SessionManager>,
    pub db: Arc<PlayerDb>,
}

impl Server {
    pub fn world(&self) -> &Arc<WorldState> {
        self.manager.world()
    }
}

pub fn races() -> Vec<String> {
    ["Human", "Elf", "Dwarf", "Halfling"].map(String::from).to_vec()
}

/// Full stack over an in-memory database.
pub fn server_with(bus: Arc<dyn PubSub>, registry: CommandRegistry, config: SessionConfig) -> Server {
    let db = Arc::new(PlayerDb::open_memory().unwrap());
    let manager = SessionManager::new(
        Arc::new(WorldState::new(bus)),
        db.clone(),
        Arc::new(PasswordLogin::new(db.clone(), 50)),
        Arc::new(registry),
        config,
    )
    .with_initializer(Arc::new(PronounsInitializer))
    .with_initializer(Arc::new(RaceInitializer::new(races())));
    Server {
        manager: Arc::new(manager),
        db,
    }
}

pub fn server() -> Server {
    server_with(
        Arc::new(engine_core::LocalBus::new()),
        build_registry(),
        SessionConfig::default(),
    )
}

pub fn pipe() -> (DuplexStream, Connection) {
    let (client, server) = tokio::io::duplex(16 * 1024);
    (client, Connection::from_stream(server, "test"))
}

/// Read until `needle` shows up; returns everything read.
pub async fn read_until(client: &mut DuplexStream, needle: &str) -> String {
    let mut seen = String::new();
    let mut buf = [0u8; 1024];
    while !seen.contains(needle) {
        let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}; saw {seen:?}"))
            .unwrap();
        if n == 0 {
            panic!("stream closed waiting for {needle:?}; saw {seen:?}");
        }
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    seen
}

/// Read until the peer closes; returns everything read.
pub async fn read_to_end(client: &mut DuplexStream) -> String {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
        .await
        .expect("peer never closed")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}
