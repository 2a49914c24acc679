mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use engine_core::{
    player_subject, signal_channel, Handler, LocalBus, PubSub, PubSubError, Subscription,
    WORLD_SUBJECT,
};
use mud::plugins::{Pronouns, PRONOUNS_KEY, RACE_KEY};
use mud::build_registry;
use session::{Command, CommandContext, CommandError, SessionConfig, SessionEnd, SessionError};
use tokio::io::AsyncWriteExt;
use world::{Location, PlayerId, WorldError};

fn kael() -> PlayerId {
    PlayerId::new("kael")
}

#[tokio::test]
async fn new_character_is_created_persisted_and_placed() {
    let server = server();
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();

    let (_tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });

    let seen = read_until(&mut client, PROMPT_TAIL).await;
    assert!(seen.contains("Let's create your character."));
    assert!(seen.contains("[town] square"));
    assert!(seen.ends_with("[50/50HP] > "));

    let stored = server.db.load(&kael()).unwrap().unwrap();
    assert_eq!(stored.name, "Kael");
    let pronouns: Pronouns = stored.extension(PRONOUNS_KEY).unwrap().unwrap();
    assert_eq!(pronouns.subject, "they");
    assert_eq!(stored.extension::<String>(RACE_KEY).unwrap().as_deref(), Some("elf"));

    let player = server.world().get_player(&kael()).unwrap();
    assert_eq!(player.location(), Location::new("town", "square"));
    assert!(player.is_subscribed());

    drop(client);
    let end = task.await.unwrap().unwrap();
    assert_eq!(end, SessionEnd::Disconnected);
    assert!(server.world().get_player(&kael()).is_none());
}

#[tokio::test]
async fn reconnect_takes_over_the_live_character() {
    let server = server();
    let (_tx, shutdown) = signal_channel();

    let (mut first, conn) = pipe();
    first.write_all(NEW_KAEL).await.unwrap();
    let manager = server.manager.clone();
    let listener = shutdown.clone();
    let first_task = tokio::spawn(async move { manager.accept_connection(conn, listener).await });
    read_until(&mut first, PROMPT_TAIL).await;

    // Live state diverges from the saved document.
    server.world().update_character(&kael(), |c| c.hp = 13).unwrap();

    let (mut second, conn) = pipe();
    second.write_all(b"kael\nsecret\n").await.unwrap();
    let manager = server.manager.clone();
    let second_task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });

    let seen = read_until(&mut second, PROMPT_TAIL).await;
    assert!(seen.contains("Welcome back, Kael."));
    assert!(seen.ends_with("[13/50HP] > "));

    let old = read_to_end(&mut first).await;
    assert!(old.contains("Another connection has taken over your session."));
    assert_eq!(first_task.await.unwrap().unwrap(), SessionEnd::Superseded);

    // The superseded session left the player online for its successor.
    let player = server.world().get_player(&kael()).unwrap();
    assert_eq!(player.character().hp, 13);
    assert!(player.is_subscribed());
    assert_eq!(server.world().online_count(), 1);

    second.write_all(b"quit\n").await.unwrap();
    let tail = read_to_end(&mut second).await;
    assert!(tail.contains("Farewell. Come back soon!"));
    assert_eq!(second_task.await.unwrap().unwrap(), SessionEnd::Quit);
    assert_eq!(server.db.load(&kael()).unwrap().unwrap().hp, 13);
    assert_eq!(server.world().online_count(), 0);
}

#[tokio::test]
async fn zone_broadcast_arrives_before_a_fresh_prompt() {
    let server = server();
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (_tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, PROMPT_TAIL).await;

    let town = Location::new("town", "square");
    server.world().publish(&town.zone_subject(), "The bells ring.").unwrap();

    let seen = read_until(&mut client, "The bells ring.\r\n[50/50HP] > ").await;
    assert!(seen.starts_with("\r\n\r\nThe bells ring."));

    server.world().publish(&Location::new("harbor", "docks").zone_subject(), "Gulls cry.").unwrap();
    server.world().publish(WORLD_SUBJECT, "A comet passes.").unwrap();
    let seen = read_until(&mut client, "A comet passes.\r\n").await;
    assert!(!seen.contains("Gulls cry."));
}

struct Explode;

impl Command for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    fn usage(&self) -> &str {
        "explode"
    }

    fn run(&self, _ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        Err(CommandError::fault("combat table missing"))
    }
}

#[tokio::test]
async fn user_errors_are_shown_and_faults_end_the_session() {
    let mut registry = build_registry();
    registry.register(Arc::new(Explode));
    let server = server_with(Arc::new(LocalBus::new()), registry, SessionConfig::default());

    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (_tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, PROMPT_TAIL).await;

    client.write_all(b"dance\n").await.unwrap();
    let seen = read_until(&mut client, PROMPT_TAIL).await;
    assert!(seen.contains("Huh? \"dance\" is not a command."));
    assert!(server.world().get_player(&kael()).is_some());

    client.write_all(b"tell nobody hi\n").await.unwrap();
    let seen = read_until(&mut client, PROMPT_TAIL).await;
    assert!(seen.contains("No one called"));

    client.write_all(b"explode\n").await.unwrap();
    let err = task.await.unwrap().unwrap_err();
    match err {
        SessionError::Command(CommandError::Fault(reason)) => assert_eq!(reason, "combat table missing"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(server.world().get_player(&kael()).is_none());
    assert!(server.db.load(&kael()).unwrap().is_some());
}

/// Fails the Nth subscribe call.
struct FlakyBus {
    inner: LocalBus,
    fail_at: usize,
    calls: AtomicUsize,
}

impl PubSub for FlakyBus {
    fn subscribe(&self, subject: &str, handler: Handler) -> Result<Subscription, PubSubError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            return Err(PubSubError::Subscribe {
                subject: subject.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.inner.subscribe(subject, handler)
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), PubSubError> {
        self.inner.publish(subject, payload)
    }
}

#[tokio::test]
async fn failed_subscription_leaves_nothing_behind() {
    let inner = LocalBus::new();
    let bus = Arc::new(FlakyBus {
        inner: inner.clone(),
        fail_at: 3,
        calls: AtomicUsize::new(0),
    });
    let server = server_with(bus, build_registry(), SessionConfig::default());

    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (_tx, shutdown) = signal_channel();
    let err = server.manager.accept_connection(conn, shutdown).await.unwrap_err();

    assert!(matches!(err, SessionError::Registration(WorldError::PubSub(_))));
    assert!(server.world().get_player(&kael()).is_none());
    assert_eq!(inner.subscriber_count(&player_subject(kael())), 0);
    assert_eq!(inner.subscriber_count(WORLD_SUBJECT), 0);
}

#[tokio::test]
async fn shutdown_notifies_and_saves() {
    let server = server();
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, PROMPT_TAIL).await;

    server.world().update_character(&kael(), |c| c.hp = 21).unwrap();
    tx.trigger();

    let seen = read_until(&mut client, "shutting down").await;
    assert!(seen.contains("Your character has been saved."));
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Shutdown);
    assert_eq!(server.db.load(&kael()).unwrap().unwrap().hp, 21);
}

#[tokio::test]
async fn shutdown_during_login_abandons_the_connection() {
    let server = server();
    let (mut client, conn) = pipe();
    let (tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, "By what name").await;

    tx.trigger();
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Shutdown);
    assert_eq!(server.db.count().unwrap(), 0);
}

#[tokio::test]
async fn remove_player_is_idempotent() {
    let server = server();
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (_tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, PROMPT_TAIL).await;

    server.world().update_character(&kael(), |c| c.hp = 5).unwrap();
    assert!(server.manager.remove_player(&kael()).is_some());
    assert!(server.manager.remove_player(&kael()).is_none());
    assert_eq!(server.db.load(&kael()).unwrap().unwrap().hp, 5);

    // The orphaned session ends cleanly once its peer goes away.
    drop(client);
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Disconnected);
    assert_eq!(server.world().online_count(), 0);
}

#[tokio::test]
async fn concurrent_logins_for_one_character_leave_one_session() {
    let server = server();
    let (_tx, shutdown) = signal_channel();

    // Create the character first.
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    client.write_all(b"quit\n").await.unwrap();
    server.manager.accept_connection(conn, shutdown.clone()).await.unwrap();
    drop(client);

    let mut clients = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let (mut client, conn) = pipe();
        client.write_all(b"Kael\nsecret\n").await.unwrap();
        let manager = server.manager.clone();
        let listener = shutdown.clone();
        tasks.push(tokio::spawn(async move { manager.accept_connection(conn, listener).await }));
        clients.push(client);
    }

    let mut second = tasks.pop().unwrap();
    let mut first = tasks.pop().unwrap();
    let (loser, survivor) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::select! {
            end = &mut first => (end, second),
            end = &mut second => (end, first),
        }
    })
    .await
    .expect("one session should be superseded");
    assert_eq!(loser.unwrap().unwrap(), SessionEnd::Superseded);

    let player = server.world().get_player(&kael()).unwrap();
    assert!(player.session().is_some());
    assert!(player.is_subscribed());
    assert_eq!(server.world().online_count(), 1);

    drop(clients);
    let end = tokio::time::timeout(Duration::from_secs(5), survivor)
        .await
        .expect("survivor should see the disconnect");
    assert_eq!(end.unwrap().unwrap(), SessionEnd::Disconnected);
    assert_eq!(server.world().online_count(), 0);
}

#[tokio::test]
async fn idle_players_are_disconnected_by_the_tick() {
    let config = SessionConfig {
        idle_timeout: Duration::from_millis(50),
        ..SessionConfig::default()
    };
    let server = server_with(Arc::new(LocalBus::new()), build_registry(), config);
    let (mut client, conn) = pipe();
    client.write_all(NEW_KAEL).await.unwrap();
    let (_tx, shutdown) = signal_channel();
    let manager = server.manager.clone();
    let task = tokio::spawn(async move { manager.accept_connection(conn, shutdown).await });
    read_until(&mut client, PROMPT_TAIL).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine_core::TickHandler::on_tick(server.manager.as_ref(), 1).unwrap();

    let seen = read_to_end(&mut client).await;
    assert!(seen.contains("Disconnected for inactivity."));
    assert_eq!(task.await.unwrap().unwrap(), SessionEnd::TimedOut);
    assert!(server.world().get_player(&kael()).is_none());
}
