mod config;
mod shutdown;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use engine_core::{signal_channel, LocalBus, TickError, TickScheduler};
use mud::{build_registry, PasswordLogin, PronounsInitializer, RaceInitializer};
use net::{Connection, ConnectionLimiter};
use player_db::{PlayerDb, PlayerDbError};
use session::SessionManager;
use tokio::net::TcpListener;
use world::{CharacterStore, WorldState};

use crate::config::{parse_cli_args, ServerConfig};

/// Grace period for live sessions to write their goodbye and save.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("player database: {0}")]
    Database(#[from] PlayerDbError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tick(#[from] TickError),

    #[error("tick task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("MUD Server starting...");

    match run_mud_server(config).await {
        Ok(()) => {
            tracing::info!("Server stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server stopped with error");
            ExitCode::FAILURE
        }
    }
}

async fn run_mud_server(config: ServerConfig) -> Result<(), ServerError> {
    let store: Arc<dyn CharacterStore> = Arc::new(PlayerDb::open(&config.database.path)?);
    tracing::info!(path = %config.database.path, "player database opened");

    let world = Arc::new(WorldState::new(Arc::new(LocalBus::new())));
    let manager = Arc::new(
        SessionManager::new(
            world,
            store.clone(),
            Arc::new(PasswordLogin::new(store, config.character.starting_hp)),
            Arc::new(build_registry()),
            config.to_session_config(),
        )
        .with_initializer(Arc::new(PronounsInitializer))
        .with_initializer(Arc::new(RaceInitializer::new(config.character.races.clone()))),
    );

    let (shutdown_tx, shutdown_rx) = signal_channel();

    let mut scheduler = TickScheduler::new(config.to_tick_config());
    scheduler.register(manager.clone());
    let mut ticks = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let listener = TcpListener::bind(&config.net.telnet_addr).await?;
    let limiter = ConnectionLimiter::new(config.to_rate_limit_config());
    let on_connect = {
        let manager = manager.clone();
        let shutdown = shutdown_rx.clone();
        move |conn: Connection| {
            let manager = manager.clone();
            let shutdown = shutdown.clone();
            async move {
                // Outcomes are logged by the manager.
                let _ = manager.accept_connection(conn, shutdown).await;
            }
        }
    };
    let server = tokio::spawn(net::run_tcp_server_with_shutdown(
        listener,
        limiter,
        config.net.max_input_length,
        shutdown_rx,
        on_connect,
    ));

    let outcome = tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            Ok(())
        }
        finished = &mut ticks => match finished {
            Ok(Ok(ticks)) => {
                tracing::info!(ticks, "tick scheduler finished");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::from(e)),
            Err(e) => Err(ServerError::from(e)),
        },
    };

    shutdown_tx.trigger();
    match server.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "TCP server error"),
        Err(e) => tracing::warn!(error = %e, "TCP server task failed"),
        Ok(Ok(())) => {}
    }
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    manager.save_all();

    outcome
}
