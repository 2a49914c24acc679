use std::error::Error as StdError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use observability::TickMetrics;
use tokio::time::MissedTickBehavior;

use crate::signal::Listener;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Tick scheduler configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    pub interval: Duration,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(secs),
            ..Self::default()
        }
    }
}

pub type HandlerError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("tick handler '{handler}' failed on tick {tick}: {source}")]
    Handler {
        handler: String,
        tick: u64,
        #[source]
        source: HandlerError,
    },
}

/// A periodic step run once per tick.
pub trait TickHandler: Send + Sync {
    fn name(&self) -> &str;

    fn on_tick(&self, tick: u64) -> Result<(), HandlerError>;
}

/// Fires a fixed-interval tick to registered handlers, in registration order.
pub struct TickScheduler {
    config: TickConfig,
    handlers: Vec<Arc<dyn TickHandler>>,
    current_tick: u64,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            current_tick: 0,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn TickHandler>) {
        tracing::debug!(handler = handler.name(), "tick handler registered");
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Run every handler once. The first failure aborts the remaining handlers.
    pub fn step(&mut self) -> Result<TickMetrics, TickError> {
        let start = Instant::now();
        self.current_tick += 1;
        let tick = self.current_tick;

        for handler in &self.handlers {
            handler.on_tick(tick).map_err(|source| TickError::Handler {
                handler: handler.name().to_string(),
                tick,
                source,
            })?;
        }

        Ok(TickMetrics {
            tick_number: tick,
            duration_us: start.elapsed().as_micros(),
            handler_count: self.handlers.len(),
            budget_us: self.config.interval.as_micros(),
        })
    }

    /// Tick until shutdown (clean stop), `max_ticks`, or a handler failure.
    /// Returns the number of ticks completed.
    pub async fn run(mut self, mut shutdown: Listener) -> Result<u64, TickError> {
        let period = self.config.interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = period.as_millis() as u64, handlers = self.handlers.len(), "tick scheduler running");

        loop {
            if self.config.max_ticks > 0 && self.current_tick >= self.config.max_ticks {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    tracing::info!(tick = self.current_tick, "tick scheduler: shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    match self.step() {
                        Ok(metrics) => metrics.log(),
                        Err(e) => {
                            tracing::error!(error = %e, "tick scheduler stopped");
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(self.current_tick)
    }
}
