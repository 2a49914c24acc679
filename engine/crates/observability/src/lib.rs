use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Timing of one scheduler tick.
#[derive(Debug, Clone)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    pub handler_count: usize,
    /// Budget for one tick in microseconds (the scheduler interval).
    pub budget_us: u128,
}

impl TickMetrics {
    pub fn over_budget(&self) -> bool {
        self.duration_us > self.budget_us
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                handlers = self.handler_count,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                self.budget_us
            );
        } else {
            tracing::debug!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                handlers = self.handler_count,
                "tick completed"
            );
        }
    }
}
