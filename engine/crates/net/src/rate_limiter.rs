use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Connection admission limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitRejection {
    #[error("server at max connections")]
    TotalLimitReached,
    #[error("too many connections from this IP")]
    IpLimitReached,
}

#[derive(Debug, Default)]
struct Counts {
    total: usize,
    per_ip: BTreeMap<IpAddr, usize>,
}

/// Tracks open connections in total and per IP. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    config: RateLimitConfig,
    counts: Arc<Mutex<Counts>>,
}

/// An admitted connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    ip: IpAddr,
    counts: Arc<Mutex<Counts>>,
}

fn lock(counts: &Mutex<Counts>) -> MutexGuard<'_, Counts> {
    counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            counts: Arc::new(Mutex::new(Counts::default())),
        }
    }

    pub fn try_admit(&self, ip: IpAddr) -> Result<ConnectionPermit, RateLimitRejection> {
        let mut counts = lock(&self.counts);
        if counts.total >= self.config.max_connections_total {
            return Err(RateLimitRejection::TotalLimitReached);
        }
        let per_ip = counts.per_ip.get(&ip).copied().unwrap_or(0);
        if per_ip >= self.config.max_connections_per_ip {
            return Err(RateLimitRejection::IpLimitReached);
        }
        counts.per_ip.insert(ip, per_ip + 1);
        counts.total += 1;
        Ok(ConnectionPermit {
            ip,
            counts: Arc::clone(&self.counts),
        })
    }

    pub fn total_connections(&self) -> usize {
        lock(&self.counts).total
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut counts = lock(&self.counts);
        if let Some(count) = counts.per_ip.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.per_ip.remove(&self.ip);
            }
        }
        counts.total = counts.total.saturating_sub(1);
    }
}
