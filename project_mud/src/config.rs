use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use engine_core::tick::{TickConfig, MIN_TICK_INTERVAL};
use net::RateLimitConfig;
use session::SessionConfig;
use world::Location;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub telnet_addr: String,
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_input_length: usize,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            telnet_addr: "0.0.0.0:4000".to_string(),
            max_connections_total: 1000,
            max_connections_per_ip: 5,
            max_input_length: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub interval_secs: u64,
}

impl Default for TickSection {
    fn default() -> Self {
        Self { interval_secs: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub start_zone: String,
    pub start_room: String,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            start_zone: "town".to_string(),
            start_room: "square".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub inbox_capacity: usize,
    pub idle_timeout_secs: u64,
    pub autosave_ticks: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            inbox_capacity: 100,
            idle_timeout_secs: 900,
            autosave_ticks: 150, // 5 minutes at the default 2s tick
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/players.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CharacterSection {
    pub starting_hp: i32,
    pub races: Vec<String>,
}

impl Default for CharacterSection {
    fn default() -> Self {
        Self {
            starting_hp: 50,
            races: ["Human", "Elf", "Dwarf", "Halfling"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Top-level MUD server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub tick: TickSection,
    pub world: WorldSection,
    pub session: SessionSection,
    pub database: DatabaseSection,
    pub character: CharacterSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path. A missing file
    /// yields the defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config: Self = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_string(),
                    source,
                })?;
                toml::from_str(&content)?
            }
            Some(path) => {
                tracing::warn!(%path, "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Duration::from_secs(self.tick.interval_secs) < MIN_TICK_INTERVAL {
            return Err(ConfigError::Invalid(format!(
                "tick.interval_secs must be at least {}",
                MIN_TICK_INTERVAL.as_secs()
            )));
        }
        if self.session.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("session.inbox_capacity must be at least 1".into()));
        }
        if self.world.start_zone.trim().is_empty() || self.world.start_room.trim().is_empty() {
            return Err(ConfigError::Invalid("world.start_zone and world.start_room are required".into()));
        }
        if self.character.races.is_empty() {
            return Err(ConfigError::Invalid("character.races must not be empty".into()));
        }
        if self.character.starting_hp <= 0 {
            return Err(ConfigError::Invalid("character.starting_hp must be positive".into()));
        }
        Ok(())
    }

    pub fn to_tick_config(&self) -> TickConfig {
        TickConfig::from_secs(self.tick.interval_secs)
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            start: Location::new(self.world.start_zone.as_str(), self.world.start_room.as_str()),
            inbox_capacity: self.session.inbox_capacity,
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            autosave_ticks: self.session.autosave_ticks,
        }
    }

    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_connections_total: self.net.max_connections_total,
            max_connections_per_ip: self.net.max_connections_per_ip,
        }
    }
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{body}").unwrap();
        f
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.net.telnet_addr, "0.0.0.0:4000");
        assert_eq!(config.tick.interval_secs, 2);
        assert_eq!(config.session.inbox_capacity, 100);
        assert_eq!(config.character.starting_hp, 50);
        assert_eq!(config.character.races.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn conversions() {
        let config = ServerConfig::default();
        assert_eq!(config.to_tick_config().interval, Duration::from_secs(2));
        let session = config.to_session_config();
        assert_eq!(session.start, Location::new("town", "square"));
        assert_eq!(session.idle_timeout, Duration::from_secs(900));
        assert_eq!(config.to_rate_limit_config().max_connections_per_ip, 5);
    }

    #[test]
    fn load_missing_file_or_none_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/nonexistent_mud_config_12345.toml")).unwrap();
        assert_eq!(config.tick.interval_secs, 2);
        assert_eq!(ServerConfig::load(None).unwrap().tick.interval_secs, 2);
    }

    #[test]
    fn load_partial_toml() {
        let f = write_config(
            r#"
[tick]
interval_secs = 5

[world]
start_zone = "Harbor"
"#,
        );
        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.tick.interval_secs, 5);
        assert_eq!(config.to_session_config().start, Location::new("harbor", "square"));
        assert_eq!(config.net.telnet_addr, "0.0.0.0:4000");
    }

    #[test]
    fn sub_second_tick_rejected() {
        let f = write_config("[tick]\ninterval_secs = 0\n");
        let err = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_races_and_inbox_rejected() {
        let mut config = ServerConfig::default();
        config.character.races.clear();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.session.inbox_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.world.start_room = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let f = write_config("[tick\ninterval_secs = ");
        let err = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
