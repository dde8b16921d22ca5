use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frame::MAX_FIELD_LEN;
use crate::history::MAX_HISTORY_ENTRIES;
use crate::hub::{DEFAULT_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};

// =============================================================================
// Layered config: defaults → chat-bridge.toml → CHAT_BRIDGE_* env → CLI flags
// =============================================================================
//
//   chat-bridge.toml:   port = 5000
//   env var:            CHAT_BRIDGE_PORT=5000
//   cli:                --port 5000

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chat-bridge.toml";

/// Env var prefix for every setting.
pub const ENV_PREFIX: &str = "CHAT_BRIDGE_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind. Loopback unless explicitly opened up.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Text of the hello frame sent to every new client.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Messages replayed to new clients. 0 disables history.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Sender name the loopback source attributes messages to.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Frames a client may fall behind by before it is disconnected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            greeting: default_greeting(),
            history_size: default_history_size(),
            display_name: default_display_name(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4422
}
fn default_greeting() -> String {
    "Hello!".to_string()
}
fn default_history_size() -> usize {
    50
}
fn default_display_name() -> String {
    "web".to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Config {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("host is not an IP address: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.addr()?;
        if self.history_size > MAX_HISTORY_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "history_size {} exceeds {}",
                self.history_size, MAX_HISTORY_ENTRIES
            )));
        }
        if self.greeting.len() > MAX_FIELD_LEN {
            return Err(ConfigError::Invalid(format!(
                "greeting is {} bytes (max {})",
                self.greeting.len(),
                MAX_FIELD_LEN
            )));
        }
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity {} is below {}",
                self.queue_capacity, MIN_QUEUE_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Build a figment that layers: defaults → config file → env vars → CLI overrides.
pub fn load_config(config_file: &Path, overrides: &CliOverrides) -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.port, 4422);
        assert_eq!(c.greeting, "Hello!");
        assert_eq!(c.history_size, 50);
        assert_eq!(c.display_name, "web");
        assert_eq!(c.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(c.validate().is_ok());
        assert_eq!(c.addr().unwrap(), SocketAddr::from(([127, 0, 0, 1], 4422)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config: Config = load_config(&tmp.path().join("absent.toml"), &CliOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(config.port, 4422);
    }

    #[test]
    fn test_file_then_cli_layers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = 5000").unwrap();
        writeln!(file, "greeting = \"Welcome\"").unwrap();
        writeln!(file, "history_size = 5").unwrap();
        writeln!(file, "queue_capacity = 16").unwrap();

        let config: Config = load_config(&path, &CliOverrides::default())
            .extract()
            .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.greeting, "Welcome");
        assert_eq!(config.history_size, 5);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.host, "127.0.0.1");

        let overrides = CliOverrides {
            host: Some("::1".to_string()),
            port: Some(6000),
        };
        let config: Config = load_config(&path, &overrides).extract().unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.greeting, "Welcome");
        assert_eq!(
            config.addr().unwrap(),
            "[::1]:6000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let c = Config {
            host: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let c = Config {
            history_size: MAX_HISTORY_ENTRIES + 1,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let c = Config {
            greeting: "g".repeat(MAX_FIELD_LEN + 1),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let c = Config {
            queue_capacity: 1,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }
}
