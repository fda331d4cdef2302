use std::env;

use crate::error::AppError;

/// Listener configuration, sourced from environment variables.
///
/// Environment variables must be set by the runtime environment; every value
/// has a sensible default for local play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("GOMOKU_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("GOMOKU_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                AppError::config(format!("GOMOKU_PORT must be a valid port number, got '{raw}'"))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self { host, port })
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

pub const DEFAULT_PORT: u16 = 9090;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn explicit_values_override_the_defaults() {
        let config = ServerConfig::from_lookup(|key| match key {
            "GOMOKU_HOST" => Some("127.0.0.1".to_string()),
            "GOMOKU_PORT" => Some("4321".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 4321);
    }

    #[test]
    fn unparseable_port_is_a_config_error() {
        let err = ServerConfig::from_lookup(|key| {
            (key == "GOMOKU_PORT").then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }
}
