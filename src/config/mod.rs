use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{RelayError, Result};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_STUN_SERVER_URL: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub signaling: SignalingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL. `None` keeps lifecycle records in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Values handed to browser clients through `/signaling/config`.
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub public_url: Option<String>,
    pub stun_server_url: String,
    pub cors_allowed_origin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("SERVER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                RelayError::InvalidConfiguration(format!("SERVER_PORT must be a port number, got {raw:?}"))
            })?,
            None => DEFAULT_PORT,
        };

        let max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(RelayError::InvalidConfiguration(format!(
                        "DATABASE_MAX_CONNECTIONS must be a positive integer, got {raw:?}"
                    )))
                }
            },
            None => DEFAULT_DATABASE_MAX_CONNECTIONS,
        };

        let cors_allowed_origin = non_empty("CORS_ALLOWED_ORIGIN").filter(|o| o != "*");
        if let Some(origin) = &cors_allowed_origin {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(RelayError::InvalidConfiguration(format!(
                    "CORS_ALLOWED_ORIGIN must be an http(s) origin, got {origin:?}"
                )));
            }
        }

        let format = match non_empty("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            database: DatabaseConfig {
                url: non_empty("DATABASE_URL"),
                max_connections,
            },
            signaling: SignalingConfig {
                public_url: non_empty("SIGNALING_PUBLIC_URL"),
                stun_server_url: non_empty("STUN_SERVER_URL")
                    .unwrap_or_else(|| DEFAULT_STUN_SERVER_URL.to_string()),
                cors_allowed_origin,
            },
            logging: LoggingConfig { format },
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.parse_host(), self.server.port)
    }

    fn parse_host(&self) -> IpAddr {
        let host = self.server.host.trim();

        if let Ok(addr) = host.parse::<IpAddr>() {
            return addr;
        }

        match host {
            "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as an IP address, using 0.0.0.0"
                );
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, DEFAULT_DATABASE_MAX_CONNECTIONS);
        assert_eq!(config.signaling.stun_server_url, DEFAULT_STUN_SERVER_URL);
        assert!(config.signaling.cors_allowed_origin.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SERVER_PORT", "4000"),
            ("DATABASE_URL", "sqlite://sessions.db"),
            ("CORS_ALLOWED_ORIGIN", "https://app.example.com"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.database.url.as_deref(), Some("sqlite://sessions.db"));
        assert_eq!(
            config.signaling.cors_allowed_origin.as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_wildcard_origin_means_any() {
        let config = config_from(&[("CORS_ALLOWED_ORIGIN", "*")]).unwrap();
        assert!(config.signaling.cors_allowed_origin.is_none());
    }

    #[test]
    fn test_origin_without_scheme_is_rejected() {
        let err = config_from(&[("CORS_ALLOWED_ORIGIN", "app.example.com")]).unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[("SERVER_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let err = config_from(&[("DATABASE_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(matches!(err, RelayError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_parse_localhost() {
        let config = config_from(&[("SERVER_HOST", "localhost"), ("SERVER_PORT", "8080")]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_parse_ipv4_address() {
        let config = config_from(&[("SERVER_HOST", "192.168.1.1"), ("SERVER_PORT", "3000")]).unwrap();
        assert_eq!(config.bind_address(), "192.168.1.1:3000".parse().unwrap());
    }

    #[test]
    fn test_parse_ipv6_address() {
        let config = config_from(&[("SERVER_HOST", "::1")]).unwrap();
        assert_eq!(config.bind_address(), "[::1]:3001".parse().unwrap());
    }

    #[test]
    fn test_parse_empty_host() {
        let config = config_from(&[("SERVER_HOST", "")]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:3001".parse().unwrap());
    }

    #[test]
    fn test_parse_invalid_hostname_defaults_to_all() {
        let config = config_from(&[("SERVER_HOST", "invalid-hostname"), ("SERVER_PORT", "9000")]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:9000".parse().unwrap());
    }
}
