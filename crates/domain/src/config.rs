//! Environment-driven configuration shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

use crate::model::Consistency;

pub const DEFAULT_CONTACT_POINTS: &str = "127.0.0.1,127.0.0.2,127.0.0.3";
pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_PROTOCOL_VERSION: u8 = 4;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 12_000;

/// Connection settings read from `CQLKIT_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    contact_points: Vec<String>,
    port: u16,
    protocol_version: u8,
    consistency: Consistency,
    request_timeout: Duration,
}

impl ClusterConfig {
    /// Hydrates `.env` (if present) and reads the optional connection
    /// variables. Unset or blank entries fall back to defaults; malformed
    /// ones surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let contact_points = get_optional_var("CQLKIT_CONTACT_POINTS")
            .unwrap_or_else(|| DEFAULT_CONTACT_POINTS.to_string());
        let port = parse_number("CQLKIT_PORT", DEFAULT_PORT)?;
        let protocol_version = parse_number("CQLKIT_PROTOCOL_VERSION", DEFAULT_PROTOCOL_VERSION)?;
        let timeout_ms = parse_number("CQLKIT_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        let consistency = match get_optional_var("CQLKIT_CONSISTENCY") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidConsistency { value })?,
            None => Consistency::One,
        };

        Ok(Self {
            contact_points: split_contact_points(&contact_points),
            port,
            protocol_version,
            consistency,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    pub fn contact_points(&self) -> &[String] {
        &self.contact_points
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn with_contact_points(mut self, raw: &str) -> Self {
        self.contact_points = split_contact_points(raw);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The single port all contact points resolve to; `port()` stands in for
    /// entries without an explicit one. Fails when entries disagree.
    pub fn shared_port(&self) -> Result<u16, ConfigError> {
        let mut shared = None;
        for contact_point in &self.contact_points {
            let port = match split_host_port(contact_point).1 {
                Some(port) => port.parse::<u16>().map_err(|source| ConfigError::InvalidNumber {
                    key: "CQLKIT_CONTACT_POINTS",
                    source,
                })?,
                None => self.port,
            };
            match shared {
                Some(first) if first != port => {
                    return Err(ConfigError::MixedPorts { first, other: port })
                }
                _ => shared = Some(port),
            }
        }
        Ok(shared.unwrap_or(self.port))
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contact_points: split_contact_points(DEFAULT_CONTACT_POINTS),
            port: DEFAULT_PORT,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            consistency: Consistency::One,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Splits a comma separated host list, dropping blank entries.
pub fn split_contact_points(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits `host[:port]` and `[v6]:port` into the host and its explicit port.
/// A bare IPv6 address has no port.
pub fn split_host_port(contact_point: &str) -> (&str, Option<&str>) {
    let contact_point = contact_point.trim();
    if let Some(rest) = contact_point.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (rest, None),
        };
    }
    match contact_point.split_once(':') {
        Some((host, port)) if !port.contains(':') => (host, Some(port)),
        _ => (contact_point, None),
    }
}

fn parse_number<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("CQLKIT_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("unknown consistency level `{value}`")]
    InvalidConsistency { value: String },
    #[error("contact points use different ports ({first} and {other})")]
    MixedPorts { first: u16, other: u16 },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn reset_env() {
        std::env::set_var("CQLKIT_SKIP_DOTENV", "1");
        std::env::remove_var("CQLKIT_CONTACT_POINTS");
        std::env::remove_var("CQLKIT_PORT");
        std::env::remove_var("CQLKIT_PROTOCOL_VERSION");
        std::env::remove_var("CQLKIT_CONSISTENCY");
        std::env::remove_var("CQLKIT_REQUEST_TIMEOUT_MS");
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let _guard = ENV_GUARD.lock().unwrap();
        reset_env();

        let config = ClusterConfig::load_from_env().expect("config loads");
        assert_eq!(config, ClusterConfig::default());
        assert_eq!(
            config.contact_points(),
            ["127.0.0.1", "127.0.0.2", "127.0.0.3"]
        );
        assert_eq!(config.consistency(), Consistency::One);
    }

    #[test]
    fn config_loader_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        reset_env();
        std::env::set_var("CQLKIT_CONTACT_POINTS", " 10.0.0.1 , ,10.0.0.2:9043 ");
        std::env::set_var("CQLKIT_PORT", "19042");
        std::env::set_var("CQLKIT_CONSISTENCY", "local_quorum");
        std::env::set_var("CQLKIT_REQUEST_TIMEOUT_MS", "250");

        let config = ClusterConfig::load_from_env().expect("config loads");
        assert_eq!(config.contact_points(), ["10.0.0.1", "10.0.0.2:9043"]);
        assert_eq!(config.port(), 19042);
        assert_eq!(config.consistency(), Consistency::LocalQuorum);
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert!(matches!(
            config.shared_port(),
            Err(ConfigError::MixedPorts { first: 19042, other: 9043 })
        ));

        reset_env();
    }

    #[test]
    fn shared_port_prefers_explicit_ports() {
        let config = ClusterConfig::default().with_contact_points("127.0.0.1:9142, [::1]:9142");
        assert_eq!(config.shared_port().unwrap(), 9142);

        let config = ClusterConfig::default().with_contact_points("127.0.0.1").with_port(19042);
        assert_eq!(config.shared_port().unwrap(), 19042);

        let config = ClusterConfig::default().with_contact_points("127.0.0.1:port");
        assert!(matches!(
            config.shared_port(),
            Err(ConfigError::InvalidNumber { key: "CQLKIT_CONTACT_POINTS", .. })
        ));
    }

    #[test]
    fn splits_hosts_from_ports() {
        assert_eq!(split_host_port("127.0.0.1"), ("127.0.0.1", None));
        assert_eq!(split_host_port("127.0.0.2:9042"), ("127.0.0.2", Some("9042")));
        assert_eq!(split_host_port("[::1]:9042"), ("::1", Some("9042")));
        assert_eq!(split_host_port("::1"), ("::1", None));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        reset_env();
        std::env::set_var("CQLKIT_PORT", "nine");
        let err = ClusterConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "CQLKIT_PORT", .. }));

        reset_env();
        std::env::set_var("CQLKIT_CONSISTENCY", "most");
        let err = ClusterConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConsistency { .. }));

        reset_env();
    }
}
