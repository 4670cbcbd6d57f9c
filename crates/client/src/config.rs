//! Client configuration from environment variables.

use std::time::Duration;

use fixline_shared::WS_PATH;
use thiserror::Error;
use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
    #[error("invalid number in {var}: `{value}`")]
    InvalidNumber { var: &'static str, value: String },
}

/// Who we are, announced to the server once the stream opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Event stream endpoint (`ws://` or `wss://`).
    pub endpoint: Url,
    /// Deadline for the handshake of a single connection attempt.
    pub connect_timeout: Duration,
    /// Delay between open and the liveness ping.
    pub heartbeat_delay: Duration,
    pub reconnect: ReconnectConfig,
    /// Capacity of the broadcast channel behind `events()`.
    pub event_capacity: usize,
    pub identity: Option<Identity>,
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn for_endpoint(endpoint: Url) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_millis(5000),
            heartbeat_delay: Duration::from_millis(1000),
            reconnect: ReconnectConfig::default(),
            event_capacity: 256,
            identity: None,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `FIXLINE_BASE_URL`: application server (default: "http://localhost:5000")
    /// - `FIXLINE_WS_URL`: explicit event stream URL, overrides the derived one
    /// - `FIXLINE_CONNECT_TIMEOUT_MS`: connect deadline (default: 5000)
    /// - `FIXLINE_RECONNECT_MAX_ATTEMPTS`: retries before cooldown (default: 10, 0 = unlimited)
    /// - `FIXLINE_RECONNECT_COOLDOWN_MS`: cooldown length (default: 60000)
    /// - `FIXLINE_USER_ID`, `FIXLINE_USERNAME`, `FIXLINE_USER_ROLE`: identity sent on open
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = match lookup("FIXLINE_WS_URL") {
            Some(raw) => {
                let url = parse_url("FIXLINE_WS_URL", &raw)?;
                match url.scheme() {
                    "ws" | "wss" => url,
                    _ => endpoint_from_base(&url)?,
                }
            }
            None => {
                let raw = lookup("FIXLINE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                endpoint_from_base(&parse_url("FIXLINE_BASE_URL", &raw)?)?
            }
        };

        let mut config = Self::for_endpoint(endpoint);

        if let Some(ms) = parse_number::<u64>(&lookup, "FIXLINE_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parse_number::<u32>(&lookup, "FIXLINE_RECONNECT_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = max;
        }
        if let Some(ms) = parse_number::<u64>(&lookup, "FIXLINE_RECONNECT_COOLDOWN_MS")? {
            config.reconnect.cooldown = Duration::from_millis(ms);
        }

        let user_id = parse_number::<i64>(&lookup, "FIXLINE_USER_ID")?;
        let username = lookup("FIXLINE_USERNAME").filter(|name| !name.trim().is_empty());
        if let (Some(user_id), Some(username)) = (user_id, username) {
            config.identity = Some(Identity {
                user_id,
                username,
                role: lookup("FIXLINE_USER_ROLE").filter(|role| !role.trim().is_empty()),
            });
        }

        Ok(config)
    }
}

/// Event stream URL for an application server: same host and port, `/ws`
/// path, secure transport when the server is served over TLS.
pub fn endpoint_from_base(base: &Url) -> Result<Url, ConfigError> {
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    let mut endpoint = base.clone();
    endpoint
        .set_scheme(scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(base.scheme().to_string()))?;
    endpoint.set_path(WS_PATH);
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    Ok(endpoint)
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_server() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://localhost:5000/ws");
        assert_eq!(config.connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.heartbeat_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.event_capacity, 256);
        assert!(config.identity.is_none());
    }

    #[test]
    fn secure_base_maps_to_wss() {
        let config = ClientConfig::from_lookup(lookup(&[(
            "FIXLINE_BASE_URL",
            "https://facility.example.com:8443/app?x=1",
        )]))
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://facility.example.com:8443/ws");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("FIXLINE_BASE_URL", "https://ignored.example.com"),
            ("FIXLINE_WS_URL", "ws://10.0.0.5:9000/events"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "ws://10.0.0.5:9000/events");
    }

    #[test]
    fn numeric_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("FIXLINE_CONNECT_TIMEOUT_MS", "2500"),
            ("FIXLINE_RECONNECT_MAX_ATTEMPTS", "0"),
            ("FIXLINE_RECONNECT_COOLDOWN_MS", " 120000 "),
        ]))
        .unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.reconnect.cooldown, Duration::from_secs(120));
    }

    #[test]
    fn bad_values_are_reported() {
        let err = ClientConfig::from_lookup(lookup(&[("FIXLINE_CONNECT_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { var: "FIXLINE_CONNECT_TIMEOUT_MS", .. }
        ));

        let err =
            ClientConfig::from_lookup(lookup(&[("FIXLINE_BASE_URL", "ftp://host")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(s) if s == "ftp"));

        let err = ClientConfig::from_lookup(lookup(&[("FIXLINE_BASE_URL", "not a url")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn identity_needs_id_and_username() {
        let config = ClientConfig::from_lookup(lookup(&[("FIXLINE_USERNAME", "jan")])).unwrap();
        assert!(config.identity.is_none());

        let config = ClientConfig::from_lookup(lookup(&[
            ("FIXLINE_USER_ID", "7"),
            ("FIXLINE_USERNAME", "jan"),
            ("FIXLINE_USER_ROLE", "technician"),
        ]))
        .unwrap();
        assert_eq!(
            config.identity,
            Some(Identity {
                user_id: 7,
                username: "jan".to_string(),
                role: Some("technician".to_string()),
            })
        );
    }
}
