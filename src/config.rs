use std::{collections::BTreeSet, env, time::Duration};

use thiserror::Error;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const CANONICAL_INIT_NOTIFICATION: &str = "notifications/initialized";

const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIST_WAIT_SECS: u64 = 10;
const DEFAULT_READ_POLL_SECS: u64 = 1;
const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NOTIFY_ALIASES: &[&str] = &["initialized"];

/// Behavioral switches that differ between MCP clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPolicy {
    /// Reject `tools/list` and `tools/call` with `-32002` until the client
    /// sent the initialization-complete notification.
    pub enforce_init_before_list: bool,
    pub call_deadline: Duration,
    /// Report an exceeded deadline as a JSON-RPC error instead of a textual result.
    pub timeout_is_error: bool,
    /// Method names accepted as the initialization-complete notification.
    /// Always contains the canonical name.
    pub notify_aliases: BTreeSet<String>,
}

impl ServerPolicy {
    pub fn is_init_notification(&self, method: &str) -> bool {
        self.notify_aliases.contains(method)
    }
}

impl Default for ServerPolicy {
    fn default() -> Self {
        let mut notify_aliases: BTreeSet<String> = DEFAULT_NOTIFY_ALIASES
            .iter()
            .map(|alias| alias.to_string())
            .collect();
        notify_aliases.insert(CANONICAL_INIT_NOTIFICATION.to_string());

        Self {
            enforce_init_before_list: true,
            call_deadline: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            timeout_is_error: true,
            notify_aliases,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub protocol_version: String,
    pub policy: ServerPolicy,
    pub list_wait: Duration,
    pub read_poll: Duration,
    pub load_timeout: Duration,
    /// Service keys selected for the catalog; `None` selects every known service.
    pub services: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be one of: true, false, 1, 0, yes, no, on, off")]
    InvalidBool(&'static str),
    #[error("{0} must be a whole number of seconds")]
    InvalidSeconds(&'static str),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("MCP_SERVICES must name at least one service")]
    EmptyServices,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: env!("CARGO_PKG_NAME").to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            policy: ServerPolicy::default(),
            list_wait: Duration::from_secs(DEFAULT_LIST_WAIT_SECS),
            read_poll: Duration::from_secs(DEFAULT_READ_POLL_SECS),
            load_timeout: Duration::from_secs(DEFAULT_LOAD_TIMEOUT_SECS),
            services: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let server_name =
            var("MCP_SERVER_NAME").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let protocol_version =
            var("MCP_PROTOCOL_VERSION").unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string());

        let enforce_init_before_list = var("MCP_ENFORCE_INIT")
            .map(|value| parse_bool("MCP_ENFORCE_INIT", &value))
            .transpose()?
            .unwrap_or(true);
        let timeout_is_error = var("MCP_TIMEOUT_IS_ERROR")
            .map(|value| parse_bool("MCP_TIMEOUT_IS_ERROR", &value))
            .transpose()?
            .unwrap_or(true);

        let call_deadline = positive_seconds(
            "MCP_CALL_TIMEOUT_SECS",
            var("MCP_CALL_TIMEOUT_SECS"),
            DEFAULT_CALL_TIMEOUT_SECS,
        )?;
        let read_poll = positive_seconds(
            "MCP_READ_POLL_SECS",
            var("MCP_READ_POLL_SECS"),
            DEFAULT_READ_POLL_SECS,
        )?;
        let load_timeout = positive_seconds(
            "MCP_LOAD_TIMEOUT_SECS",
            var("MCP_LOAD_TIMEOUT_SECS"),
            DEFAULT_LOAD_TIMEOUT_SECS,
        )?;
        // zero is allowed here: answer tools/list with whatever is published
        let list_wait = var("MCP_LIST_WAIT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidSeconds("MCP_LIST_WAIT_SECS"))
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_LIST_WAIT_SECS));

        let mut notify_aliases: BTreeSet<String> = match var("MCP_NOTIFY_ALIASES") {
            Some(value) => split_list(&value).collect(),
            None => DEFAULT_NOTIFY_ALIASES
                .iter()
                .map(|alias| alias.to_string())
                .collect(),
        };
        notify_aliases.insert(CANONICAL_INIT_NOTIFICATION.to_string());

        let services = var("MCP_SERVICES")
            .map(|value| {
                let keys = split_list(&value)
                    .map(|key| key.to_ascii_lowercase())
                    .collect::<Vec<_>>();
                if keys.is_empty() {
                    Err(ConfigError::EmptyServices)
                } else {
                    Ok(keys)
                }
            })
            .transpose()?;

        Ok(Self {
            server_name,
            protocol_version,
            policy: ServerPolicy {
                enforce_init_before_list,
                call_deadline,
                timeout_is_error,
                notify_aliases,
            },
            list_wait,
            read_poll,
            load_timeout,
            services,
        })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool(key)),
    }
}

fn positive_seconds(
    key: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    let seconds = value
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidSeconds(key))
        })
        .transpose()?
        .unwrap_or(default);

    if seconds == 0 {
        return Err(ConfigError::ZeroDuration(key));
    }

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");

        assert_eq!(config.server_name, env!("CARGO_PKG_NAME"));
        assert_eq!(config.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert!(config.policy.enforce_init_before_list);
        assert!(config.policy.timeout_is_error);
        assert_eq!(config.policy.call_deadline, Duration::from_secs(30));
        assert_eq!(config.list_wait, Duration::from_secs(10));
        assert_eq!(config.read_poll, Duration::from_secs(1));
        assert!(config.policy.is_init_notification("notifications/initialized"));
        assert!(config.policy.is_init_notification("initialized"));
        assert!(config.services.is_none());
    }

    #[test]
    fn permissive_policy_and_custom_timeouts_parse() {
        let config = config_from(&[
            ("MCP_ENFORCE_INIT", "off"),
            ("MCP_TIMEOUT_IS_ERROR", "false"),
            ("MCP_CALL_TIMEOUT_SECS", "5"),
            ("MCP_LIST_WAIT_SECS", "0"),
        ])
        .expect("config should parse");

        assert!(!config.policy.enforce_init_before_list);
        assert!(!config.policy.timeout_is_error);
        assert_eq!(config.policy.call_deadline, Duration::from_secs(5));
        assert_eq!(config.list_wait, Duration::ZERO);
    }

    #[test]
    fn custom_aliases_always_keep_canonical_name() {
        let config = config_from(&[("MCP_NOTIFY_ALIASES", "ready, client/ready")])
            .expect("config should parse");

        assert!(config.policy.is_init_notification("ready"));
        assert!(config.policy.is_init_notification("client/ready"));
        assert!(config.policy.is_init_notification(CANONICAL_INIT_NOTIFICATION));
        assert!(!config.policy.is_init_notification("initialized"));
    }

    #[test]
    fn services_are_normalized() {
        let config = config_from(&[("MCP_SERVICES", " ECS, oss ,,cloudmonitor")])
            .expect("config should parse");

        assert_eq!(
            config.services,
            Some(vec![
                "ecs".to_string(),
                "oss".to_string(),
                "cloudmonitor".to_string()
            ])
        );
    }

    #[test]
    fn zero_call_timeout_fails() {
        let err = config_from(&[("MCP_CALL_TIMEOUT_SECS", "0")])
            .expect_err("expected zero duration error");
        assert!(matches!(err, ConfigError::ZeroDuration("MCP_CALL_TIMEOUT_SECS")));
    }

    #[test]
    fn invalid_bool_fails() {
        let err =
            config_from(&[("MCP_ENFORCE_INIT", "maybe")]).expect_err("expected invalid bool");
        assert!(matches!(err, ConfigError::InvalidBool("MCP_ENFORCE_INIT")));
    }

    #[test]
    fn empty_service_list_fails() {
        let err = config_from(&[("MCP_SERVICES", " , ,")]).expect_err("expected empty services");
        assert!(matches!(err, ConfigError::EmptyServices));
    }
}
