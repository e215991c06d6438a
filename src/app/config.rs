//! Commissioner configuration.

use std::time::Duration;

use crate::core::DEFAULT_MAX_DEPTH;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Subscription min interval {min:?} exceeds max interval {max:?}")]
    IntervalOrder { min: Duration, max: Duration },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommissionerConfig {
    /// Deepest PartsList nesting the topology walk accepts.
    pub topology_max_depth: usize,
    /// Timeout handed to the controller for cluster command invokes.
    pub command_timeout: Duration,
    /// Fail reconciliation instead of writing a degraded ACL entry.
    pub require_admin_entry: bool,
    /// Remove the fabric from the device when a post-join stage fails.
    pub rollback_on_failure: bool,
    pub subscription_min_interval: Duration,
    pub subscription_max_interval: Duration,
}

impl Default for CommissionerConfig {
    fn default() -> Self {
        Self {
            topology_max_depth: DEFAULT_MAX_DEPTH,
            command_timeout: Duration::from_millis(15_000),
            require_admin_entry: false,
            rollback_on_failure: true,
            subscription_min_interval: Duration::from_secs(1),
            subscription_max_interval: Duration::from_secs(10),
        }
    }
}

impl CommissionerConfig {
    /// Defaults overridden by `MATTER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            topology_max_depth: parse(&lookup, "MATTER_TOPOLOGY_MAX_DEPTH")?
                .unwrap_or(defaults.topology_max_depth),
            command_timeout: parse(&lookup, "MATTER_COMMAND_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.command_timeout),
            require_admin_entry: parse_bool(&lookup, "MATTER_REQUIRE_ADMIN_ACL")?
                .unwrap_or(defaults.require_admin_entry),
            rollback_on_failure: parse_bool(&lookup, "MATTER_ROLLBACK_ON_FAILURE")?
                .unwrap_or(defaults.rollback_on_failure),
            subscription_min_interval: parse(&lookup, "MATTER_SUB_MIN_INTERVAL_S")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.subscription_min_interval),
            subscription_max_interval: parse(&lookup, "MATTER_SUB_MAX_INTERVAL_S")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.subscription_max_interval),
        };
        if config.subscription_min_interval > config.subscription_max_interval {
            return Err(ConfigError::IntervalOrder {
                min: config.subscription_min_interval,
                max: config.subscription_max_interval,
            });
        }
        Ok(config)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    key,
                    reason: e.to_string(),
                    value,
                })
        })
        .transpose()
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    lookup(key)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key,
                value,
                reason: "expected a boolean".to_string(),
            }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = CommissionerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CommissionerConfig::default());
        assert_eq!(config.topology_max_depth, 8);
        assert!(config.rollback_on_failure);
    }

    #[test]
    fn test_overrides() {
        let config = CommissionerConfig::from_lookup(lookup(&[
            ("MATTER_TOPOLOGY_MAX_DEPTH", "3"),
            ("MATTER_COMMAND_TIMEOUT_MS", "1000"),
            ("MATTER_REQUIRE_ADMIN_ACL", "TRUE"),
            ("MATTER_ROLLBACK_ON_FAILURE", "0"),
        ]))
        .unwrap();
        assert_eq!(config.topology_max_depth, 3);
        assert_eq!(config.command_timeout, Duration::from_secs(1));
        assert!(config.require_admin_entry);
        assert!(!config.rollback_on_failure);
    }

    #[test]
    fn test_invalid_values() {
        let err = CommissionerConfig::from_lookup(lookup(&[("MATTER_TOPOLOGY_MAX_DEPTH", "deep")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "MATTER_TOPOLOGY_MAX_DEPTH", .. }
        ));

        let err = CommissionerConfig::from_lookup(lookup(&[
            ("MATTER_SUB_MIN_INTERVAL_S", "30"),
            ("MATTER_SUB_MAX_INTERVAL_S", "10"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::IntervalOrder { .. }));
    }
}
