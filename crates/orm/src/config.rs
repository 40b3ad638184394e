//! ORM configuration
//!
//! Plain configuration struct with defaults, builder-style setters and
//! environment loading.

use std::env;

use crate::error::{OrmError, OrmResult};
use crate::query::Conjunction;

const ENV_PLACEHOLDER_PREFIX: &str = "ELIF_ORM_PLACEHOLDER_PREFIX";
const ENV_DEFAULT_CONJUNCTION: &str = "ELIF_ORM_DEFAULT_CONJUNCTION";
const ENV_FETCH_BATCH_SIZE: &str = "ELIF_ORM_FETCH_BATCH_SIZE";
const ENV_TRACE_QUERIES: &str = "ELIF_ORM_TRACE_QUERIES";

/// Session-wide ORM configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OrmConfig {
    /// Prefix of the keys handed to models that have no stored id yet
    pub placeholder_prefix: String,
    /// Conjunction used for queries created through a session when no logic is given
    pub default_conjunction: Conjunction,
    /// Maximum ids per `IN (...)` batch in bulk relationship fetches (None = unbounded)
    pub fetch_batch_size: Option<usize>,
    /// Log every compiled store query at debug level
    pub trace_queries: bool,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            placeholder_prefix: "PLH".to_string(),
            default_conjunction: Conjunction::And,
            fetch_batch_size: None,
            trace_queries: false,
        }
    }
}

impl OrmConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> OrmResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> OrmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(prefix) = lookup(ENV_PLACEHOLDER_PREFIX) {
            config.placeholder_prefix = prefix;
        }

        if let Some(conjunction) = lookup(ENV_DEFAULT_CONJUNCTION) {
            config.default_conjunction = conjunction.parse().map_err(|_| {
                OrmError::Configuration(format!(
                    "{} must be AND or OR, got '{}'",
                    ENV_DEFAULT_CONJUNCTION, conjunction
                ))
            })?;
        }

        if let Some(batch) = lookup(ENV_FETCH_BATCH_SIZE) {
            let size = batch.trim().parse::<usize>().map_err(|_| {
                OrmError::Configuration(format!(
                    "{} must be a positive integer, got '{}'",
                    ENV_FETCH_BATCH_SIZE, batch
                ))
            })?;
            config.fetch_batch_size = Some(size);
        }

        if let Some(trace) = lookup(ENV_TRACE_QUERIES) {
            config.trace_queries = match trace.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(OrmError::Configuration(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_TRACE_QUERIES, other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_placeholder_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.placeholder_prefix = prefix.into();
        self
    }

    pub fn with_default_conjunction(mut self, conjunction: Conjunction) -> Self {
        self.default_conjunction = conjunction;
        self
    }

    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = Some(size);
        self
    }

    pub fn with_trace_queries(mut self, trace: bool) -> Self {
        self.trace_queries = trace;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> OrmResult<()> {
        if self.placeholder_prefix.trim().is_empty() {
            return Err(OrmError::Configuration(
                "Placeholder prefix cannot be empty".to_string(),
            ));
        }

        if self.fetch_batch_size == Some(0) {
            return Err(OrmError::Configuration(
                "Fetch batch size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrmConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, OrmConfig::default());
        assert_eq!(config.placeholder_prefix, "PLH");
        assert_eq!(config.fetch_batch_size, None);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = OrmConfig::from_lookup(lookup_from(&[
            (ENV_PLACEHOLDER_PREFIX, "TMP"),
            (ENV_DEFAULT_CONJUNCTION, "or"),
            (ENV_FETCH_BATCH_SIZE, "50"),
            (ENV_TRACE_QUERIES, "true"),
        ]))
        .unwrap();

        assert_eq!(config.placeholder_prefix, "TMP");
        assert_eq!(config.default_conjunction, Conjunction::Or);
        assert_eq!(config.fetch_batch_size, Some(50));
        assert!(config.trace_queries);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            OrmConfig::from_lookup(lookup_from(&[(ENV_FETCH_BATCH_SIZE, "many")])),
            Err(OrmError::Configuration(_))
        ));
        assert!(matches!(
            OrmConfig::from_lookup(lookup_from(&[(ENV_FETCH_BATCH_SIZE, "0")])),
            Err(OrmError::Configuration(_))
        ));
        assert!(matches!(
            OrmConfig::from_lookup(lookup_from(&[(ENV_DEFAULT_CONJUNCTION, "NAND")])),
            Err(OrmError::Configuration(_))
        ));
    }

    #[test]
    fn test_builder_pattern() {
        let config = OrmConfig::default()
            .with_placeholder_prefix("NEW")
            .with_fetch_batch_size(10)
            .with_trace_queries(true);
        assert_eq!(config.placeholder_prefix, "NEW");
        assert_eq!(config.fetch_batch_size, Some(10));
        assert!(config.validate().is_ok());
    }
}
