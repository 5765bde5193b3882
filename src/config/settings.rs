//! Runtime settings from the environment (`.env` is loaded when present).

use crate::error::ConfigError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Schema for in-code model descriptors. Applications pass it to `ModelMeta::schema`;
    /// models files name their own.
    pub schema: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            schema: "public".into(),
        }
    }
}

impl Settings {
    /// Reads `DATABASE_URL`, `MODEL_OPS_MAX_CONNECTIONS` and `MODEL_OPS_SCHEMA`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = match lookup("MODEL_OPS_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse::<u32>().map_err(|_| {
                ConfigError::Validation(format!("MODEL_OPS_MAX_CONNECTIONS must be a positive integer, got '{}'", v))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(ConfigError::Validation("MODEL_OPS_MAX_CONNECTIONS must be at least 1".into()));
        }
        Ok(Settings {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            max_connections,
            schema: lookup("MODEL_OPS_SCHEMA").unwrap_or_else(|| "public".into()),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Validation("DATABASE_URL is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(s, Settings::default());
        assert!(s.require_database_url().is_err());
    }

    #[test]
    fn reads_values() {
        let s = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/library"),
            ("MODEL_OPS_MAX_CONNECTIONS", "12"),
            ("MODEL_OPS_SCHEMA", "library"),
        ]))
        .expect("settings");
        assert_eq!(s.require_database_url().ok(), Some("postgres://localhost/library"));
        assert_eq!(s.max_connections, 12);
        assert_eq!(s.schema, "library");
    }

    #[test]
    fn rejects_bad_pool_size() {
        assert!(Settings::from_lookup(lookup(&[("MODEL_OPS_MAX_CONNECTIONS", "many")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("MODEL_OPS_MAX_CONNECTIONS", "0")])).is_err());
    }
}
