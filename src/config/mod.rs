use thiserror::Error;

pub const DEFAULT_DATABASE: &str = "tutor_bot";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is set but empty")]
    Empty(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigParameters {
    /// Without it the bot keeps identities in memory only.
    pub mongodb_uri: Option<String>,
    pub database: String,
    /// Dialogue states go to Redis when set, otherwise they live in memory.
    pub redis_url: Option<String>,
}

impl ConfigParameters {
    /// Reads the process environment, including anything loaded from `.env.local`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(key)),
                Some(value) => Ok(Some(value.trim().to_string())),
                None => Ok(None),
            }
        };
        Ok(ConfigParameters {
            mongodb_uri: optional("MONGODB_URI")?,
            database: optional("MONGODB_DATABASE")?.unwrap_or_else(|| DEFAULT_DATABASE.into()),
            redis_url: optional("REDIS_URL")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(vars: &[(&str, &str)]) -> Result<ConfigParameters, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigParameters::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_memory_everything() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.mongodb_uri, None);
        assert_eq!(cfg.redis_url, None);
        assert_eq!(cfg.database, DEFAULT_DATABASE);
    }

    #[test]
    fn reads_all_variables() {
        let cfg = parse(&[
            ("MONGODB_URI", "mongodb://localhost:27017 "),
            ("MONGODB_DATABASE", "school"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap();
        assert_eq!(cfg.mongodb_uri.as_deref(), Some("mongodb://localhost:27017"));
        assert_eq!(cfg.database, "school");
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn empty_value_is_an_error() {
        let err = parse(&[("MONGODB_URI", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Empty("MONGODB_URI")));
    }
}
