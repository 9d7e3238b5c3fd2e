use std::path::PathBuf;

use crate::inference::OutputKind;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    pub model_output: OutputKind,
    pub model_version: String,
    pub threshold: f32,
    pub schema_path: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub api_keys: Vec<String>,
    pub rate_limit: u32,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: num_cpus::get(),
            model_path: PathBuf::from("models/telcom_churn.onnx"),
            model_output: OutputKind::Probability,
            model_version: "1.0.0".to_string(),
            threshold: 0.5,
            schema_path: None,
            static_dir: PathBuf::from("./static"),
            api_keys: Vec::new(),
            rate_limit: 100,
            allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:8080".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable values keep the
    /// default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let threshold = parse_or(get("CHURN_THRESHOLD"), "CHURN_THRESHOLD", defaults.threshold);
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            log::warn!("CHURN_THRESHOLD is not finite, using {}", defaults.threshold);
            defaults.threshold
        };

        let workers = parse_or(get("WORKERS"), "WORKERS", defaults.workers).max(1);

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get("PORT"), "PORT", defaults.port),
            workers,
            model_path: get("CHURN_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            model_output: parse_or(
                get("CHURN_MODEL_OUTPUT"),
                "CHURN_MODEL_OUTPUT",
                defaults.model_output,
            ),
            model_version: get("CHURN_MODEL_VERSION").unwrap_or(defaults.model_version),
            threshold,
            schema_path: get("CHURN_SCHEMA_PATH").map(PathBuf::from),
            static_dir: get("CHURN_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            api_keys: get("CHURN_API_KEYS")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.api_keys),
            rate_limit: parse_or(get("CHURN_RATE_LIMIT"), "CHURN_RATE_LIMIT", defaults.rate_limit),
            allowed_origins: get("CHURN_ALLOWED_ORIGINS")
                .map(|value| split_list(&value))
                .unwrap_or(defaults.allowed_origins),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Limit for batch endpoints: a fifth of the single-record limit.
    pub fn batch_rate_limit(&self) -> u32 {
        if self.rate_limit == 0 {
            0
        } else {
            (self.rate_limit / 5).max(1)
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match value {
        Some(raw) => match raw.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("Invalid value {:?} for {}, using {:?}", raw, key, default);
                default
            }
        },
        None => default,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.model_output, OutputKind::Probability);
        assert!(config.api_keys.is_empty());
        assert!(config.schema_path.is_none());
        assert!(config.workers >= 1);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "9000"),
            ("WORKERS", "2"),
            ("CHURN_MODEL_PATH", "/srv/model.onnx"),
            ("CHURN_MODEL_OUTPUT", "logit"),
            ("CHURN_THRESHOLD", "0.35"),
            ("CHURN_SCHEMA_PATH", "/srv/schema.json"),
            ("CHURN_API_KEYS", "alpha, beta,,"),
            ("CHURN_RATE_LIMIT", "50"),
        ]);
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.workers, 2);
        assert_eq!(config.model_path, PathBuf::from("/srv/model.onnx"));
        assert_eq!(config.model_output, OutputKind::Logit);
        assert_eq!(config.threshold, 0.35);
        assert_eq!(config.schema_path, Some(PathBuf::from("/srv/schema.json")));
        assert_eq!(config.api_keys, vec!["alpha", "beta"]);
        assert_eq!(config.rate_limit, 50);
        assert_eq!(config.batch_rate_limit(), 10);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "eighty"),
            ("CHURN_THRESHOLD", "1.7"),
            ("CHURN_MODEL_OUTPUT", "softmax2"),
            ("WORKERS", "0"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.threshold, 1.0);
        assert_eq!(config.model_output, OutputKind::Probability);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn zero_rate_limit_disables_batch_limit() {
        let config = config_from(&[("CHURN_RATE_LIMIT", "0")]);
        assert_eq!(config.batch_rate_limit(), 0);
    }
}
