// Client configuration for the remote execution backend
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings for talking to the execution backend.
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub base64_encoded: bool,

    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub pool_timeout_ms: u64,
    pub max_connections: usize,
    pub max_idle_connections: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,

    pub poll_deadline_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_step_ms: u64,
    pub poll_max_interval_ms: u64,
    pub poll_jitter_ms: u64,

    pub small_batch_threshold: usize,
    pub small_batch_concurrency: usize,
    pub fallback_fetch_concurrency: usize,
    pub batch_deadline_ms: u64,
    pub batch_poll_interval_ms: u64,

    pub catalog_ttl_secs: u64,
    pub retired_language_ids: Vec<i32>,
    pub fallback_language_id: i32,
    pub preferred_runtime_prefixes: Vec<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2358".to_string(),
            api_key: None,
            api_host: None,
            base64_encoded: false,

            connect_timeout_ms: 3_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 5_000,
            pool_timeout_ms: 5_000,
            max_connections: 20,
            max_idle_connections: 10,
            max_attempts: 3,
            retry_backoff_ms: 500,

            poll_deadline_ms: 25_000,
            poll_interval_ms: 350,
            poll_step_ms: 50,
            poll_max_interval_ms: 1_000,
            poll_jitter_ms: 50,

            small_batch_threshold: 8,
            small_batch_concurrency: 4,
            fallback_fetch_concurrency: 8,
            batch_deadline_ms: 60_000,
            batch_poll_interval_ms: 1_000,

            catalog_ttl_secs: 3_600,
            retired_language_ids: vec![28],
            fallback_language_id: 71,
            preferred_runtime_prefixes: vec!["python (3".to_string(), "python 3".to_string()],
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl JudgeConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Judge config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: JudgeConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment values (looked up through `lookup`) onto this config
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("JUDGE0_BASE_URL") {
            self.base_url = url.trim().to_string();
        }
        if let Some(key) = non_empty("JUDGE0_KEY") {
            self.api_key = Some(key);
        }
        if let Some(host) = non_empty("JUDGE0_HOST") {
            self.api_host = Some(host);
        }
        if let Some(raw) = non_empty("JUDGE0_TIMEOUT_S") {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("JUDGE0_TIMEOUT_S is not a number: {}", raw))?;
            if secs <= 0.0 {
                bail!("JUDGE0_TIMEOUT_S must be positive, got {}", secs);
            }
            self.read_timeout_ms = (secs * 1000.0) as u64;
        }
        if let Some(raw) = non_empty("JUDGE0_BASE64") {
            self.base64_encoded = parse_bool(&raw);
        }
        Ok(())
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            bail!("base_url must be an http(s) URL: {}", self.base_url);
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.small_batch_concurrency == 0 || self.fallback_fetch_concurrency == 0 {
            bail!("batch concurrency widths must be at least 1");
        }
        Ok(())
    }

    /// RapidAPI-style auth headers, only when both key and host are configured
    pub fn auth_headers(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.api_host.as_deref()) {
            (Some(key), Some(host)) if !key.is_empty() && !host.is_empty() => Some((key, host)),
            _ => None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.poll_deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_step(&self) -> Duration {
        Duration::from_millis(self.poll_step_ms)
    }

    pub fn poll_max_interval(&self) -> Duration {
        Duration::from_millis(self.poll_max_interval_ms)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_ms)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = JudgeConfig::default();
        assert_eq!(config.poll_deadline(), Duration::from_secs(25));
        assert_eq!(config.poll_interval(), Duration::from_millis(350));
        assert_eq!(config.small_batch_threshold, 8);
        assert_eq!(config.small_batch_concurrency, 4);
        assert_eq!(config.fallback_fetch_concurrency, 8);
        assert_eq!(config.catalog_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("JUDGE0_BASE_URL", "https://judge.example.com"),
            ("JUDGE0_KEY", "secret"),
            ("JUDGE0_HOST", "judge0-ce.p.rapidapi.com"),
            ("JUDGE0_TIMEOUT_S", "12.5"),
            ("JUDGE0_BASE64", "true"),
        ]);

        let mut config = JudgeConfig::default();
        config
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.base_url, "https://judge.example.com");
        assert_eq!(config.read_timeout_ms, 12_500);
        assert!(config.base64_encoded);
        assert_eq!(
            config.auth_headers(),
            Some(("secret", "judge0-ce.p.rapidapi.com"))
        );
    }

    #[test]
    fn test_env_overlay_rejects_bad_timeout() {
        let mut config = JudgeConfig::default();
        let result = config.apply_env_from(|key| {
            (key == "JUDGE0_TIMEOUT_S").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_headers_need_both_values() {
        let config = JudgeConfig {
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(config.auth_headers().is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"base_url": "http://judge:2358", "small_batch_threshold": 3}}"#
        )
        .unwrap();

        let config = JudgeConfig::load(file.path()).unwrap();
        assert_eq!(config.base_url, "http://judge:2358");
        assert_eq!(config.small_batch_threshold, 3);
        assert_eq!(config.fallback_language_id, 71);
    }

    #[test]
    fn test_load_missing_file() {
        let result = JudgeConfig::load(Path::new("does/not/exist.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_widths() {
        let config = JudgeConfig {
            fallback_fetch_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = JudgeConfig {
            base_url: "judge:2358".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
