//! Engine-level configuration: cache bounds, rate budget, transport settings
//! and provider endpoints. Loaded from an optional JSON file, then overridden
//! by `CHAT_TRANSLATE_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_PATH_ENV: &str = "CHAT_TRANSLATE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_ttl_ms: u64,
    pub cache_max_size: usize,
    pub cache_sweep_interval_ms: u64,
    pub rate_window_ms: u64,
    /// KeyedA calls admitted per window for each valid credential.
    pub rate_limit_per_credential: usize,
    pub request_timeout_ms: u64,
    pub target_lang: String,
    pub free_base_url: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    /// When unset the DeepL host is picked from the key suffix.
    pub deepl_base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 300_000,
            cache_max_size: 2000,
            cache_sweep_interval_ms: 60_000,
            rate_window_ms: 60_000,
            rate_limit_per_credential: 15,
            request_timeout_ms: 10_000,
            target_lang: "ja".into(),
            free_base_url: "https://translate.googleapis.com".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            gemini_model: "gemini-2.5-flash-lite".into(),
            deepl_base_url: None,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File named by `CHAT_TRANSLATE_CONFIG` (if any), then env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the environment in production).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })
        }

        if let Some(v) = lookup("CHAT_TRANSLATE_CACHE_TTL_MS") {
            self.cache_ttl_ms = parse("CHAT_TRANSLATE_CACHE_TTL_MS", v)?;
        }
        if let Some(v) = lookup("CHAT_TRANSLATE_CACHE_MAX_SIZE") {
            self.cache_max_size = parse("CHAT_TRANSLATE_CACHE_MAX_SIZE", v)?;
        }
        if let Some(v) = lookup("CHAT_TRANSLATE_RATE_LIMIT") {
            self.rate_limit_per_credential = parse("CHAT_TRANSLATE_RATE_LIMIT", v)?;
        }
        if let Some(v) = lookup("CHAT_TRANSLATE_TIMEOUT_MS") {
            self.request_timeout_ms = parse("CHAT_TRANSLATE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("CHAT_TRANSLATE_TARGET_LANG") {
            self.target_lang = v;
        }
        if let Some(v) = lookup("CHAT_TRANSLATE_GEMINI_MODEL") {
            self.gemini_model = v;
        }
        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms.max(1))
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.cache_max_size, 2000);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(60));
        assert_eq!(cfg.rate_window(), Duration::from_secs(60));
        assert_eq!(cfg.rate_limit_per_credential, 15);
        assert_eq!(cfg.target_lang, "ja");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"cache_max_size": 10, "target_lang": "en"}"#).unwrap();
        assert_eq!(cfg.cache_max_size, 10);
        assert_eq!(cfg.target_lang, "en");
        assert_eq!(cfg.cache_ttl_ms, 300_000);
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let env: HashMap<&str, &str> = [
            ("CHAT_TRANSLATE_RATE_LIMIT", "20"),
            ("CHAT_TRANSLATE_TARGET_LANG", "ko"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.rate_limit_per_credential, 20);
        assert_eq!(cfg.target_lang, "ko");

        let err = EngineConfig::default()
            .with_overrides(|k| (k == "CHAT_TRANSLATE_CACHE_TTL_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "CHAT_TRANSLATE_CACHE_TTL_MS", .. }));
    }
}
