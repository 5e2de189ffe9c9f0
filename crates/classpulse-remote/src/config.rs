//! Configuration loading and service factories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use classpulse_core::engine::DashboardConfig;
use classpulse_core::traits::{RecordStore, RiskPredictor};

use crate::predict::HttpPredictor;
use crate::store::RestStore;

/// Document store endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Prediction service endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_predictor_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Top-level classpulse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClasspulseConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    /// Max concurrent per-student aggregations.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Cached aggregates older than this are recomputed.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Grade level assumed when a student record carries none.
    #[serde(default = "default_grade_level")]
    pub default_grade_level: u8,
}

fn default_store_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_predictor_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_parallelism() -> usize {
    8
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_grade_level() -> u8 {
    12
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: default_predictor_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ClasspulseConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            predictor: PredictorConfig::default(),
            parallelism: default_parallelism(),
            cache_ttl_secs: default_cache_ttl(),
            default_grade_level: default_grade_level(),
        }
    }
}

impl ClasspulseConfig {
    /// Engine configuration derived from this file.
    pub fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig {
            parallelism: self.parallelism,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            default_grade_level: self.default_grade_level,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `classpulse.toml` in the current directory
/// 2. `~/.config/classpulse/config.toml`
///
/// Environment variable overrides: `CLASSPULSE_STORE_URL`,
/// `CLASSPULSE_PREDICT_URL`.
pub fn load_config() -> Result<ClasspulseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ClasspulseConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("classpulse.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ClasspulseConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ClasspulseConfig::default(),
    };

    // Apply env var overrides
    if let Ok(url) = std::env::var("CLASSPULSE_STORE_URL") {
        config.store.base_url = url;
    }
    if let Ok(url) = std::env::var("CLASSPULSE_PREDICT_URL") {
        config.predictor.base_url = url;
    }

    config.store.base_url = resolve_env_vars(&config.store.base_url);
    config.predictor.base_url = resolve_env_vars(&config.predictor.base_url);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("classpulse"))
}

/// Create a document store client from its configuration.
pub fn create_store(config: &StoreConfig) -> Arc<dyn RecordStore> {
    Arc::new(RestStore::new(
        &config.base_url,
        Some(Duration::from_secs(config.timeout_secs)),
    ))
}

/// Create a prediction service client from its configuration.
pub fn create_predictor(config: &PredictorConfig) -> Arc<dyn RiskPredictor> {
    Arc::new(HttpPredictor::new(
        &config.base_url,
        Some(Duration::from_secs(config.timeout_secs)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_CLASSPULSE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_CLASSPULSE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_CLASSPULSE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_CLASSPULSE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = ClasspulseConfig::default();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.default_grade_level, 12);
        assert_eq!(config.store.base_url, "http://localhost:8080");
    }

    #[test]
    fn parse_config_file() {
        let toml_str = r#"
parallelism = 4
cache_ttl_secs = 60

[store]
base_url = "http://store.internal:9000"
timeout_secs = 3

[predictor]
base_url = "http://ml.internal:9001"
"#;
        let config: ClasspulseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.store.base_url, "http://store.internal:9000");
        assert_eq!(config.store.timeout_secs, 3);
        assert_eq!(config.predictor.base_url, "http://ml.internal:9001");
        assert_eq!(config.predictor.timeout_secs, 10);

        let dashboard = config.dashboard_config();
        assert_eq!(dashboard.parallelism, 4);
        assert_eq!(dashboard.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn explicit_missing_path_errors() {
        let err = load_config_from(Some(Path::new("/nonexistent/classpulse.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classpulse.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "parallelism = 2").unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.parallelism, 2);
    }
}
