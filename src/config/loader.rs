//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection and merging of environment-specific sections.

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: &[&str] = &["detection-engine.yaml", "detection-engine.yml"];
const ENVIRONMENT_SECTIONS: &[&str] = &["development", "test", "production"];

/// Loaded configuration together with the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::expand_environment_variables(&mut config);
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            max_parallel_tasks = config.task_driver.max_parallel_tasks,
            random_worker_id = config.worker.random_worker_id_enabled,
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: EngineConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        let environment = if config.environment.is_empty() {
            Self::detect_environment()
        } else {
            config.environment.clone()
        };
        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration as JSON, safe for logging
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("DETECTION_ENGINE_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
            let dir = PathBuf::from(manifest_dir).join("config");
            if dir.exists() {
                return dir;
            }
        }
        PathBuf::from("config")
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
            searched_paths.push(config_path);
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Load and merge configuration with environment-specific overrides
    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<EngineConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = std::fs::read_to_string(&config_file)
            .map_err(|e| ConfigurationError::file_read_error(config_file.display().to_string(), e))?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides)?;
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String((*section).to_string()));
            }
        }

        let mut config: EngineConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;
        config.environment = environment.to_string();

        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) -> ConfigResult<()> {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value)?;
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (YamlValue::Mapping(_), other) => {
                return Err(ConfigurationError::ConfigMergeError {
                    error: format!("cannot merge non-mapping override {other:?} into a mapping"),
                });
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
        Ok(())
    }

    /// Expand a `${VAR}` database URL from the process environment
    fn expand_environment_variables(config: &mut EngineConfig) {
        if let Some(ref mut url) = config.database.url {
            if url.starts_with("${") && url.ends_with('}') {
                let var_name = url[2..url.len() - 1].to_string();
                match env::var(&var_name) {
                    Ok(env_value) => {
                        debug!("Expanding environment variable {} in database URL", var_name);
                        *url = env_value;
                    }
                    Err(_) => {
                        warn!(
                            "Environment variable {} not found, falling back to database components",
                            var_name
                        );
                        config.database.url = None;
                    }
                }
            }
        }
    }

    fn sanitize_config_for_logging(config: &EngineConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && !val.is_null() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_nested_values() {
        let mut base: YamlValue =
            serde_yaml::from_str("task_driver:\n  max_parallel_tasks: 5\n  task_fetch_size_cap: 50\n")
                .unwrap();
        let overrides: YamlValue =
            serde_yaml::from_str("task_driver:\n  max_parallel_tasks: 2\n").unwrap();

        ConfigManager::merge_yaml_values(&mut base, overrides).unwrap();

        let config: EngineConfig = serde_yaml::from_value(base).unwrap();
        assert_eq!(config.task_driver.max_parallel_tasks, 2);
        assert_eq!(config.task_driver.task_fetch_size_cap, 50);
    }

    #[test]
    fn test_sanitize_masks_password() {
        let mut config = EngineConfig::default();
        config.database.password = "hunter2".to_string();
        let sanitized = ConfigManager::sanitize_config_for_logging(&config);
        assert_eq!(sanitized["database"]["password"], "[MASKED]");
        assert_eq!(sanitized["database"]["host"], "localhost");
    }
}
