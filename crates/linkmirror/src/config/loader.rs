use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::ReconcilerConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ReconcilerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ReconcilerConfig, ConfigError> {
    let config: ReconcilerConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &ReconcilerConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queue_capacity must be greater than 0".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be greater than 0".to_string(),
        });
    }

    if config.query_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "query_timeout_secs must be greater than 0".to_string(),
        });
    }

    // Scanning must outlive the age-out threshold or `created` jobs are
    // dropped from the scan before they can be failed.
    if config.max_running_age_secs <= config.age_out_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "max_running_age_secs ({}) must be greater than age_out_secs ({})",
                config.max_running_age_secs, config.age_out_secs
            ),
        });
    }

    let mut seen = HashSet::new();
    for host in &config.hosts {
        if host.name.trim().is_empty() {
            return Err(ConfigError::InvalidHost {
                name: host.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if !seen.insert(host.name.as_str()) {
            return Err(ConfigError::InvalidHost {
                name: host.name.clone(),
                reason: "declared more than once".to_string(),
            });
        }
        if !(host.base_url.starts_with("http://") || host.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidHost {
                name: host.name.clone(),
                reason: format!("base_url '{}' is not an http(s) URL", host.base_url),
            });
        }
        if host.timeout_secs == 0 {
            return Err(ConfigError::InvalidHost {
                name: host.name.clone(),
                reason: "timeout_secs must be greater than 0".to_string(),
            });
        }
    }

    Ok(())
}
