//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{LivePatchConfig, PolicyKind};
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "livepatch.toml";

/// Loads and validates `<project_dir>/livepatch.toml`.
///
/// A missing file is not an error: the defaults apply.
pub fn load_config(project_dir: &Path) -> Result<LivePatchConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(LivePatchConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `livepatch.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<LivePatchConfig, ConfigError> {
    let config: LivePatchConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn is_field_descriptor(s: &str) -> bool {
    s.len() > 2 && s.starts_with('L') && s.ends_with(';') && !s.contains('.')
}

fn validate_config(config: &LivePatchConfig) -> Result<(), ConfigError> {
    let scheduler = &config.scheduler;
    if scheduler.policy == PolicyKind::Automatic {
        if scheduler.quiet_period_ms == 0 {
            return Err(invalid(
                "scheduler.quiet_period_ms",
                "must be greater than zero for the automatic policy",
            ));
        }
        if scheduler.poll_interval_ms == 0 {
            return Err(invalid(
                "scheduler.poll_interval_ms",
                "must be greater than zero for the automatic policy",
            ));
        }
    }

    for name in &config.classify.lambda_supertypes {
        if name.is_empty() || name.contains('.') || name.contains(';') {
            return Err(invalid(
                "classify.lambda_supertypes",
                format!("'{name}' is not an internal class name (use a/b/C)"),
            ));
        }
    }
    for marker in &config.classify.inline_markers {
        if !is_field_descriptor(marker) {
            return Err(invalid(
                "classify.inline_markers",
                format!("'{marker}' is not an annotation descriptor (use La/b/C;)"),
            ));
        }
    }
    if !is_field_descriptor(&config.groups.key_meta_annotation) {
        return Err(invalid(
            "groups.key_meta_annotation",
            "must be an annotation descriptor",
        ));
    }
    if !is_field_descriptor(&config.groups.method_key_annotation) {
        return Err(invalid(
            "groups.method_key_annotation",
            "must be an annotation descriptor",
        ));
    }
    Ok(())
}
