// src/config/validate.rs

use std::collections::HashSet;

use crate::backend::BACKEND_NAMES;
use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::{ClusterflowError, Result};

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = ClusterflowError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_workflow(&raw)?;
        Ok(WorkflowFile::new_unchecked(raw.config, raw.defaults, raw.targets))
    }
}

pub fn validate_raw_workflow(raw: &RawWorkflowFile) -> Result<()> {
    ensure_has_targets(raw)?;
    validate_global_config(raw)?;
    validate_target_names(raw)?;
    Ok(())
}

fn ensure_has_targets(raw: &RawWorkflowFile) -> Result<()> {
    if raw.targets.is_empty() {
        return Err(ClusterflowError::ConfigError(
            "workflow must contain at least one [[target]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawWorkflowFile) -> Result<()> {
    if raw.config.poll_interval_ms == 0 {
        return Err(ClusterflowError::ConfigError(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    validate_backend_name(&raw.config.backend)
}

pub fn validate_backend_name(name: &str) -> Result<()> {
    if !BACKEND_NAMES.contains(&name) {
        return Err(ClusterflowError::ConfigError(format!(
            "unknown backend '{}' (known: {})",
            name,
            BACKEND_NAMES.join(", ")
        )));
    }
    Ok(())
}

fn validate_target_names(raw: &RawWorkflowFile) -> Result<()> {
    let mut seen = HashSet::new();
    for target in &raw.targets {
        let name = target.name.as_str();
        if name.is_empty() {
            return Err(ClusterflowError::ConfigError(
                "target name must not be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ClusterflowError::ConfigError(format!(
                "target name '{name}' must not contain whitespace"
            )));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ClusterflowError::ConfigError(format!(
                "target name '{name}' must not be a path"
            )));
        }
        if !seen.insert(name) {
            return Err(ClusterflowError::ConfigError(format!(
                "target '{name}' is defined more than once"
            )));
        }
    }
    Ok(())
}
