//! Configuration management for quillwork
//!
//! Stores settings in ~/.config/quillwork/reconcile.toml

use crate::reconcile::controller::Budget;
use crate::reconcile::prompts::PromptTemplates;
use crate::reconcile::validate::ValidatorPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "quillwork";
const CONFIG_FILE: &str = "reconcile.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Compensation rounds allowed after the initial response
    pub max_retries: u32,
    /// Characters of raw response quoted back in parse-error prompts
    pub excerpt_chars: usize,
    /// Treat empty required arrays as incomplete
    pub empty_arrays_incomplete: bool,
    /// Extra role → schema table (JSON or TOML), layered over the built-in roles
    pub schema_file: Option<PathBuf>,
    pub templates: PromptTemplates,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            excerpt_chars: 200,
            empty_arrays_incomplete: false,
            schema_file: None,
            templates: PromptTemplates::default(),
        }
    }
}

impl ReconcileConfig {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load config from the default location, or return defaults.
    /// Environment overrides are applied either way.
    pub fn load() -> Self {
        let config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Load from an explicit path. A corrupt file is set aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    "Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                    err
                );
                Self::default()
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().context("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content).context("Failed to write config")
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("QUILLWORK_MAX_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.max_retries = n,
                Err(_) => tracing::warn!("Ignoring invalid QUILLWORK_MAX_RETRIES={}", raw),
            }
        }
        if let Ok(path) = std::env::var("QUILLWORK_SCHEMA_FILE") {
            if !path.trim().is_empty() {
                self.schema_file = Some(PathBuf::from(path));
            }
        }
        self
    }

    pub fn budget(&self) -> Budget {
        Budget {
            max_retries: self.max_retries,
            excerpt_chars: self.excerpt_chars,
            templates: self.templates.clone(),
        }
    }

    pub fn validator_policy(&self) -> ValidatorPolicy {
        ValidatorPolicy {
            empty_arrays_incomplete: self.empty_arrays_incomplete,
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{}/{}", CONFIG_DIR, CONFIG_FILE))
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
