//! Application settings service.
//!
//! Experiment files describe what to run; these settings describe how
//! this machine prefers to run it: the default worker count and whether
//! to show progress output. Settings load from an optional TOML file
//! under the user configuration directory, with `SWEEPX_`-prefixed
//! environment variables taking precedence.
use crate::error::SweepXError;
use crate::Result;
use config::{Config as ConfigCrate, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// All application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// General behaviour settings
    #[serde(default)]
    pub general: GeneralSettings,
}

/// General behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Worker count used when the experiment file does not specify one
    #[serde(default = "default_workers")]
    pub default_workers: usize,
    /// Whether to display the progress spinner during a run
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_progress() -> bool {
    true
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            default_workers: default_workers(),
            progress: default_progress(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
        }
    }
}

/// Settings access trait for dependency injection.
///
/// Allows commands to be tested against fixed settings without touching
/// the user's configuration directory or environment.
pub trait SettingsService: Send + Sync {
    /// Current settings.
    fn settings(&self) -> Result<Settings>;

    /// Path of the settings file, whether or not it exists.
    fn settings_file_path(&self) -> Result<PathBuf>;
}

/// Production settings service reading the TOML file and environment.
pub struct ProductionSettingsService {
    cached: RwLock<Option<Settings>>,
}

impl ProductionSettingsService {
    /// Create a service; settings are loaded lazily and cached.
    pub fn new() -> Self {
        Self {
            cached: RwLock::new(None),
        }
    }

    fn load(&self) -> Result<Settings> {
        let mut builder = ConfigCrate::builder();
        if let Ok(path) = self.settings_file_path() {
            if path.exists() {
                debug!("loading settings from {}", path.display());
                builder = builder.add_source(File::from(path));
            }
        }
        builder = builder.add_source(Environment::with_prefix("SWEEPX").separator("__"));
        let settings = builder.build()?.try_deserialize::<Settings>()?;
        Ok(settings)
    }
}

impl SettingsService for ProductionSettingsService {
    fn settings(&self) -> Result<Settings> {
        {
            let cached = self.cached.read().unwrap();
            if let Some(settings) = cached.as_ref() {
                return Ok(settings.clone());
            }
        }
        let settings = self.load()?;
        *self.cached.write().unwrap() = Some(settings.clone());
        Ok(settings)
    }

    fn settings_file_path(&self) -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| SweepXError::config("unable to determine configuration directory"))?;
        Ok(base.join("sweepx").join("config.toml"))
    }
}

/// Fixed-settings service for tests and embedding.
pub struct StaticSettingsService {
    settings: Settings,
}

impl StaticSettingsService {
    /// Wrap a fixed settings value.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl SettingsService for StaticSettingsService {
    fn settings(&self) -> Result<Settings> {
        Ok(self.settings.clone())
    }

    fn settings_file_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("<static>"))
    }
}
