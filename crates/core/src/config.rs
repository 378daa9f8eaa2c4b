//! Config file discovery and loading.
//!
//! A config file is a JSON object deserialising into [`ExtractConfig`]; any
//! subset of fields may be given.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{DashError, Result};
use crate::extract::ExtractConfig;

/// File name looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Resolves and reads the extraction config.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Explicit config file; wins over the user config directory
    explicit: Option<PathBuf>,
    /// Directory searched for `config.json`
    user_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader searching `<config_dir>/dashmetrics`.
    pub fn new() -> Self {
        ConfigLoaderBuilder::new().user_dir_opt(Self::default_user_dir()).build()
    }

    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Path the loader would read, if any.
    ///
    /// An explicit path is returned even when it does not exist so that
    /// [`load`](Self::load) can report it.
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        self.user_dir.as_ref().map(|dir| dir.join(CONFIG_FILE_NAME)).filter(|path| path.exists())
    }

    /// Loads the resolved config file, else the built-in defaults.
    ///
    /// # Errors
    ///
    /// - [`DashError::FileNotFound`] when an explicit path does not exist
    /// - [`DashError::ConfigError`] when the file is not a valid config
    pub fn load(&self) -> Result<ExtractConfig> {
        match self.resolve() {
            Some(path) => Self::load_file(&path),
            None => {
                debug!("no config file, using defaults");
                Ok(ExtractConfig::default())
            }
        }
    }

    /// Parses one config file.
    pub fn load_file(path: &Path) -> Result<ExtractConfig> {
        if !path.exists() {
            return Err(DashError::FileNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .map_err(|e| DashError::ConfigError(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// `<config_dir>/dashmetrics`, e.g. `~/.config/dashmetrics` on Linux
    fn default_user_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dashmetrics"))
    }
}

/// Builder for [`ConfigLoader`]
#[derive(Debug, Clone, Default)]
pub struct ConfigLoaderBuilder {
    explicit: Option<PathBuf>,
    user_dir: Option<PathBuf>,
}

impl ConfigLoaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit config file
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    /// Set the directory searched for `config.json`
    pub fn user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    fn user_dir_opt(mut self, dir: Option<PathBuf>) -> Self {
        self.user_dir = dir;
        self
    }

    pub fn build(self) -> ConfigLoader {
        ConfigLoader { explicit: self.explicit, user_dir: self.user_dir }
    }
}

/// Loads the config from `path` if given, else from the user config
/// directory, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ExtractConfig> {
    let loader = match path {
        Some(path) => ConfigLoader::builder().path(path).build(),
        None => ConfigLoader::new(),
    };
    loader.load()
}
