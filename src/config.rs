//! Engine settings.
//!
//! Layers, lowest precedence first: built-in defaults, the sync file, `SHOAL_*`
//! environment variables and command line [`Overrides`].

use std::{collections::HashMap, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::git::GitProvider;

const ENV_PREFIX: &str = "SHOAL";

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub root_dir: Option<PathBuf>,
    pub git_provider: Option<GitProvider>,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ShoalConfig {
    #[serde(default)]
    pub root: RootSettings,
    pub git: GitSettings,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RootSettings {
    /// Unset means `.shoal` under the current directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct GitSettings {
    pub provider: GitProvider,
}

impl ShoalConfig {
    /// Layers the process environment between `file_provider`, the provider named
    /// by a sync file, and `overrides`.
    pub fn load(
        file_provider: Option<GitProvider>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        Self::layered(file_provider, None, overrides)
    }

    fn layered(
        file_provider: Option<GitProvider>,
        env: Option<HashMap<String, String>>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let root_dir = overrides
            .root_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned());
        let git_provider = overrides.git_provider.map(|provider| provider.to_string());

        Config::builder()
            .set_default("git.provider", file_provider.unwrap_or_default().to_string())?
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("_").source(env))
            .set_override_option("root.dir", root_dir)?
            .set_override_option("git.provider", git_provider)?
            .build()?
            .try_deserialize()
    }
}
