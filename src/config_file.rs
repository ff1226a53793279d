use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::GitProvider;

pub const DEFAULT_SYNC_FILE: &str = "shoal.yaml";

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("Sync file {path} does not exist")]
    NotFound { path: PathBuf },
    #[error("Error while loading the sync file {path}: {source}")]
    Load { path: PathBuf, source: ConfigError },
    #[error("Foods {foods:?} are declared without a rig")]
    MissingRig { foods: Vec<String> },
}

/// Content of a sync file such as `shoal.yaml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub git: GitSection,
    /// Rig that `foods` are resolved against.
    #[serde(default)]
    pub rig: Option<String>,
    /// Food name to constraint. An empty constraint skips the food.
    #[serde(default)]
    pub foods: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct GitSection {
    pub provider: Option<GitProvider>,
}

/// One food to ensure. An empty `version` selects the newest revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub rig: String,
    pub food: String,
    #[serde(default)]
    pub version: String,
}

impl Dependency {
    pub fn new(
        rig: impl Into<String>,
        food: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Dependency {
            rig: rig.into(),
            food: food.into(),
            version: version.into(),
        }
    }

    pub fn constraint(&self) -> Option<&str> {
        let version = self.version.trim();
        (!version.is_empty()).then_some(version)
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.constraint() {
            Some(constraint) => write!(f, "{} {} from {}", self.food, constraint, self.rig),
            None => write!(f, "{} from {}", self.food, self.rig),
        }
    }
}

impl SyncConfig {
    /// Loads a sync file, the format is picked by extension (`yaml`, `yml` or `toml`).
    pub fn from_file(path: &Path) -> Result<SyncConfig, ConfigFileError> {
        if !path.exists() {
            return Err(ConfigFileError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Config::builder()
            .add_source(File::from(path))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|source| ConfigFileError::Load {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Every food to ensure: `foods` in name order against `rig`, then
    /// `dependencies` in declaration order.
    pub fn dependencies(&self) -> Result<Vec<Dependency>, ConfigFileError> {
        let foods = self
            .foods
            .iter()
            .filter(|(_, constraint)| !constraint.trim().is_empty());

        let mut dependencies = Vec::with_capacity(self.foods.len() + self.dependencies.len());
        match &self.rig {
            Some(rig) => {
                for (food, constraint) in foods {
                    dependencies.push(Dependency::new(rig, food, constraint));
                }
            }
            None => {
                let foods = foods.map(|(food, _)| food.clone()).collect::<Vec<_>>();
                if !foods.is_empty() {
                    return Err(ConfigFileError::MissingRig { foods });
                }
            }
        }
        dependencies.extend(self.dependencies.iter().cloned());

        Ok(dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "shoal.yaml",
            r#"
git:
  provider: library
rig: https://github.com/fishworks/fish-food
foods:
  kubectl: "> 1.18"
  helm: ">= 3.3.0"
  eksctl: ""
dependencies:
- rig: https://example.com/other-rig
  food: helmfile
  version: ""
"#,
        );

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.git.provider, Some(GitProvider::Library));

        let rig = "https://github.com/fishworks/fish-food";
        assert_eq!(
            config.dependencies().unwrap(),
            vec![
                Dependency::new(rig, "helm", ">= 3.3.0"),
                Dependency::new(rig, "kubectl", "> 1.18"),
                Dependency::new("https://example.com/other-rig", "helmfile", ""),
            ]
        );
    }

    #[test]
    fn load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "shoal.toml",
            r#"
[[dependencies]]
rig = "https://example.com/rig"
food = "helm"
version = "3.3.0"
"#,
        );

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.git.provider, None);
        assert_eq!(
            config.dependencies().unwrap(),
            vec![Dependency::new("https://example.com/rig", "helm", "3.3.0")]
        );
    }

    #[test]
    fn helm_plugins_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "shoal.yaml",
            r#"
rig: https://github.com/fishworks/fish-food
foods:
  helm: ">= 3.3.0"
helm:
  plugins:
    diff: ">= 3.1.1"
"#,
        );

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(
            config.dependencies().unwrap(),
            vec![Dependency::new(
                "https://github.com/fishworks/fish-food",
                "helm",
                ">= 3.3.0"
            )]
        );
    }

    #[test]
    fn foods_without_rig() {
        let config = SyncConfig {
            foods: BTreeMap::from([("helm".to_owned(), ">= 3".to_owned())]),
            ..SyncConfig::default()
        };
        let error = config.dependencies().unwrap_err();
        assert!(matches!(error, ConfigFileError::MissingRig { foods } if foods == ["helm"]));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = SyncConfig::from_file(&dir.path().join("shoal.yaml")).unwrap_err();
        assert!(matches!(error, ConfigFileError::NotFound { .. }));
    }

    #[test]
    fn dependency_constraint() {
        assert_eq!(Dependency::new("r", "helm", " ").constraint(), None);
        assert_eq!(
            Dependency::new("r", "helm", ">= 1").constraint(),
            Some(">= 1")
        );
        assert_eq!(
            Dependency::new("r", "helm", ">= 1").to_string(),
            "helm >= 1 from r"
        );
    }
}
