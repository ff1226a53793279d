use std::{env, path::PathBuf, sync::Arc};

use log::debug;
use thiserror::Error;

use crate::{
    cache::{CacheError, WorkspaceCache},
    git::{GitClient, GitProvider},
    install::{Installer, ReceiptInstaller},
    Shoal,
};

const DEFAULT_ROOT_DIR: &str = ".shoal";
const BARREL_DIR: &str = "barrel";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Could not determine the root directory: {0}")]
    Root(#[source] std::io::Error),
    #[error("Could not create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Default)]
pub struct ShoalBuilder {
    root: Option<PathBuf>,
    git_provider: Option<GitProvider>,
    git_client: Option<Arc<dyn GitClient>>,
    installer: Option<Box<dyn Installer>>,
}

impl ShoalBuilder {
    /// Directory holding cached workspaces, the barrel and installed binaries.
    ///
    /// Defaults to `.shoal` in the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Which git implementation to use.
    ///
    /// Defaults to [`GitProvider::Command`]. Ignored when a client is set with
    /// [`ShoalBuilder::git_client`].
    pub fn git_provider(mut self, provider: GitProvider) -> Self {
        self.git_provider = Some(provider);
        self
    }

    pub fn git_client(mut self, client: Arc<dyn GitClient>) -> Self {
        self.git_client = Some(client);
        self
    }

    /// Receives resolved foods.
    ///
    /// Defaults to a [`ReceiptInstaller`] writing into `<root>/barrel`.
    pub fn installer(mut self, installer: impl Installer + 'static) -> Self {
        self.installer = Some(Box::new(installer));
        self
    }

    pub fn try_build(self) -> Result<Shoal, BuildError> {
        let Self {
            root,
            git_provider,
            git_client,
            installer,
        } = self;

        let root = match root {
            Some(root) => root,
            None => env::current_dir().map_err(BuildError::Root)?.join(DEFAULT_ROOT_DIR),
        };
        let root = std::path::absolute(&root).map_err(BuildError::Root)?;

        for dir in [BARREL_DIR, super::BIN_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path)
                .map_err(|source| BuildError::CreateDir { path, source })?;
        }

        let git = match git_client {
            Some(client) => client,
            None => {
                let provider = git_provider.unwrap_or_default();
                debug!("Using the {} git provider", provider);
                Arc::from(provider.client())
            }
        };

        let cache = WorkspaceCache::new(&root, git.clone())?;

        let installer =
            installer.unwrap_or_else(|| Box::new(ReceiptInstaller::new(root.join(BARREL_DIR))));

        Ok(Shoal {
            root,
            git,
            cache,
            installer,
        })
    }
}
