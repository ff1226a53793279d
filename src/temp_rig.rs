use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::TempDir;
use thiserror::Error;
use walkdir::WalkDir;

use crate::git::{GitClient, GitError, DEFAULT_BRANCH, ORIGIN};

const COMMITTER: [(&str, &str); 2] = [("user.email", "user@example.com"), ("user.name", "user")];

#[derive(Error, Debug)]
pub enum TempRigError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),
    #[error("Error while walking {source_dir}: {error}")]
    Walk {
        source_dir: String,
        error: walkdir::Error,
    },
    #[error("Path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// A bare repository in a temporary directory holding one commit with the
/// content of a local directory. The repository is removed on drop unless
/// [`TempRig::keep`] is called.
#[derive(Debug)]
pub struct TempRig {
    remote: TempDir,
}

impl TempRig {
    /// Url to pass as a rig, a plain filesystem path.
    pub fn url(&self) -> String {
        self.remote.path().display().to_string()
    }

    pub fn path(&self) -> &Path {
        self.remote.path()
    }

    /// Disables the cleanup and returns the location of the repository.
    pub fn keep(self) -> PathBuf {
        self.remote.keep()
    }
}

/// Pushes the files under `source` as a single `first commit` on the default
/// branch of a new bare repository. `.git` directories are not copied.
pub fn materialize(git: &dyn GitClient, source: &Path) -> Result<TempRig, TempRigError> {
    let source = std::path::absolute(source)?;

    let remote = tempfile::Builder::new().prefix("shoal-remote").tempdir()?;
    git.init_bare(remote.path())?;

    let local = tempfile::Builder::new().prefix("shoal-local").tempdir()?;
    git.init(local.path())?;
    let remote_url = remote.path().display().to_string();
    git.add_remote(local.path(), ORIGIN, &remote_url)?;

    let entries = WalkDir::new(&source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");
    for entry in entries {
        let entry = entry.map_err(|error| TempRigError::Walk {
            source_dir: source.display().to_string(),
            error,
        })?;
        let Ok(relative) = entry.path().strip_prefix(&source) else {
            continue;
        };
        let destination = local.path().join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
            continue;
        }

        std::fs::copy(entry.path(), &destination)?;
        let relative = git_path(relative)?;
        debug!("Adding {} to temporary rig", relative);
        git.add(local.path(), &relative)?;
    }

    for (key, value) in COMMITTER {
        git.config(local.path(), key, value)?;
    }
    git.commit(local.path(), "first commit")?;
    git.push(local.path(), ORIGIN, DEFAULT_BRANCH)?;

    info!(
        "Materialized {} as rig {}",
        source.display(),
        remote.path().display()
    );
    Ok(TempRig { remote })
}

/// Repository relative path with `/` separators.
fn git_path(relative: &Path) -> Result<String, TempRigError> {
    let components = relative
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .ok_or_else(|| TempRigError::NonUtf8Path {
                    path: relative.to_path_buf(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(components.join("/"))
}
