mod command;
mod library;

use std::{fmt::Display, path::Path, process::ExitStatus, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::CommandGit;
pub use library::LibraryGit;

/// Branch that freshly initialized repositories point their HEAD at.
pub const DEFAULT_BRANCH: &str = "master";

pub const ORIGIN: &str = "origin";

#[derive(Error, Debug)]
pub enum GitError {
    #[error("running {command}: {status}\n\nCOMBINED OUTPUT:\n{output}")]
    Command {
        command: String,
        status: ExitStatus,
        output: String,
    },
    #[error("could not start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Git error: {0}")]
    Library(#[from] git2::Error),
    #[error("remote {remote} of {path} does not advertise a HEAD branch")]
    MissingHeadBranch { remote: String, path: String },
    #[error("{path} at {revision} is not a file")]
    NotAFile { revision: String, path: String },
    #[error("{path} at {revision} is not valid UTF-8")]
    Utf8 { revision: String, path: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Version-control operations the engine needs.
///
/// Both implementations must produce identical observable results: the same
/// revision ids, the same `log` lines and the same file contents. None of the
/// operations retry.
pub trait GitClient: Send + Sync {
    /// Clones `url` into `dir`, which must not exist or be empty.
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError>;

    /// Fetches the single branch `branch` from `origin`.
    fn fetch(&self, dir: &Path, branch: &str) -> Result<(), GitError>;

    /// The default branch advertised by `origin`.
    fn show_origin_head_branch(&self, dir: &Path) -> Result<String, GitError>;

    /// Resets the local branch `branch` to `origin/<branch>`, checks it out and
    /// discards every local modification.
    fn force_checkout(&self, dir: &Path, branch: &str) -> Result<(), GitError>;

    /// Commits reachable from HEAD that touch `path` and still contain it, one
    /// `<revision> <summary>` line each, newest first.
    fn log(&self, dir: &Path, path: &str) -> Result<String, GitError>;

    /// Content of `path` as of `revision`.
    fn show(&self, dir: &Path, revision: &str, path: &str) -> Result<String, GitError>;

    fn init_bare(&self, dir: &Path) -> Result<(), GitError>;

    fn init(&self, dir: &Path) -> Result<(), GitError>;

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), GitError>;

    fn add(&self, dir: &Path, path: &str) -> Result<(), GitError>;

    fn config(&self, dir: &Path, key: &str, value: &str) -> Result<(), GitError>;

    fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError>;

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<(), GitError>;
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum GitProvider {
    /// Drives the `git` executable found on `PATH`.
    #[default]
    #[serde(rename = "command")]
    Command,
    /// Links libgit2.
    #[serde(rename = "library")]
    Library,
}

impl GitProvider {
    pub fn client(self) -> Box<dyn GitClient> {
        match self {
            GitProvider::Command => Box::new(CommandGit::new()),
            GitProvider::Library => Box::new(LibraryGit::new()),
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid git provider `{0}`, expected `command` or `library`")]
pub struct InvalidProvider(String);

impl FromStr for GitProvider {
    type Err = InvalidProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.to_ascii_lowercase();
        match value.as_str() {
            "command" => Ok(GitProvider::Command),
            "library" => Ok(GitProvider::Library),
            _ => Err(InvalidProvider(value)),
        }
    }
}

impl Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GitProvider::Command => f.write_str("command"),
            GitProvider::Library => f.write_str("library"),
        }
    }
}
