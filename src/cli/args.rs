use std::path::PathBuf;

use clap::Parser;

use crate::git::GitProvider;

/// Installs foods pinned by semver from git-hosted rigs.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Root directory for cached rigs and installed foods [default: ./.shoal]
    #[clap(long)]
    pub root: Option<PathBuf>,
    /// Git implementation: `command` runs the git executable, `library` uses libgit2
    #[clap(long)]
    pub git_provider: Option<GitProvider>,
    /// Sync file listing the foods to ensure
    #[clap(short = 'f', long, default_value = crate::config_file::DEFAULT_SYNC_FILE)]
    pub file: PathBuf,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Ensures every food declared in the sync file
    Sync,
    /// Resolves a food and installs it
    Ensure {
        /// Rig url
        rig: String,
        /// Food name
        food: String,
        /// Semver constraint, the newest revision when omitted
        constraint: Option<String>,
    },
    /// Prints the revision and version a constraint resolves to
    Resolve {
        rig: String,
        food: String,
        constraint: Option<String>,
    },
    /// Lists well formed revisions of a food, newest first
    Versions { rig: String, food: String },
    /// Materializes a local directory as a temporary rig and prints its url
    TempRig { source: PathBuf },
    /// Deletes cached workspaces
    ClearCache,
}
