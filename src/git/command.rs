use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Output},
};

use log::trace;

use super::{GitClient, GitError, DEFAULT_BRANCH, ORIGIN};

const HEAD_BRANCH_PREFIX: &str = "  HEAD branch: ";

/// [`GitClient`] that spawns the `git` executable.
#[derive(Debug, Default, Clone)]
pub struct CommandGit {
    _private: (),
}

impl CommandGit {
    pub fn new() -> Self {
        Self::default()
    }

    fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let rendered = std::iter::once("git".into())
            .chain(args.iter().map(|arg| arg.as_ref().to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ");

        let mut command = Command::new("git");
        command.args(&args).env("LC_ALL", "C");
        if let Some(dir) = dir {
            trace!("Running {} in {}", rendered, dir.display());
            command.current_dir(dir);
        } else {
            trace!("Running {}", rendered);
        }

        let output = command.output().map_err(|source| GitError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(GitError::Command {
                command: rendered,
                status: output.status,
                output: combined,
            });
        }

        Ok(output)
    }

    fn point_head_at_default_branch(&self, dir: &Path) -> Result<(), GitError> {
        self.run(
            Some(dir),
            [
                "symbolic-ref",
                "HEAD",
                format!("refs/heads/{DEFAULT_BRANCH}").as_str(),
            ],
        )?;
        Ok(())
    }
}

impl GitClient for CommandGit {
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError> {
        self.run(
            None,
            [OsStr::new("clone"), OsStr::new(url), dir.as_os_str()],
        )?;
        Ok(())
    }

    fn fetch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["fetch", ORIGIN, branch])?;
        Ok(())
    }

    fn show_origin_head_branch(&self, dir: &Path) -> Result<String, GitError> {
        let output = self.run(Some(dir), ["remote", "show", ORIGIN])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_head_branch(&stdout).ok_or_else(|| GitError::MissingHeadBranch {
            remote: ORIGIN.to_owned(),
            path: dir.display().to_string(),
        })
    }

    fn force_checkout(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.run(
            Some(dir),
            [
                "checkout",
                "--force",
                "-B",
                branch,
                format!("{ORIGIN}/{branch}").as_str(),
            ],
        )?;
        Ok(())
    }

    fn log(&self, dir: &Path, path: &str) -> Result<String, GitError> {
        let output = self.run(
            Some(dir),
            [
                "log",
                "--no-color",
                "--diff-filter=ACMRT",
                "--format=%H %s",
                "--",
                path,
            ],
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn show(&self, dir: &Path, revision: &str, path: &str) -> Result<String, GitError> {
        let output = self.run(Some(dir), ["show", format!("{revision}:{path}").as_str()])?;
        String::from_utf8(output.stdout).map_err(|_| GitError::Utf8 {
            revision: revision.to_owned(),
            path: path.to_owned(),
        })
    }

    fn init_bare(&self, dir: &Path) -> Result<(), GitError> {
        self.run(
            None,
            [OsStr::new("init"), OsStr::new("--bare"), dir.as_os_str()],
        )?;
        self.point_head_at_default_branch(dir)
    }

    fn init(&self, dir: &Path) -> Result<(), GitError> {
        self.run(None, [OsStr::new("init"), dir.as_os_str()])?;
        self.point_head_at_default_branch(dir)
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["remote", "add", name, url])?;
        Ok(())
    }

    fn add(&self, dir: &Path, path: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["add", "--", path])?;
        Ok(())
    }

    fn config(&self, dir: &Path, key: &str, value: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["config", key, value])?;
        Ok(())
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["commit", "-m", message])?;
        Ok(())
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(Some(dir), ["push", remote, branch])?;
        Ok(())
    }
}

fn parse_head_branch(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(HEAD_BRANCH_PREFIX))
        .map(|branch| branch.trim().to_owned())
        .filter(|branch| !branch.is_empty() && branch != "(unknown)")
}
