use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    path::Path,
};

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    cert::Cert,
    AutotagOption, CertificateCheckStatus, Commit, Config, ConfigLevel, Cred, CredentialType,
    Direction, ErrorCode, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, ResetType,
};
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

use super::{GitClient, GitError, DEFAULT_BRANCH, ORIGIN};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// [`GitClient`] backed by libgit2.
#[derive(Debug, Default, Clone)]
pub struct LibraryGit {
    _private: (),
}

impl LibraryGit {
    pub fn new() -> Self {
        Self::default()
    }

    fn remote_callbacks(&self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            // Asking for ssh username
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            // SSH auth
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            // HTTP auth
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                let git_config = Config::open_default()?;
                return Cred::credential_helper(&git_config, url, username);
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });
        callbacks.certificate_check(check_certificate);
        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(self.remote_callbacks())
            .download_tags(AutotagOption::None);
        fetch_options
    }
}

impl GitClient for LibraryGit {
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError> {
        trace!("Cloning {} into {}", url, dir.display());
        RepoBuilder::new()
            .fetch_options(self.fetch_options())
            .clone(url, dir)?;
        Ok(())
    }

    fn fetch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let mut remote = repo.find_remote(ORIGIN)?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{ORIGIN}/{branch}");
        trace!("Fetching {} in {}", refspec, dir.display());
        remote.fetch(&[refspec.as_str()], Some(&mut self.fetch_options()), None)?;
        Ok(())
    }

    fn show_origin_head_branch(&self, dir: &Path) -> Result<String, GitError> {
        let repo = Repository::open(dir)?;
        let mut remote = repo.find_remote(ORIGIN)?;
        let connection =
            remote.connect_auth(Direction::Fetch, Some(self.remote_callbacks()), None)?;
        let missing = || GitError::MissingHeadBranch {
            remote: ORIGIN.to_owned(),
            path: dir.display().to_string(),
        };
        let head = connection.default_branch().map_err(|_| missing())?;
        head.as_str()
            .map(|name| name.strip_prefix("refs/heads/").unwrap_or(name).to_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(missing)
    }

    fn force_checkout(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let target = repo
            .revparse_single(&format!("refs/remotes/{ORIGIN}/{branch}"))?
            .peel_to_commit()?;

        let reference = format!("refs/heads/{branch}");
        repo.reference(
            &reference,
            target.id(),
            true,
            &format!("checkout: force {branch} to {}", target.id()),
        )?;
        repo.set_head(&reference)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(target.as_object(), ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    /// Commits that add or modify `path`, newest first by committer time.
    ///
    /// Follows the default history simplification of `git log -- <path>`: a merge
    /// whose entry equals one of its parents' is only followed through the first
    /// such parent. Merges themselves and deletions are never listed.
    fn log(&self, dir: &Path, path: &str) -> Result<String, GitError> {
        let repo = Repository::open(dir)?;
        let file = Path::new(path);
        let head = repo.head()?.peel_to_commit()?;

        let mut queue = CommitQueue::default();
        queue.push(&head);

        let mut output = String::new();
        while let Some(oid) = queue.pop() {
            let commit = repo.find_commit(oid)?;
            let entry = entry_at(&commit, file)?;
            let parents = commit.parents().collect::<Vec<_>>();

            let mut same = None;
            for parent in &parents {
                if entry_at(parent, file)? == entry {
                    same = Some(parent);
                    break;
                }
            }
            if let Some(parent) = same {
                queue.push(parent);
                continue;
            }

            if parents.len() < 2 && entry.is_some() {
                output.push_str(&format!(
                    "{} {}\n",
                    commit.id(),
                    commit.summary().unwrap_or_default()
                ));
            }
            for parent in &parents {
                queue.push(parent);
            }
        }
        Ok(output)
    }

    fn show(&self, dir: &Path, revision: &str, path: &str) -> Result<String, GitError> {
        let repo = Repository::open(dir)?;
        let object = repo.revparse_single(&format!("{revision}:{path}"))?;
        let not_a_file = || GitError::NotAFile {
            revision: revision.to_owned(),
            path: path.to_owned(),
        };
        match object.kind() {
            Some(git2::ObjectType::Blob) => {
                let blob = object.peel_to_blob()?;
                String::from_utf8(blob.content().to_vec()).map_err(|_| GitError::Utf8 {
                    revision: revision.to_owned(),
                    path: path.to_owned(),
                })
            }
            _ => Err(not_a_file()),
        }
    }

    fn init_bare(&self, dir: &Path) -> Result<(), GitError> {
        let mut options = RepositoryInitOptions::new();
        options.bare(true).initial_head(DEFAULT_BRANCH);
        Repository::init_opts(dir, &options)?;
        Ok(())
    }

    fn init(&self, dir: &Path) -> Result<(), GitError> {
        let mut options = RepositoryInitOptions::new();
        options.initial_head(DEFAULT_BRANCH);
        Repository::init_opts(dir, &options)?;
        Ok(())
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        repo.remote(name, url)?;
        Ok(())
    }

    fn add(&self, dir: &Path, path: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let mut index = repo.index()?;
        // Like `git add`, a path missing from the working tree is staged as removed.
        if dir.join(path).exists() {
            index.add_path(Path::new(path))?;
        } else {
            index.remove_path(Path::new(path))?;
        }
        index.write()?;
        Ok(())
    }

    fn config(&self, dir: &Path, key: &str, value: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let mut config = repo.config()?.open_level(ConfigLevel::Local)?;
        config.set_str(key, value)?;
        Ok(())
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let signature = repo.signature()?;
        let tree = repo.find_tree(repo.index()?.write_tree()?)?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let parents: Vec<&Commit> = parent.iter().collect();

        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        Ok(())
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        let repo = Repository::open(dir)?;
        let mut remote = repo.find_remote(remote)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");

        let mut options = PushOptions::new();
        options.remote_callbacks(self.remote_callbacks());
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        Ok(())
    }
}

fn entry_at(commit: &Commit<'_>, path: &Path) -> Result<Option<Oid>, git2::Error> {
    match commit.tree()?.get_path(path) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pending commits of a history walk, popped by committer time and then in
/// insertion order. Each commit is queued at most once.
#[derive(Default)]
struct CommitQueue {
    pending: BinaryHeap<(i64, Reverse<u64>, Oid)>,
    seen: HashSet<Oid>,
    inserted: u64,
}

impl CommitQueue {
    fn push(&mut self, commit: &Commit<'_>) {
        if self.seen.insert(commit.id()) {
            self.inserted += 1;
            self.pending.push((
                commit.time().seconds(),
                Reverse(self.inserted),
                commit.id(),
            ));
        }
    }

    fn pop(&mut self) -> Option<Oid> {
        self.pending.pop().map(|(_, _, oid)| oid)
    }
}

/// Accepts an ssh host key listed for `host` in the system known_hosts file and
/// leaves every other decision to libgit2.
fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    let Some(hostkey) = certificate.as_hostkey().and_then(|key| key.hostkey()) else {
        return Ok(CertificateCheckStatus::CertificatePassthrough);
    };
    let known_hosts = match KnownHosts::read_file(GLOBAL_KNOWN_HOSTS) {
        Ok(entries) => entries,
        Err(error) => {
            trace!("Skipping {}: {}", GLOBAL_KNOWN_HOSTS, error);
            return Ok(CertificateCheckStatus::CertificatePassthrough);
        }
    };

    let known = known_hosts
        .iter()
        .filter(|entry| host_allowed(host, entry.host_patterns()))
        .any(|entry| entry.public_key().to_bytes().as_deref() == Ok(hostkey));
    if known {
        trace!("{} presented a known host key", host);
        Ok(CertificateCheckStatus::CertificateOk)
    } else {
        trace!("{} presented a host key missing from {}", host, GLOBAL_KNOWN_HOSTS);
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

/// A host is allowed when a plain pattern matches it and no `!` pattern does.
/// Hashed entries are never matched.
fn host_allowed(host: &str, patterns: &HostPatterns) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        return false;
    };
    let host = host.to_lowercase();
    let (negated, plain): (Vec<_>, Vec<_>) = patterns
        .iter()
        .map(|pattern| pattern.to_lowercase())
        .partition(|pattern| pattern.starts_with('!'));

    let excluded = negated
        .iter()
        .any(|pattern| glob_matches(&pattern[1..], &host));
    !excluded && plain.iter().any(|pattern| glob_matches(pattern, &host))
}

/// Matches the `*` and `?` wildcards of known_hosts patterns.
fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0, 0);
    let mut backtrack = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    backtrack = Some((star, matched + 1));
                    p = star + 1;
                    t = matched + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
