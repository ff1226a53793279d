use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, trace, warn};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::git::{GitClient, GitError};

const WORKSPACES_DIR: &str = "workspaces";

/// File inside every cached workspace holding the exact rig url it was cloned from.
pub const MARKER_FILE: &str = "RIG";

const STRIPPED_PREFIXES: [&str; 3] = ["https://", "http://", "git@"];

/// Local working copies of rigs, one per rig url.
///
/// Layout: `<root>/workspaces/<sanitized url>-<sha1 of url>/<n>/`. A workspace is
/// fetched at most once per `WorkspaceCache` instance. Fetching happens under a
/// single lock, so concurrent callers that need a fetch are serialized.
pub struct WorkspaceCache {
    location: PathBuf,
    git: Arc<dyn GitClient>,
    fetched: Mutex<HashSet<PathBuf>>,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error(
        "Cached workspace {path} has no readable RIG file ({source}). \
         The cache is corrupted, please remove {path} and try again."
    )]
    Corrupted {
        path: String,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl WorkspaceCache {
    pub fn new(root: &Path, git: Arc<dyn GitClient>) -> Result<WorkspaceCache, CacheError> {
        let location = root.join(WORKSPACES_DIR);
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        Ok(WorkspaceCache {
            location,
            git,
            fetched: Mutex::new(HashSet::new()),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns an up to date working copy of `rig`, cloning it on first use.
    pub fn acquire(&self, rig: &str) -> Result<PathBuf, CacheError> {
        let bucket = self.location.join(workspace_key(rig));
        if !bucket.exists() {
            std::fs::create_dir_all(&bucket)?;
        }

        match find_workspace(&bucket, rig)? {
            Lookup::Found(workspace) => {
                self.refresh(&workspace, rig)?;
                Ok(workspace)
            }
            Lookup::Missing { existing } => self.create(&bucket, existing, rig),
        }
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!("Clearing workspace cache {}.", self.location.display());
            std::fs::remove_dir_all(&self.location)?;
        }
        Ok(())
    }

    fn refresh(&self, workspace: &Path, rig: &str) -> Result<(), CacheError> {
        let mut fetched = self.fetched.lock().unwrap_or_else(PoisonError::into_inner);
        if fetched.contains(workspace) {
            debug!("Workspace {} was already fetched", workspace.display());
            return Ok(());
        }

        info!("Updating {} in {}", rig, workspace.display());
        let branch = self.git.show_origin_head_branch(workspace)?;
        trace!("Default branch of {} is {}", rig, branch);
        self.git.fetch(workspace, &branch)?;
        self.git.force_checkout(workspace, &branch)?;
        // The checkout may have clobbered the marker.
        write_marker(workspace, rig)?;

        fetched.insert(workspace.to_path_buf());
        Ok(())
    }

    fn create(&self, bucket: &Path, existing: usize, rig: &str) -> Result<PathBuf, CacheError> {
        let mut number = existing;
        while bucket.join(number.to_string()).exists() {
            number += 1;
        }
        let workspace = bucket.join(number.to_string());

        info!("Cloning {} into {}", rig, workspace.display());
        if let Err(error) = self.git.clone_repo(rig, &workspace) {
            if workspace.exists() {
                warn!("Removing partial clone at {}", workspace.display());
                std::fs::remove_dir_all(&workspace)?;
            }
            return Err(error.into());
        }
        write_marker(&workspace, rig)?;

        Ok(workspace)
    }
}

/// Name of the directory holding every workspace of `rig`.
pub fn workspace_key(rig: &str) -> String {
    let hash = Sha1::digest(rig.as_bytes());

    let mut key = rig;
    for prefix in STRIPPED_PREFIXES {
        key = key.strip_prefix(prefix).unwrap_or(key);
    }

    format!("{}-{:x}", key.replace(|c: char| c == '/' || c == '\\', "-"), hash)
}

enum Lookup {
    Found(PathBuf),
    Missing { existing: usize },
}

fn find_workspace(bucket: &Path, rig: &str) -> Result<Lookup, CacheError> {
    let mut workspaces = Vec::new();
    for entry in std::fs::read_dir(bucket)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            workspaces.push(entry.path());
        }
    }
    workspaces.sort_by_key(|path| {
        let number = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<usize>().ok());
        (number.unwrap_or(usize::MAX), path.clone())
    });

    for workspace in &workspaces {
        let marker = workspace.join(MARKER_FILE);
        let content =
            std::fs::read_to_string(&marker).map_err(|source| CacheError::Corrupted {
                path: workspace.display().to_string(),
                source,
            })?;
        if content == rig {
            debug!("Reusing workspace {} for {}", workspace.display(), rig);
            return Ok(Lookup::Found(workspace.clone()));
        }
        trace!(
            "Workspace {} belongs to {}, not {}",
            workspace.display(),
            content,
            rig
        );
    }

    Ok(Lookup::Missing {
        existing: workspaces.len(),
    })
}

fn write_marker(workspace: &Path, rig: &str) -> Result<(), CacheError> {
    std::fs::write(workspace.join(MARKER_FILE), rig)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Pretends to clone by creating the directory; counts every call.
    #[derive(Default)]
    struct FakeGit {
        clones: AtomicUsize,
        fetches: AtomicUsize,
        checkouts: AtomicUsize,
    }

    impl GitClient for FakeGit {
        fn clone_repo(&self, _url: &str, dir: &Path) -> Result<(), GitError> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dir)?;
            Ok(())
        }

        fn fetch(&self, _dir: &Path, branch: &str) -> Result<(), GitError> {
            assert_eq!(branch, "main");
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn show_origin_head_branch(&self, _dir: &Path) -> Result<String, GitError> {
            Ok("main".to_owned())
        }

        fn force_checkout(&self, dir: &Path, _branch: &str) -> Result<(), GitError> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            // A checkout may drop untracked files such as the marker.
            let _ = std::fs::remove_file(dir.join(MARKER_FILE));
            Ok(())
        }

        fn log(&self, _dir: &Path, _path: &str) -> Result<String, GitError> {
            unreachable!()
        }

        fn show(&self, _dir: &Path, _revision: &str, _path: &str) -> Result<String, GitError> {
            unreachable!()
        }

        fn init_bare(&self, _dir: &Path) -> Result<(), GitError> {
            unreachable!()
        }

        fn init(&self, _dir: &Path) -> Result<(), GitError> {
            unreachable!()
        }

        fn add_remote(&self, _dir: &Path, _name: &str, _url: &str) -> Result<(), GitError> {
            unreachable!()
        }

        fn add(&self, _dir: &Path, _path: &str) -> Result<(), GitError> {
            unreachable!()
        }

        fn config(&self, _dir: &Path, _key: &str, _value: &str) -> Result<(), GitError> {
            unreachable!()
        }

        fn commit(&self, _dir: &Path, _message: &str) -> Result<(), GitError> {
            unreachable!()
        }

        fn push(&self, _dir: &Path, _remote: &str, _branch: &str) -> Result<(), GitError> {
            unreachable!()
        }
    }

    fn new_cache(root: &TempDir) -> (Arc<FakeGit>, WorkspaceCache) {
        let git = Arc::new(FakeGit::default());
        let cache = WorkspaceCache::new(root.path(), git.clone()).unwrap();
        (git, cache)
    }

    #[test]
    fn workspace_key_strips_scheme_and_separators() {
        let key = workspace_key("https://github.com/fishworks/fish-food");
        assert!(
            key.starts_with("github.com-fishworks-fish-food-"),
            "unexpected key {key}"
        );
        assert_eq!(key.len(), "github.com-fishworks-fish-food-".len() + 40);

        let key = workspace_key("git@github.com:fishworks/fish-food.git");
        assert!(key.starts_with("github.com:fishworks-fish-food.git-"));
    }

    #[test]
    fn workspace_key_distinguishes_similar_urls() {
        let https = workspace_key("https://example.com/rig");
        let http = workspace_key("http://example.com/rig");
        assert!(https.starts_with("example.com-rig-"));
        assert!(http.starts_with("example.com-rig-"));
        assert_ne!(https, http);
    }

    #[test]
    fn clones_once_then_fetches_once() {
        let root = TempDir::new().unwrap();
        let (git, cache) = new_cache(&root);
        let rig = "https://example.com/rig";

        let first = cache.acquire(rig).unwrap();
        assert_eq!(git.clones.load(Ordering::SeqCst), 1);
        assert_eq!(git.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(
            first,
            cache.location().join(workspace_key(rig)).join("0")
        );
        assert_eq!(std::fs::read_to_string(first.join(MARKER_FILE)).unwrap(), rig);

        let second = cache.acquire(rig).unwrap();
        let third = cache.acquire(rig).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(git.clones.load(Ordering::SeqCst), 1);
        assert_eq!(git.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(git.checkouts.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(first.join(MARKER_FILE)).unwrap(), rig);
    }

    #[test]
    fn fetched_state_is_per_instance() {
        let root = TempDir::new().unwrap();
        let rig = "https://example.com/rig";
        {
            let (_, cache) = new_cache(&root);
            cache.acquire(rig).unwrap();
        }

        let (git, cache) = new_cache(&root);
        cache.acquire(rig).unwrap();
        cache.acquire(rig).unwrap();
        assert_eq!(git.clones.load(Ordering::SeqCst), 0);
        assert_eq!(git.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_urls_get_distinct_workspaces() {
        let root = TempDir::new().unwrap();
        let (git, cache) = new_cache(&root);

        let https = cache.acquire("https://example.com/rig").unwrap();
        let http = cache.acquire("http://example.com/rig").unwrap();
        assert_ne!(https, http);
        assert_eq!(git.clones.load(Ordering::SeqCst), 2);
        assert_eq!(
            std::fs::read_to_string(https.join(MARKER_FILE)).unwrap(),
            "https://example.com/rig"
        );
        assert_eq!(
            std::fs::read_to_string(http.join(MARKER_FILE)).unwrap(),
            "http://example.com/rig"
        );
    }

    #[test]
    fn foreign_workspace_in_bucket_is_skipped() {
        let root = TempDir::new().unwrap();
        let (git, cache) = new_cache(&root);
        let rig = "https://example.com/rig";

        let foreign = cache.location().join(workspace_key(rig)).join("0");
        std::fs::create_dir_all(&foreign).unwrap();
        std::fs::write(foreign.join(MARKER_FILE), "https://example.com/other").unwrap();

        let workspace = cache.acquire(rig).unwrap();
        assert_eq!(workspace, foreign.with_file_name("1"));
        assert_eq!(git.clones.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_marker_is_corruption() {
        let root = TempDir::new().unwrap();
        let (git, cache) = new_cache(&root);
        let rig = "https://example.com/rig";

        let broken = cache.location().join(workspace_key(rig)).join("0");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("README"), "leftover").unwrap();

        let error = cache.acquire(rig).unwrap_err();
        assert!(matches!(&error, CacheError::Corrupted { .. }));
        assert!(
            error.to_string().contains(&broken.display().to_string()),
            "{error}"
        );

        assert_eq!(git.clones.load(Ordering::SeqCst), 0);
        assert!(!broken.join(MARKER_FILE).exists());
        assert_eq!(
            std::fs::read_to_string(broken.join("README")).unwrap(),
            "leftover"
        );
    }
}
