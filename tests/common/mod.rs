#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use shoal::{
    git::{GitClient, GitError, GitProvider, DEFAULT_BRANCH, ORIGIN},
    install::Installer,
    model::VersionedFood,
    Shoal,
};
use tempfile::TempDir;

pub const PROVIDERS: [GitProvider; 2] = [GitProvider::Command, GitProvider::Library];

pub fn food_script(name: &str, version: &str) -> String {
    format!(
        r#"
local name = "{name}"
local version = "{version}"

food = {{
    name = name,
    description = "test food",
    license = "Apache-2.0",
    version = version,
    packages = {{
        {{
            os = "linux",
            arch = "amd64",
            url = "https://example.com/" .. name .. "-" .. version .. ".tar.gz",
            sha256 = "0000",
            resources = {{
                {{
                    path = name,
                    installpath = "bin/" .. name,
                    executable = true
                }}
            }}
        }}
    }}
}}
"#
    )
}

/// A bare remote plus a working copy used to push commits to it.
pub struct Catalog {
    git: Box<dyn GitClient>,
    remote: TempDir,
    local: TempDir,
}

impl Catalog {
    pub fn new(provider: GitProvider) -> Catalog {
        let git = provider.client();
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();

        git.init_bare(remote.path()).unwrap();
        git.init(local.path()).unwrap();
        git.add_remote(local.path(), ORIGIN, &remote.path().display().to_string())
            .unwrap();
        git.config(local.path(), "user.email", "catalog@example.com")
            .unwrap();
        git.config(local.path(), "user.name", "catalog").unwrap();

        Catalog { git, remote, local }
    }

    pub fn url(&self) -> String {
        self.remote.path().display().to_string()
    }

    /// Commits `script` as the definition of `food` and pushes it.
    pub fn commit_food(&self, food: &str, script: &str, message: &str) {
        let relative = format!("Food/{food}.lua");
        let path = self.local.path().join(&relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, script).unwrap();

        self.git.add(self.local.path(), &relative).unwrap();
        self.git.commit(self.local.path(), message).unwrap();
        self.git
            .push(self.local.path(), ORIGIN, DEFAULT_BRANCH)
            .unwrap();
    }

    /// Deletes the definition of `food` and pushes the deletion.
    pub fn remove_food(&self, food: &str, message: &str) {
        let relative = format!("Food/{food}.lua");
        std::fs::remove_file(self.local.path().join(&relative)).unwrap();

        self.git.add(self.local.path(), &relative).unwrap();
        self.git.commit(self.local.path(), message).unwrap();
        self.git
            .push(self.local.path(), ORIGIN, DEFAULT_BRANCH)
            .unwrap();
    }

    pub fn commit_version(&self, food: &str, version: &str) {
        self.commit_food(food, &food_script(food, version), &format!("{food} {version}"));
    }
}

/// Forwards to a real client and counts network operations.
pub struct CountingGit {
    inner: Box<dyn GitClient>,
    clones: Mutex<Vec<String>>,
    fetches: AtomicUsize,
}

impl CountingGit {
    pub fn new(provider: GitProvider) -> Arc<CountingGit> {
        Arc::new(CountingGit {
            inner: provider.client(),
            clones: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn clones(&self) -> usize {
        self.clones.lock().unwrap().len()
    }

    pub fn cloned_urls(&self) -> Vec<String> {
        let mut urls = self.clones.lock().unwrap().clone();
        urls.sort();
        urls
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl GitClient for CountingGit {
    fn clone_repo(&self, url: &str, dir: &Path) -> Result<(), GitError> {
        self.clones.lock().unwrap().push(url.to_owned());
        self.inner.clone_repo(url, dir)
    }

    fn fetch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(dir, branch)
    }

    fn show_origin_head_branch(&self, dir: &Path) -> Result<String, GitError> {
        self.inner.show_origin_head_branch(dir)
    }

    fn force_checkout(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.inner.force_checkout(dir, branch)
    }

    fn log(&self, dir: &Path, path: &str) -> Result<String, GitError> {
        self.inner.log(dir, path)
    }

    fn show(&self, dir: &Path, revision: &str, path: &str) -> Result<String, GitError> {
        self.inner.show(dir, revision, path)
    }

    fn init_bare(&self, dir: &Path) -> Result<(), GitError> {
        self.inner.init_bare(dir)
    }

    fn init(&self, dir: &Path) -> Result<(), GitError> {
        self.inner.init(dir)
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), GitError> {
        self.inner.add_remote(dir, name, url)
    }

    fn add(&self, dir: &Path, path: &str) -> Result<(), GitError> {
        self.inner.add(dir, path)
    }

    fn config(&self, dir: &Path, key: &str, value: &str) -> Result<(), GitError> {
        self.inner.config(dir, key, value)
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<(), GitError> {
        self.inner.commit(dir, message)
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.inner.push(dir, remote, branch)
    }
}

#[derive(Clone, Default)]
pub struct RecordingInstaller {
    installed: Arc<Mutex<Vec<VersionedFood>>>,
}

impl RecordingInstaller {
    pub fn installed(&self) -> Vec<(String, String)> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .map(|food| (food.food.name.clone(), food.version().to_owned()))
            .collect()
    }
}

impl Installer for RecordingInstaller {
    fn install(&self, food: &VersionedFood) -> anyhow::Result<()> {
        self.installed.lock().unwrap().push(food.clone());
        Ok(())
    }
}

pub struct PanickingInstaller;

impl Installer for PanickingInstaller {
    fn install(&self, food: &VersionedFood) -> anyhow::Result<()> {
        panic!("boom while installing {}", food.food.name);
    }
}

pub struct Engine {
    pub shoal: Shoal,
    pub git: Arc<CountingGit>,
    pub installer: RecordingInstaller,
}

pub fn engine(provider: GitProvider, root: &Path) -> Engine {
    let git = CountingGit::new(provider);
    let installer = RecordingInstaller::default();
    let shoal = Shoal::builder()
        .root(root)
        .git_client(git.clone())
        .installer(installer.clone())
        .try_build()
        .unwrap();
    Engine {
        shoal,
        git,
        installer,
    }
}
