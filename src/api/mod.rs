use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, Once},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    cache::{CacheError, WorkspaceCache},
    config_file::{ConfigFileError, Dependency, SyncConfig},
    git::{GitClient, GitError},
    history,
    install::Installer,
    interpreter::{self, Evaluation, InterpretError},
    model::VersionedFood,
    resolver::{self, Constraint, ResolveError},
    temp_rig::{self, TempRig, TempRigError},
};

mod builder;

pub use builder::{BuildError, ShoalBuilder};

const BIN_DIR: &str = "bin";

/// Resolves foods from rigs and hands them to an [`Installer`].
///
/// One instance owns one workspace cache: every rig is fetched at most once
/// during the lifetime of the instance.
pub struct Shoal {
    root: PathBuf,
    git: Arc<dyn GitClient>,
    cache: WorkspaceCache,
    installer: Box<dyn Installer>,
}

#[derive(Error, Debug)]
pub enum EnsureError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("interpreting food at revision {revision}: {source}")]
    Interpret {
        revision: String,
        source: InterpretError,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("installing {name} {version}: {source}")]
    Install {
        name: String,
        version: String,
        source: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),
    #[error("ensuring {dependency}: {source}")]
    Ensure {
        dependency: Dependency,
        source: EnsureError,
    },
    #[error("unexpected fault while ensuring {dependency}: {message}\n\nBACKTRACE:\n{backtrace}")]
    Fault {
        dependency: Dependency,
        message: String,
        backtrace: String,
    },
}

impl Shoal {
    pub fn builder() -> ShoalBuilder {
        ShoalBuilder::default()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that installed executables are linked into.
    pub fn bin_path(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    /// Every revision of `food` in `rig` that holds a well formed definition,
    /// newest first.
    pub fn versions(&self, rig: &str, food: &str) -> Result<Vec<VersionedFood>, EnsureError> {
        let workspace = self.cache.acquire(rig)?;
        let path = history::food_path(food);

        let mut versions = Vec::new();
        for record in history::scan(self.git.as_ref(), &workspace, food)? {
            let script = self.git.show(&workspace, &record.revision, &path)?;
            let chunk_name = format!("{}@{}", path, record.revision);
            let evaluation = interpreter::evaluate(&script, &chunk_name).map_err(|source| {
                EnsureError::Interpret {
                    revision: record.revision.clone(),
                    source,
                }
            })?;

            match evaluation {
                Evaluation::Food(descriptor) => {
                    debug!(
                        "{} {} defined at revision {}",
                        descriptor.name, descriptor.version, record.revision
                    );
                    versions.push(VersionedFood::new(record, descriptor));
                }
                Evaluation::Rotten { reason } => {
                    warn!(
                        "Ignored malformed descriptor for {} at revision {}: {}",
                        food, record.revision, reason
                    );
                }
            }
        }

        Ok(versions)
    }

    /// Picks the revision of `food` to install. An empty or missing constraint
    /// selects the newest revision by history order.
    pub fn resolve(
        &self,
        rig: &str,
        food: &str,
        constraint: Option<&str>,
    ) -> Result<VersionedFood, EnsureError> {
        let constraint = constraint
            .map(str::trim)
            .filter(|constraint| !constraint.is_empty())
            .map(Constraint::parse)
            .transpose()?;

        let versions = self.versions(rig, food)?;
        let selected = resolver::select(rig, food, &versions, constraint.as_ref())?;
        info!(
            "Resolved {} {} at revision {}",
            food,
            selected.version(),
            selected.revision
        );
        Ok(selected.clone())
    }

    /// Resolves `food` and installs it.
    pub fn ensure(
        &self,
        rig: &str,
        food: &str,
        constraint: Option<&str>,
    ) -> Result<VersionedFood, EnsureError> {
        let selected = self.resolve(rig, food, constraint)?;
        self.installer
            .install(&selected)
            .map_err(|source| EnsureError::Install {
                name: selected.food.name.clone(),
                version: selected.version().to_owned(),
                source,
            })?;
        Ok(selected)
    }

    /// Ensures every dependency of `config` in order, stopping at the first
    /// failure. A panic while ensuring a dependency is reported as
    /// [`SyncError::Fault`].
    pub fn sync(&self, config: &SyncConfig) -> Result<Vec<VersionedFood>, SyncError> {
        let dependencies = config.dependencies()?;
        record_panic_backtraces();

        let mut installed = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            info!("Ensuring {}", dependency);
            LAST_PANIC_BACKTRACE.with(|last| last.borrow_mut().take());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.ensure(&dependency.rig, &dependency.food, dependency.constraint())
            }));

            match outcome {
                Ok(Ok(food)) => installed.push(food),
                Ok(Err(source)) => return Err(SyncError::Ensure { dependency, source }),
                Err(payload) => {
                    let backtrace = LAST_PANIC_BACKTRACE
                        .with(|last| last.borrow_mut().take())
                        .unwrap_or_else(|| Backtrace::force_capture().to_string());
                    return Err(SyncError::Fault {
                        dependency,
                        message: panic_message(payload.as_ref()),
                        backtrace,
                    });
                }
            }
        }

        Ok(installed)
    }

    /// Materializes `source` as a temporary rig.
    pub fn temp_rig(&self, source: &Path) -> Result<TempRig, TempRigError> {
        temp_rig::materialize(self.git.as_ref(), source)
    }

    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear()
    }
}

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Chains a panic hook that keeps the backtrace of the latest panic on each thread.
fn record_panic_backtraces() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC_BACKTRACE.with(|last| {
                if let Ok(mut last) = last.try_borrow_mut() {
                    *last = Some(backtrace);
                }
            });
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn panic_messages() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let code = 7;
        let payload = panic::catch_unwind(|| panic!("exit {code}")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "exit 7");

        let payload = panic::catch_unwind(|| panic::panic_any(7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn errors_convert_to_anyhow() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<EnsureError>();
        assert_send_sync::<SyncError>();

        let error: anyhow::Error = EnsureError::Interpret {
            revision: "abc1234".to_owned(),
            source: InterpretError::Execution(mlua::Error::runtime("no network")),
        }
        .into();
        let message = format!("{error:#}");
        assert!(message.contains("abc1234"), "{message}");
        assert!(message.contains("no network"), "{message}");
    }
}
