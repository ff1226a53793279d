use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use log::{debug, info};
use serde::Serialize;

use crate::model::{Food, VersionedFood};

const RECEIPT_FILE: &str = "receipt.toml";

/// Receives every resolved food. Installers own all filesystem side effects of
/// an installation.
pub trait Installer: Send + Sync {
    fn install(&self, food: &VersionedFood) -> anyhow::Result<()>;
}

/// Records the resolved descriptor under `<barrel>/<name>/<version>/receipt.toml`.
///
/// Artifacts are not downloaded; the receipt carries everything needed to do so.
pub struct ReceiptInstaller {
    barrel: PathBuf,
}

#[derive(Serialize)]
struct Receipt<'a> {
    revision: &'a str,
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    food: &'a Food,
}

impl ReceiptInstaller {
    pub fn new(barrel: impl Into<PathBuf>) -> Self {
        ReceiptInstaller {
            barrel: barrel.into(),
        }
    }

    /// Where the receipt of `name` at `version` goes. Both must be plain file
    /// names, catalog content never addresses anything outside the barrel.
    pub fn receipt_path(&self, name: &str, version: &str) -> anyhow::Result<PathBuf> {
        for (field, value) in [("name", name), ("version", version)] {
            if !is_plain_component(value) {
                bail!("food {field} {value:?} is not usable as a directory name");
            }
        }
        Ok(self.barrel.join(name).join(version).join(RECEIPT_FILE))
    }
}

impl Installer for ReceiptInstaller {
    fn install(&self, food: &VersionedFood) -> anyhow::Result<()> {
        let path = self.receipt_path(&food.food.name, food.version())?;
        let receipt = Receipt {
            revision: &food.revision,
            summary: &food.summary,
            url: food
                .food
                .package_for_host()
                .map(|package| package.url.as_str()),
            food: &food.food,
        };
        if receipt.url.is_none() {
            debug!("{} has no package for this platform", food.food.name);
        }

        write_receipt(&path, &receipt)?;
        info!("Installed {} {}.", food.food.name, food.version());
        Ok(())
    }
}

fn is_plain_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(component)), None) if component == value
    ) && !value.contains(|c: char| c == '/' || c == '\\')
}

fn write_receipt(path: &Path, receipt: &Receipt) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(receipt).context("serializing receipt")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
