use std::path::Path;

use log::info;

use crate::{config_file::SyncConfig, Shoal};

/// Handler to sync command
pub fn do_sync(shoal: &Shoal, config: &SyncConfig) -> anyhow::Result<()> {
    let installed = shoal.sync(config)?;
    info!("Ensured {} foods.", installed.len());
    Ok(())
}

/// Handler to ensure command
pub fn do_ensure(
    shoal: &Shoal,
    rig: &str,
    food: &str,
    constraint: Option<&str>,
) -> anyhow::Result<()> {
    shoal.ensure(rig, food, constraint)?;
    Ok(())
}

/// Handler to resolve command
/// Prints `<revision> <version>` of the selected revision
pub fn do_resolve(
    shoal: &Shoal,
    rig: &str,
    food: &str,
    constraint: Option<&str>,
) -> anyhow::Result<()> {
    let selected = shoal.resolve(rig, food, constraint)?;
    println!("{} {}", selected.revision, selected.version());
    Ok(())
}

/// Handler to versions command
pub fn do_versions(shoal: &Shoal, rig: &str, food: &str) -> anyhow::Result<()> {
    for versioned in shoal.versions(rig, food)? {
        println!(
            "{} {}\t{}",
            versioned.revision,
            versioned.version(),
            versioned.summary
        );
    }
    Ok(())
}

/// Handler to temp-rig command
/// The repository is kept so that the printed url stays usable
pub fn do_temp_rig(shoal: &Shoal, source: &Path) -> anyhow::Result<()> {
    let rig = shoal.temp_rig(source)?;
    println!("{}", rig.keep().display());
    Ok(())
}

/// Handler to clear-cache command
pub fn do_clear_cache(shoal: &Shoal) -> anyhow::Result<()> {
    shoal.clear_cache()?;
    Ok(())
}
