use std::process;

use clap::Parser;
use shoal::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::{
            do_clear_cache, do_ensure, do_resolve, do_sync, do_temp_rig, do_versions,
        },
    },
    config::{Overrides, ShoalConfig},
    config_file::SyncConfig,
    Shoal,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    let sync_config = match cli_args.cmd {
        Command::Sync => Some(SyncConfig::from_file(&cli_args.file)?),
        _ => None,
    };
    let overrides = Overrides {
        root_dir: cli_args.root,
        git_provider: cli_args.git_provider,
    };
    let config = ShoalConfig::load(
        sync_config.as_ref().and_then(|sync| sync.git.provider),
        &overrides,
    )?;

    let mut builder = Shoal::builder().git_provider(config.git.provider);
    if let Some(root) = config.root.dir {
        builder = builder.root(root);
    }
    let shoal = builder.try_build()?;

    match cli_args.cmd {
        Command::Sync => match &sync_config {
            Some(sync_config) => do_sync(&shoal, sync_config),
            None => Ok(()),
        },
        Command::Ensure {
            rig,
            food,
            constraint,
        } => do_ensure(&shoal, &rig, &food, constraint.as_deref()),
        Command::Resolve {
            rig,
            food,
            constraint,
        } => do_resolve(&shoal, &rig, &food, constraint.as_deref()),
        Command::Versions { rig, food } => do_versions(&shoal, &rig, &food),
        Command::TempRig { source } => do_temp_rig(&shoal, &source),
        Command::ClearCache => do_clear_cache(&shoal),
    }
}
