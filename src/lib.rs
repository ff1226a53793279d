pub mod cache;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod git;
pub mod history;
pub mod install;
pub mod interpreter;
pub mod model;
pub mod resolver;
pub mod temp_rig;

mod api;

pub use api::{BuildError, EnsureError, Shoal, ShoalBuilder, SyncError};
