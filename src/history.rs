use std::{path::Path, sync::OnceLock};

use log::{debug, trace};
use regex_lite::Regex;

use crate::{
    git::{GitClient, GitError},
    model::RevisionRecord,
};

pub const FOOD_DIRECTORY: &str = "Food";
pub const FOOD_EXTENSION: &str = "lua";

/// Location of a food definition relative to the catalog root.
pub fn food_path(food: &str) -> String {
    format!("{FOOD_DIRECTORY}/{food}.{FOOD_EXTENSION}")
}

/// Every revision that defines `food` in the workspace, newest first.
pub fn scan(
    git: &dyn GitClient,
    workspace: &Path,
    food: &str,
) -> Result<Vec<RevisionRecord>, GitError> {
    let path = food_path(food);
    let output = git.log(workspace, &path)?;
    let records = parse_log(&output);
    debug!(
        "Found {} revisions of {} in {}",
        records.len(),
        path,
        workspace.display()
    );
    Ok(records)
}

/// Parses `<revision> <summary>` lines, skipping anything else.
pub fn parse_log(output: &str) -> Vec<RevisionRecord> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^(?P<revision>[0-9a-fA-F]{4,64}) (?P<summary>.*)$").unwrap()
    });

    output
        .lines()
        .filter_map(|line| {
            let captures = re.captures(line);
            if captures.is_none() {
                trace!("Skipping log line {:?}", line);
            }
            captures
        })
        .map(|captures| RevisionRecord::new(&captures["revision"], &captures["summary"]))
        .collect()
}
