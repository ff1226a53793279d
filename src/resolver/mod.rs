mod constraint;

use std::collections::HashSet;

use log::debug;
use semver::Version;
use thiserror::Error;

use crate::model::VersionedFood;

pub use constraint::{parse_version, Constraint};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("parsing semver constraint from {constraint:?}: {source}")]
    InvalidConstraint {
        constraint: String,
        source: semver::Error,
    },
    #[error("parsing {version:?} declared at revision {revision} as semver: {source}")]
    InvalidVersion {
        version: String,
        revision: String,
        source: semver::Error,
    },
    #[error("no versions found for food {food} in rig {rig}")]
    NoVersions { food: String, rig: String },
    #[error(
        "finding food: no food matching the semver constraint \"{constraint}\" found out of {candidates} food versions"
    )]
    Unsatisfiable {
        constraint: String,
        candidates: usize,
    },
}

/// Picks one entry out of `versions`, which must be ordered newest first.
///
/// Without a constraint the newest revision wins, whatever version it declares.
/// With a constraint, revisions are grouped by declared version (the newest
/// revision represents its group) and the *lowest* version that satisfies the
/// constraint is returned.
pub fn select<'a>(
    rig: &str,
    food: &str,
    versions: &'a [VersionedFood],
    constraint: Option<&Constraint>,
) -> Result<&'a VersionedFood, ResolveError> {
    let Some(newest) = versions.first() else {
        return Err(ResolveError::NoVersions {
            food: food.to_owned(),
            rig: rig.to_owned(),
        });
    };

    let Some(constraint) = constraint else {
        return Ok(newest);
    };

    let mut seen = HashSet::new();
    let mut groups: Vec<(Version, &VersionedFood)> = Vec::new();
    for candidate in versions {
        if !seen.insert(candidate.version()) {
            continue;
        }
        let version =
            parse_version(candidate.version()).map_err(|source| ResolveError::InvalidVersion {
                version: candidate.version().to_owned(),
                revision: candidate.revision.clone(),
                source,
            })?;
        groups.push((version, candidate));
    }

    // Stable, so equal versions keep history order.
    groups.sort_by(|(a, _), (b, _)| a.cmp(b));

    for (version, candidate) in groups {
        if constraint.matches(&version) {
            debug!(
                "{} {} at {} satisfies {}",
                food, version, candidate.revision, constraint
            );
            return Ok(candidate);
        }
        debug!("{} {} does not satisfy {}", food, version, constraint);
    }

    Err(ResolveError::Unsatisfiable {
        constraint: constraint.to_string(),
        candidates: versions.len(),
    })
}
