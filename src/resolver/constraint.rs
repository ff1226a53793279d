use std::{fmt::Display, str::FromStr, sync::OnceLock};

use regex_lite::Regex;
use semver::{Version, VersionReq};

use super::ResolveError;

/// A semver range predicate as written in a sync file or on the command line.
///
/// Comparators may be separated by commas or whitespace, an operator may be
/// followed by a space (`>= 1.2.0`), and `||` separates alternatives. A bare
/// version (`1.2.0`) means exactly that version. Partial versions are padded
/// with zeros except after `~` and `^`, so `> 1.18` admits `1.18.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    pub fn parse(raw: &str) -> Result<Constraint, ResolveError> {
        let alternatives = raw
            .split("||")
            .map(|alternative| {
                VersionReq::parse(&normalize(alternative)).map_err(|source| {
                    ResolveError::InvalidConstraint {
                        constraint: raw.to_owned(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Constraint {
            raw: raw.to_owned(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Constraint {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parses a declared food version, accepting a leading `v` and missing minor
/// or patch components (`v1.18` is read as `1.18.0`).
pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let error = match Version::parse(trimmed) {
        Ok(version) => return Ok(version),
        Err(error) => error,
    };
    Version::parse(&pad(trimmed)).map_err(|_| error)
}

/// Fills missing minor and patch components with `0`, keeping any pre-release
/// or build suffix (`1.2-rc.1` becomes `1.2.0-rc.1`).
fn pad(version: &str) -> String {
    let split = version
        .find(|c: char| c == '-' || c == '+')
        .unwrap_or(version.len());
    let (core, suffix) = version.split_at(split);
    let components = core.split('.').count();
    if components >= 3 {
        return version.to_owned();
    }
    format!("{core}{}{suffix}", ".0".repeat(3 - components))
}

fn normalize(alternative: &str) -> String {
    static OPERATOR_SPACE: OnceLock<Regex> = OnceLock::new();
    let re = OPERATOR_SPACE
        .get_or_init(|| Regex::new(r"(?P<op>>=|<=|>|<|=|~|\^)\s+").unwrap());

    re.replace_all(alternative.trim(), "${op}")
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|comparator| !comparator.is_empty())
        .map(normalize_comparator)
        .collect::<Vec<_>>()
        .join(", ")
}

fn normalize_comparator(comparator: &str) -> String {
    let split = comparator
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
        .unwrap_or(comparator.len());
    let (op, version) = comparator.split_at(split);
    let version = match version.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => version,
    };

    if is_wildcard(version) {
        return format!("{op}{version}");
    }
    // Tilde and caret keep their partial meaning: `~1` spans every 1.x.
    match op {
        "~" | "^" => format!("{op}{version}"),
        "" => format!("={}", pad(version)),
        _ => format!("{op}{}", pad(version)),
    }
}

fn is_wildcard(version: &str) -> bool {
    version
        .split('.')
        .any(|part| matches!(part, "*" | "x" | "X"))
}
