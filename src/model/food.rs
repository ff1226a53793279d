use serde::{Deserialize, Serialize};

/// Typed form of the `food` table a catalog script defines.
///
/// Only `name` and `version` matter for resolution; the remaining fields are
/// carried through untouched for the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Food {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveats: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
}

/// A platform specific artifact of a food.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    #[serde(default)]
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub installpath: String,
    #[serde(default)]
    pub executable: bool,
}

impl Food {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Food {
            name: name.into(),
            version: version.into(),
            description: None,
            license: None,
            homepage: None,
            caveats: None,
            packages: Vec::new(),
        }
    }

    /// The package built for `os`/`arch`, using catalog naming (`darwin`, `amd64`, ...).
    pub fn package_for(&self, os: &str, arch: &str) -> Option<&Package> {
        self.packages
            .iter()
            .find(|package| package.os == os && package.arch == arch)
    }

    /// The package built for the platform this binary runs on.
    pub fn package_for_host(&self) -> Option<&Package> {
        self.package_for(host_os(), host_arch())
    }
}

fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}
