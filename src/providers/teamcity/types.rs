use std::fmt;

use serde::{Deserialize, Serialize};

/// Branch label used for builds the server reports without a branch name.
///
/// The server omits `branchName` when a configuration tracks a single branch.
pub const DEFAULT_BRANCH: &str = "<default>";

const VCS_REF_PREFIXES: [&str; 3] = ["/refs/heads/", "refs/heads/", "refs/tags/"];

/// Identifier of a build configuration (a "build type" on the server).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildTypeId(String);

impl BuildTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BuildTypeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for BuildTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A build configuration as listed by `/app/rest/buildTypes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildType {
    pub id: BuildTypeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BuildTypes {
    #[serde(default, rename = "buildType")]
    pub build_types: Vec<BuildType>,
}

/// A VCS branch tracked by a build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Branches {
    #[serde(default)]
    pub branch: Vec<Branch>,
}

/// Summary of a single build execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: u64,
    pub build_type_id: BuildTypeId,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub web_url: String,
}

/// One page of a build listing. `next_href` is the relative link to the
/// following page, absent on the last one.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Builds {
    #[serde(default)]
    pub next_href: Option<String>,
    #[serde(default)]
    pub build: Vec<Build>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Name/value list returned by the statistics and resulting-properties
/// endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub property: Vec<Property>,
}

impl Properties {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.property
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.property.is_empty()
    }
}

pub type BuildStatistics = Properties;

/// Strips a leading VCS ref prefix such as `refs/heads/` from a branch name.
pub fn strip_vcs_prefix(name: &str) -> &str {
    VCS_REF_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}
