use serde::{Deserialize, Serialize};

use crate::providers::teamcity::types::{BuildTypeId, DEFAULT_BRANCH};

/// Wire name paired with a getter that renders the field, or `None` when the
/// field is empty and must be left out of the locator.
pub type LocatorField<T> = (&'static str, fn(&T) -> Option<String>);

/// Server query filter rendered as comma-joined `name:value` pairs.
///
/// Each implementor declares its wire names explicitly in `FIELDS`; the order
/// of the table is the order of the encoded pairs.
pub trait Locator: Sized + 'static {
    const FIELDS: &'static [LocatorField<Self>];

    fn encode(&self) -> String {
        Self::FIELDS
            .iter()
            .filter_map(|(name, render)| render(self).map(|value| format!("{name}:{}", escape(&value))))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Values containing locator delimiters are wrapped in parentheses.
fn escape(value: &str) -> String {
    if value.contains([',', ':', '(', ')']) {
        format!("({value})")
    } else {
        value.to_owned()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildStatus {
    Success,
    Failure,
    Error,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Error => "ERROR",
        }
    }
}

/// Three-valued locator flag used by `running` and `canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LocatorFlag {
    True,
    False,
    Any,
}

impl LocatorFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Any => "any",
        }
    }
}

/// Query filter for the build listing endpoint.
///
/// `count == 0` means "no cap": every page is fetched by following the
/// server's next-page link. Any positive `count` stops after the first page.
/// A zero count is therefore indistinguishable from an unset one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLocator {
    pub build_type: BuildTypeId,
    pub branch: Option<String>,
    pub status: Option<BuildStatus>,
    pub running: Option<LocatorFlag>,
    pub canceled: Option<LocatorFlag>,
    pub count: u32,
}

impl BuildLocator {
    /// Filter for the single most recent build of a configuration.
    pub fn latest(build_type: BuildTypeId) -> Self {
        Self {
            build_type,
            count: 1,
            ..Self::default()
        }
    }

    /// Copies the status/running/canceled/count settings onto a concrete
    /// (configuration, branch) target.
    pub fn for_target(&self, build_type: BuildTypeId, branch: Option<String>) -> Self {
        Self {
            build_type,
            branch,
            ..self.clone()
        }
    }

    pub fn is_uncapped(&self) -> bool {
        self.count == 0
    }
}

impl Locator for BuildLocator {
    const FIELDS: &'static [LocatorField<Self>] = &[
        ("buildType", |l| non_empty(l.build_type.as_str())),
        ("branch", |l| {
            l.branch
                .as_deref()
                .filter(|branch| *branch != DEFAULT_BRANCH)
                .and_then(non_empty)
        }),
        ("status", |l| l.status.map(|s| s.as_str().to_owned())),
        ("running", |l| l.running.map(|f| f.as_str().to_owned())),
        ("canceled", |l| l.canceled.map(|f| f.as_str().to_owned())),
        ("count", |l| (l.count > 0).then(|| l.count.to_string())),
    ];
}

impl std::fmt::Display for BuildLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Query filter for the build configuration listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTypeLocator {
    pub paused: Option<bool>,
    pub project: Option<String>,
}

impl BuildTypeLocator {
    pub fn active_only() -> Self {
        Self {
            paused: Some(false),
            ..Self::default()
        }
    }
}

impl Locator for BuildTypeLocator {
    const FIELDS: &'static [LocatorField<Self>] = &[
        ("paused", |l| l.paused.map(|p| p.to_string())),
        ("project", |l| l.project.as_deref().and_then(non_empty)),
    ];
}
