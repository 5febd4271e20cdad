//! Core types for the Cairn package manager.
//!
//! This crate defines the data every other Cairn crate speaks: package specs,
//! pre-parsed dependency trees, candidate records as returned by repositories,
//! and the policies that steer resolution and execution.

pub mod options;
pub mod spec;
pub mod tree;

pub use options::{
    BlockerPolicy, CircularPolicy, ContinueOnFailure, DepsPolicy, DestinationKind,
    DowngradePolicy, MaskKind, NewSlotsPolicy, PolicyParseError, ReinstallPolicy,
    ResolverOptions, RetryOrder, SuggestedPolicy, UpgradePolicy,
};
pub use semver::{Version, VersionReq};
pub use spec::{BlockSpec, ChoiceRequirement, PackageSpec, SpecError};
pub use tree::{DepClass, DepTree, DependencyTrees};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named toggle on a candidate, such as an optional feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    /// Choice name
    pub name: String,
    /// Current state
    pub enabled: bool,
    /// Forced or masked by the repository; never toggled by the resolver
    #[serde(default)]
    pub locked: bool,
}

/// Why a candidate may not be selected without an override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum MaskReason {
    /// A keyword that is not accepted
    Keyword(String),
    /// Explicitly masked by the repository, with its comment
    Repository(String),
    /// The repository the candidate comes from is unavailable
    Unavailable(String),
}

impl MaskReason {
    pub fn kind(&self) -> MaskKind {
        match self {
            MaskReason::Keyword(_) => MaskKind::Keyword,
            MaskReason::Repository(_) => MaskKind::Repository,
            MaskReason::Unavailable(_) => MaskKind::Unavailable,
        }
    }
}

impl fmt::Display for MaskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskReason::Keyword(kw) => write!(f, "keyword '{}' is not accepted", kw),
            MaskReason::Repository(comment) => write!(f, "masked by repository: {}", comment),
            MaskReason::Unavailable(repo) => write!(f, "repository '{}' is unavailable", repo),
        }
    }
}

/// An artifact that has to be fetched before a candidate can be built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Distfile {
    /// File name in the distfile directory
    pub name: String,
    /// Expected BLAKE3 digest, hex encoded
    #[serde(default)]
    pub blake3: Option<String>,
}

fn default_slot() -> String {
    "0".to_string()
}

fn default_repository() -> String {
    "local".to_string()
}

/// One concrete version of a package in one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Package name
    pub name: String,
    /// Package version
    pub version: Version,
    /// Parallel-installable variant
    #[serde(default = "default_slot")]
    pub slot: String,
    /// Origin repository
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Build, run and post dependency trees
    #[serde(default)]
    pub dependencies: DependencyTrees,
    /// Choice declarations with their current state
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Reasons this candidate is masked
    #[serde(default)]
    pub masks: Vec<MaskReason>,
    /// Installed, as opposed to installable
    #[serde(default)]
    pub installed: bool,
    /// Artifacts to fetch before building
    #[serde(default)]
    pub distfiles: Vec<Distfile>,
}

impl CandidateRecord {
    /// Create an installable candidate in slot `0` of repository `local`.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            slot: default_slot(),
            repository: default_repository(),
            dependencies: DependencyTrees::default(),
            choices: Vec::new(),
            masks: Vec::new(),
            installed: false,
            distfiles: Vec::new(),
        }
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    pub fn in_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn with_build(mut self, tree: DepTree) -> Self {
        self.dependencies.build = tree;
        self
    }

    pub fn with_run(mut self, tree: DepTree) -> Self {
        self.dependencies.run = tree;
        self
    }

    pub fn with_post(mut self, tree: DepTree) -> Self {
        self.dependencies.post = tree;
        self
    }

    pub fn with_choice(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.choices.push(Choice {
            name: name.into(),
            enabled,
            locked: false,
        });
        self
    }

    pub fn with_locked_choice(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.choices.push(Choice {
            name: name.into(),
            enabled,
            locked: true,
        });
        self
    }

    pub fn with_mask(mut self, mask: MaskReason) -> Self {
        self.masks.push(mask);
        self
    }

    pub fn with_distfile(mut self, name: impl Into<String>, blake3: Option<String>) -> Self {
        self.distfiles.push(Distfile {
            name: name.into(),
            blake3,
        });
        self
    }

    /// Mark the record as describing an installed package.
    pub fn installed(mut self) -> Self {
        self.installed = true;
        self
    }

    /// Stable identity used in reports and job listings.
    pub fn id(&self) -> String {
        format!(
            "{}-{}:{}::{}",
            self.name, self.version, self.slot, self.repository
        )
    }

    /// The state of a choice, or `None` if the candidate does not declare it.
    pub fn choice_enabled(&self, name: &str) -> Option<bool> {
        self.choices.iter().find(|c| c.name == name).map(|c| c.enabled)
    }

    /// Enabled/disabled state of every declared choice, in declaration order.
    pub fn choice_snapshot(&self) -> Vec<(String, bool)> {
        self.choices
            .iter()
            .map(|c| (c.name.clone(), c.enabled))
            .collect()
    }

    /// Same package, version and slot as `other`.
    pub fn same_version(&self, other: &CandidateRecord) -> bool {
        self.name == other.name && self.version == other.version && self.slot == other.slot
    }

    /// Same version and same choice state as `other`.
    pub fn same_build(&self, other: &CandidateRecord) -> bool {
        self.same_version(other) && self.choice_snapshot() == other.choice_snapshot()
    }

    pub fn needs_fetch(&self) -> bool {
        !self.installed && !self.distfiles.is_empty()
    }
}

impl fmt::Display for CandidateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_builders() {
        let candidate = CandidateRecord::new("vim", Version::new(9, 0, 1))
            .with_slot("0")
            .in_repository("core")
            .with_choice("python", false)
            .with_distfile("vim-9.0.1.tar.gz", None);
        assert_eq!(candidate.id(), "vim-9.0.1:0::core");
        assert_eq!(candidate.choice_enabled("python"), Some(false));
        assert_eq!(candidate.choice_enabled("lua"), None);
        assert!(candidate.needs_fetch());
        assert!(!candidate.clone().installed().needs_fetch());
    }

    #[test]
    fn test_same_build() {
        let a = CandidateRecord::new("vim", Version::new(9, 0, 1)).with_choice("python", false);
        let b = a.clone().installed();
        let c = CandidateRecord::new("vim", Version::new(9, 0, 1)).with_choice("python", true);
        assert!(a.same_build(&b));
        assert!(a.same_version(&c));
        assert!(!a.same_build(&c));
    }

    #[test]
    fn test_mask_kind() {
        assert_eq!(MaskReason::Keyword("~amd64".into()).kind(), MaskKind::Keyword);
        assert!(MaskReason::Unavailable("overlay".into())
            .to_string()
            .contains("unavailable"));
    }
}
