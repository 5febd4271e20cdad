//! Resolution and execution policies.
//!
//! Every policy has a kebab-case spelling shared by the config file and the
//! command line.

use crate::spec::PackageSpec;
use crate::tree::DepClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A policy value that is not one of the accepted spellings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct PolicyParseError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

macro_rules! policy_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every accepted spelling.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = PolicyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    _ => Err(PolicyParseError {
                        kind: stringify!($name),
                        value: s.to_string(),
                        expected: Self::VALUES.join(", "),
                    }),
                }
            }
        }
    };
}

policy_enum! {
    /// Where a resolvent's package ends up.
    DestinationKind {
        /// The live filesystem
        Filesystem => "filesystem",
        /// A binary package repository
        BinaryRepository => "binary-repository",
        /// Nothing is installed; the resolvent only exists to remove things
        RemoveOnly => "remove-only",
    }
}

policy_enum! {
    /// When installed packages are rebuilt even though they satisfy every constraint.
    ReinstallPolicy {
        Never => "never",
        Always => "always",
        IfOptionsChanged => "if-options-changed",
    }
}

policy_enum! {
    UpgradePolicy {
        /// Move dependencies to the best version
        Always => "always",
        /// Only upgrade when a constraint needs it
        AsNeeded => "as-needed",
    }
}

policy_enum! {
    DowngradePolicy {
        AsNeeded => "as-needed",
        /// Downgrade, but log a warning
        Warning => "warning",
        /// Never select a version lower than the installed one
        Error => "error",
    }
}

policy_enum! {
    /// Whether unslotted specs may pick a slot that is not yet installed.
    NewSlotsPolicy {
        Always => "always",
        AsNeeded => "as-needed",
    }
}

policy_enum! {
    /// How one class of dependencies is treated.
    DepsPolicy {
        Discard => "discard",
        Pre => "pre",
        PreOrPost => "pre-or-post",
        Post => "post",
        TryPost => "try-post",
    }
}

policy_enum! {
    SuggestedPolicy {
        Show => "show",
        Discard => "discard",
        Install => "install",
    }
}

policy_enum! {
    /// What to do when a pre-dependency closes a cycle.
    CircularPolicy {
        Error => "error",
        Discard => "discard",
    }
}

policy_enum! {
    BlockerPolicy {
        Error => "error",
        Discard => "discard",
        PretendSatisfied => "pretend-satisfied",
    }
}

policy_enum! {
    /// Which local recovery pass runs first when no candidate fits as-is.
    RetryOrder {
        ChoicesFirst => "choices-first",
        MasksFirst => "masks-first",
    }
}

policy_enum! {
    /// Which mask kinds may be overridden.
    MaskKind {
        Keyword => "keyword",
        Repository => "repository",
        Unavailable => "unavailable",
    }
}

policy_enum! {
    /// What the executor does once a job has failed.
    ContinueOnFailure {
        Never => "never",
        IfFetchOnly => "if-fetch-only",
        IfSatisfied => "if-satisfied",
        IfIndependent => "if-independent",
        Always => "always",
    }
}

impl Default for ContinueOnFailure {
    fn default() -> Self {
        ContinueOnFailure::Never
    }
}

impl Default for DestinationKind {
    fn default() -> Self {
        DestinationKind::Filesystem
    }
}

/// Every knob the decision engine and dependency expander consult.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    pub reinstall: ReinstallPolicy,
    /// Rebuild explicitly named package targets even when installed
    pub reinstall_targets: bool,
    pub upgrade: UpgradePolicy,
    pub downgrade: DowngradePolicy,
    pub new_slots: NewSlotsPolicy,
    pub installed_deps_pre: DepsPolicy,
    pub installed_deps_runtime: DepsPolicy,
    pub installed_deps_post: DepsPolicy,
    pub uninstalled_deps_pre: DepsPolicy,
    pub uninstalled_deps_runtime: DepsPolicy,
    pub uninstalled_deps_post: DepsPolicy,
    pub suggested: SuggestedPolicy,
    pub circular: CircularPolicy,
    pub blocks: BlockerPolicy,
    pub allow_choice_changes: bool,
    pub override_masks: Vec<MaskKind>,
    pub retry_order: RetryOrder,
    /// Blocked installed packages may be removed
    pub permit_uninstall: bool,
    /// Removing a package also removes its installed dependents
    pub remove_dependents: bool,
    /// Removing a package also removes dependencies nothing else uses
    pub remove_unused: bool,
    /// Matching packages must stay exactly as installed
    pub keep: Vec<PackageSpec>,
    pub destination: DestinationKind,
    /// Install to the filesystem by way of a binary package
    pub make_binaries: bool,
    pub max_restarts: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            reinstall: ReinstallPolicy::Never,
            reinstall_targets: true,
            upgrade: UpgradePolicy::AsNeeded,
            downgrade: DowngradePolicy::AsNeeded,
            new_slots: NewSlotsPolicy::AsNeeded,
            installed_deps_pre: DepsPolicy::Discard,
            installed_deps_runtime: DepsPolicy::TryPost,
            installed_deps_post: DepsPolicy::TryPost,
            uninstalled_deps_pre: DepsPolicy::Pre,
            uninstalled_deps_runtime: DepsPolicy::PreOrPost,
            uninstalled_deps_post: DepsPolicy::Post,
            suggested: SuggestedPolicy::Show,
            circular: CircularPolicy::Error,
            blocks: BlockerPolicy::Error,
            allow_choice_changes: true,
            override_masks: Vec::new(),
            retry_order: RetryOrder::ChoicesFirst,
            permit_uninstall: false,
            remove_dependents: false,
            remove_unused: false,
            keep: Vec::new(),
            destination: DestinationKind::Filesystem,
            make_binaries: false,
            max_restarts: 20,
        }
    }
}

impl ResolverOptions {
    /// The policy for one dependency class of a candidate.
    ///
    /// Suggestions are governed by [`SuggestedPolicy`] instead and map to `TryPost`
    /// unless discarded.
    pub fn deps_policy(&self, class: DepClass, from_installed: bool) -> DepsPolicy {
        match (class, from_installed) {
            (DepClass::Build, true) => self.installed_deps_pre,
            (DepClass::Run, true) => self.installed_deps_runtime,
            (DepClass::Post, true) => self.installed_deps_post,
            (DepClass::Build, false) => self.uninstalled_deps_pre,
            (DepClass::Run, false) => self.uninstalled_deps_runtime,
            (DepClass::Post, false) => self.uninstalled_deps_post,
            (DepClass::Suggested, _) => match self.suggested {
                SuggestedPolicy::Discard => DepsPolicy::Discard,
                SuggestedPolicy::Show | SuggestedPolicy::Install => DepsPolicy::TryPost,
            },
        }
    }

    pub fn may_override(&self, kind: MaskKind) -> bool {
        kind != MaskKind::Unavailable && self.override_masks.contains(&kind)
    }
}
