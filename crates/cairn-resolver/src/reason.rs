//! Why a constraint exists.

use crate::expander::SanitisedDependency;
use crate::resolvent::Resolvent;
use cairn_types::{BlockSpec, PackageSpec};
use std::fmt;

/// Whether a requirement already holds for the installed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlreadyMet {
    Yes,
    No,
    /// Nothing relevant is installed, so the outcome depends on later decisions
    Indeterminate,
}

impl AlreadyMet {
    pub fn is_yes(self) -> bool {
        self == AlreadyMet::Yes
    }
}

impl fmt::Display for AlreadyMet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlreadyMet::Yes => write!(f, "already met"),
            AlreadyMet::No => write!(f, "not met"),
            AlreadyMet::Indeterminate => write!(f, "undecided"),
        }
    }
}

/// How a dependency edge is ordered relative to the package that has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingBucket {
    /// Must be in place before the dependent is installed
    Pre,
    /// May be installed after the dependent
    Post,
    /// Required, but its ordering edge was dropped to break a cycle
    Unordered,
}

impl fmt::Display for OrderingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingBucket::Pre => write!(f, "pre"),
            OrderingBucket::Post => write!(f, "post"),
            OrderingBucket::Unordered => write!(f, "unordered"),
        }
    }
}

/// The origin of a constraint. Owned by the constraint that cites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Named by the user
    Target { spec: PackageSpec },
    /// A dependency of another package
    Dependency {
        from_id: String,
        from_resolvent: Resolvent,
        dependency: SanitisedDependency,
        already_met: AlreadyMet,
        bucket: OrderingBucket,
    },
    /// A blocker held by another package
    Blocker {
        from_id: String,
        from_resolvent: Resolvent,
        block: BlockSpec,
        already_met: AlreadyMet,
    },
    /// This package depends on a package being removed
    Dependent { on_id: String, on_resolvent: Resolvent },
    /// This package was only used by a package being removed
    WasUsedBy { by_id: String, by_resolvent: Resolvent },
    /// Carried in from configuration or from an earlier pass
    Preset {
        note: String,
        original: Option<Box<Reason>>,
    },
    /// Member of a named set the user asked for
    SetMembership { set: String, member: PackageSpec },
    /// Mirrors what was decided for the same package at another destination
    LikeOtherDestination { other: Resolvent },
    /// Built as a binary package first, then installed from it
    ViaBinary { other: Resolvent },
}

impl Reason {
    /// The resolvent whose decision produced this reason, if any.
    pub fn from_resolvent(&self) -> Option<&Resolvent> {
        match self {
            Reason::Dependency { from_resolvent, .. } | Reason::Blocker { from_resolvent, .. } => {
                Some(from_resolvent)
            }
            Reason::Dependent { on_resolvent, .. } => Some(on_resolvent),
            Reason::WasUsedBy { by_resolvent, .. } => Some(by_resolvent),
            Reason::LikeOtherDestination { other } | Reason::ViaBinary { other } => Some(other),
            Reason::Preset { original, .. } => original.as_ref().and_then(|r| r.from_resolvent()),
            Reason::Target { .. } | Reason::SetMembership { .. } => None,
        }
    }

    /// Targets and set members are what the user asked for directly.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Reason::Target { .. } | Reason::SetMembership { .. })
    }

    /// Reasons that justify removing an installed package.
    pub fn permits_removal(&self) -> bool {
        match self {
            Reason::Target { .. } | Reason::Dependent { .. } | Reason::WasUsedBy { .. } => true,
            Reason::LikeOtherDestination { .. } => true,
            Reason::Preset { original, .. } => {
                original.as_ref().map_or(false, |r| r.permits_removal())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Target { spec } => write!(f, "target {}", spec),
            Reason::Dependency {
                from_id,
                dependency,
                already_met,
                bucket,
                ..
            } => write!(
                f,
                "{} dependency of {} ({}, {})",
                dependency.class, from_id, bucket, already_met
            ),
            Reason::Blocker { from_id, block, .. } => {
                write!(f, "blocker {} held by {}", block, from_id)
            }
            Reason::Dependent { on_id, .. } => write!(f, "depends on {}, which is being removed", on_id),
            Reason::WasUsedBy { by_id, .. } => write!(f, "was used by {}, which is being removed", by_id),
            Reason::Preset { note, original } => match original {
                Some(original) => write!(f, "{} ({})", note, original),
                None => write!(f, "{}", note),
            },
            Reason::SetMembership { set, member } => write!(f, "{} from set @{}", member, set),
            Reason::LikeOtherDestination { other } => write!(f, "same decision as {}", other),
            Reason::ViaBinary { other } => write!(f, "binary package for {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvent::SlotKey;
    use cairn_types::DestinationKind;

    #[test]
    fn test_permits_removal() {
        let r = Resolvent::new("a", SlotKey::named("0"), DestinationKind::RemoveOnly);
        assert!(Reason::Target {
            spec: PackageSpec::new("a")
        }
        .permits_removal());
        assert!(Reason::WasUsedBy {
            by_id: "a-1.0.0:0::local".into(),
            by_resolvent: r.clone()
        }
        .permits_removal());
        let preset = Reason::Preset {
            note: "restart".into(),
            original: Some(Box::new(Reason::Dependent {
                on_id: "a-1.0.0:0::local".into(),
                on_resolvent: r.clone(),
            })),
        };
        assert!(preset.permits_removal());
        assert_eq!(preset.from_resolvent(), Some(&r));
        assert!(!Reason::ViaBinary { other: r }.permits_removal());
    }
}
