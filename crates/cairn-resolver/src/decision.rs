//! Decisions made for resolutions.

use cairn_types::{CandidateRecord, DestinationKind, MaskReason};
use std::fmt;
use std::sync::Arc;

/// How an install relates to what is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Nothing of this package is installed
    New,
    Upgrade,
    Downgrade,
    /// Same version again, possibly with different choices
    Reinstall,
    /// The package is installed, but not in this slot
    NewSlot,
}

impl ChangeKind {
    /// Classify installing `candidate` over the given installed packages.
    pub fn classify(candidate: &CandidateRecord, installed: &[Arc<CandidateRecord>]) -> Self {
        let same_slot = installed
            .iter()
            .filter(|i| i.name == candidate.name && i.slot == candidate.slot)
            .max_by(|a, b| a.version.cmp(&b.version));
        match same_slot {
            Some(existing) if existing.version < candidate.version => ChangeKind::Upgrade,
            Some(existing) if existing.version > candidate.version => ChangeKind::Downgrade,
            Some(_) => ChangeKind::Reinstall,
            None if installed.iter().any(|i| i.name == candidate.name) => ChangeKind::NewSlot,
            None => ChangeKind::New,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::New => write!(f, "new"),
            ChangeKind::Upgrade => write!(f, "upgrade"),
            ChangeKind::Downgrade => write!(f, "downgrade"),
            ChangeKind::Reinstall => write!(f, "reinstall"),
            ChangeKind::NewSlot => write!(f, "new slot"),
        }
    }
}

/// A choice the resolver had to toggle to make a candidate fit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoiceChange {
    pub name: String,
    /// The new state
    pub enabled: bool,
}

impl fmt::Display for ChoiceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            write!(f, "+{}", self.name)
        } else {
            write!(f, "-{}", self.name)
        }
    }
}

/// A candidate that was considered and rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsuitableCandidate {
    pub candidate: Arc<CandidateRecord>,
    /// The constraints it fails, rendered with their reasons
    pub unmet: Vec<String>,
    pub masks: Vec<MaskReason>,
}

/// Everything known about why a resolution has no decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnresolvableDiagnostic {
    pub unsuitable: Vec<UnsuitableCandidate>,
    pub notes: Vec<String>,
}

impl UnresolvableDiagnostic {
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// What the world looks like for a resolvent once its decision is carried out.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Present {
        candidate: &'a CandidateRecord,
        kept: bool,
    },
    Absent {
        removed: bool,
    },
}

/// The single decision a resolution ends up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Install a candidate
    Install {
        candidate: Arc<CandidateRecord>,
        destination: DestinationKind,
        change: ChangeKind,
        /// Installed packages in the same slot that this replaces
        replacing: Vec<Arc<CandidateRecord>>,
        choice_changes: Vec<ChoiceChange>,
        /// Masks that had to be overridden
        mask_overrides: Vec<MaskReason>,
        /// No better version was passed over
        best: bool,
        taken: bool,
    },
    /// Leave things as they are; `existing` is `None` when nothing is installed
    KeepExisting {
        existing: Option<Arc<CandidateRecord>>,
        taken: bool,
    },
    RemoveExisting {
        existing: Vec<Arc<CandidateRecord>>,
        taken: bool,
    },
    Unresolvable {
        diagnostic: UnresolvableDiagnostic,
        taken: bool,
    },
}

impl Decision {
    /// Untaken decisions are shown but never turned into jobs.
    pub fn taken(&self) -> bool {
        match self {
            Decision::Install { taken, .. }
            | Decision::KeepExisting { taken, .. }
            | Decision::RemoveExisting { taken, .. }
            | Decision::Unresolvable { taken, .. } => *taken,
        }
    }

    pub fn set_taken(&mut self, value: bool) {
        match self {
            Decision::Install { taken, .. }
            | Decision::KeepExisting { taken, .. }
            | Decision::RemoveExisting { taken, .. }
            | Decision::Unresolvable { taken, .. } => *taken = value,
        }
    }

    /// `None` for unresolvable decisions.
    pub fn outcome(&self) -> Option<Outcome<'_>> {
        match self {
            Decision::Install { candidate, .. } => Some(Outcome::Present {
                candidate: candidate.as_ref(),
                kept: false,
            }),
            Decision::KeepExisting {
                existing: Some(existing),
                ..
            } => Some(Outcome::Present {
                candidate: existing.as_ref(),
                kept: true,
            }),
            Decision::KeepExisting { existing: None, .. } => Some(Outcome::Absent { removed: false }),
            Decision::RemoveExisting { .. } => Some(Outcome::Absent { removed: true }),
            Decision::Unresolvable { .. } => None,
        }
    }

    /// The candidate that will be present afterwards, if any.
    pub fn candidate(&self) -> Option<&Arc<CandidateRecord>> {
        match self {
            Decision::Install { candidate, .. } => Some(candidate),
            Decision::KeepExisting { existing, .. } => existing.as_ref(),
            _ => None,
        }
    }

    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Decision::Unresolvable { .. })
    }

    /// Keeping nothing: the only decision that may be replaced without a restart.
    pub fn is_nothing(&self) -> bool {
        matches!(self, Decision::KeepExisting { existing: None, .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Install {
                candidate,
                change,
                choice_changes,
                ..
            } => {
                write!(f, "install {} ({})", candidate, change)?;
                if !choice_changes.is_empty() {
                    let changes: Vec<String> = choice_changes.iter().map(ToString::to_string).collect();
                    write!(f, " [{}]", changes.join(" "))?;
                }
                Ok(())
            }
            Decision::KeepExisting {
                existing: Some(existing),
                ..
            } => write!(f, "keep {}", existing),
            Decision::KeepExisting { existing: None, .. } => write!(f, "nothing to do"),
            Decision::RemoveExisting { existing, .. } => {
                let ids: Vec<String> = existing.iter().map(|c| c.id()).collect();
                write!(f, "remove {}", ids.join(", "))
            }
            Decision::Unresolvable { .. } => write!(f, "unresolvable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;

    #[test]
    fn test_change_kind() {
        let installed = vec![Arc::new(
            CandidateRecord::new("a", Version::new(1, 0, 0)).with_slot("1").installed(),
        )];
        let newer = CandidateRecord::new("a", Version::new(1, 2, 0)).with_slot("1");
        let older = CandidateRecord::new("a", Version::new(0, 9, 0)).with_slot("1");
        let same = CandidateRecord::new("a", Version::new(1, 0, 0)).with_slot("1");
        let other_slot = CandidateRecord::new("a", Version::new(2, 0, 0)).with_slot("2");
        let fresh = CandidateRecord::new("b", Version::new(1, 0, 0));

        assert_eq!(ChangeKind::classify(&newer, &installed), ChangeKind::Upgrade);
        assert_eq!(ChangeKind::classify(&older, &installed), ChangeKind::Downgrade);
        assert_eq!(ChangeKind::classify(&same, &installed), ChangeKind::Reinstall);
        assert_eq!(ChangeKind::classify(&other_slot, &installed), ChangeKind::NewSlot);
        assert_eq!(ChangeKind::classify(&fresh, &installed), ChangeKind::New);
    }

    #[test]
    fn test_outcome_and_taken() {
        let mut decision = Decision::KeepExisting {
            existing: None,
            taken: false,
        };
        assert!(decision.is_nothing());
        assert!(matches!(decision.outcome(), Some(Outcome::Absent { removed: false })));
        decision.set_taken(true);
        assert!(decision.taken());

        let unresolvable = Decision::Unresolvable {
            diagnostic: UnresolvableDiagnostic::default().with_note("no candidates"),
            taken: true,
        };
        assert!(unresolvable.outcome().is_none());
        assert_eq!(unresolvable.to_string(), "unresolvable");
    }
}
