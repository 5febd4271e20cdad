//! Resolvent keys.

use cairn_types::{CandidateRecord, DestinationKind};
use std::fmt;

/// The slot part of a resolvent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    /// No slot could be determined, usually because the package does not exist
    Any,
    /// One concrete slot
    Named(String),
}

impl SlotKey {
    pub fn named(slot: impl Into<String>) -> Self {
        SlotKey::Named(slot.into())
    }

    /// Does a candidate in `slot` belong to this key?
    pub fn admits(&self, slot: &str) -> bool {
        match self {
            SlotKey::Any => true,
            SlotKey::Named(s) => s == slot,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SlotKey::Any => None,
            SlotKey::Named(s) => Some(s),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Any => write!(f, "*"),
            SlotKey::Named(s) => write!(f, "{}", s),
        }
    }
}

/// One slot of one package for one destination.
///
/// Constraints and decisions are bucketed by resolvent, so parallel slots of a
/// package are resolved independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolvent {
    pub name: String,
    pub slot: SlotKey,
    pub destination: DestinationKind,
}

impl Resolvent {
    pub fn new(name: impl Into<String>, slot: SlotKey, destination: DestinationKind) -> Self {
        Self {
            name: name.into(),
            slot,
            destination,
        }
    }

    /// The resolvent a candidate lives in for `destination`.
    pub fn for_candidate(candidate: &CandidateRecord, destination: DestinationKind) -> Self {
        Self::new(
            candidate.name.clone(),
            SlotKey::named(candidate.slot.clone()),
            destination,
        )
    }

    /// The same package and slot for another destination.
    pub fn with_destination(&self, destination: DestinationKind) -> Self {
        Self {
            destination,
            ..self.clone()
        }
    }

    /// Does `candidate` belong to this resolvent's package and slot?
    pub fn admits(&self, candidate: &CandidateRecord) -> bool {
        self.name == candidate.name && self.slot.admits(&candidate.slot)
    }
}

impl fmt::Display for Resolvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.name, self.slot, self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;

    #[test]
    fn test_resolvent_display() {
        let r = Resolvent::new("python", SlotKey::named("3.12"), DestinationKind::Filesystem);
        assert_eq!(r.to_string(), "python:3.12 -> filesystem");
        let any = Resolvent::new("nope", SlotKey::Any, DestinationKind::RemoveOnly);
        assert_eq!(any.to_string(), "nope:* -> remove-only");
    }

    #[test]
    fn test_resolvent_equality() {
        let a = Resolvent::new("python", SlotKey::named("3.12"), DestinationKind::Filesystem);
        let b = a.with_destination(DestinationKind::BinaryRepository);
        assert_ne!(a, b);
        assert_eq!(a, b.with_destination(DestinationKind::Filesystem));
    }

    #[test]
    fn test_admits() {
        let candidate = CandidateRecord::new("python", Version::new(3, 12, 1)).with_slot("3.12");
        let r = Resolvent::for_candidate(&candidate, DestinationKind::Filesystem);
        assert!(r.admits(&candidate));
        assert!(!r.admits(&candidate.clone().with_slot("3.11")));
        assert!(Resolvent::new("python", SlotKey::Any, DestinationKind::Filesystem).admits(&candidate));
    }
}
