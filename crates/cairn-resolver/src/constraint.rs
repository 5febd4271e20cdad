//! The constraint model: what each reason demands of a resolvent.

use crate::decision::Outcome;
use crate::reason::Reason;
use cairn_types::{ChoiceRequirement, PackageSpec};
use std::fmt;

/// What a constraint demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Something matching the spec must be present
    Exists(PackageSpec),
    /// Nothing matching the spec may be present
    Absent(PackageSpec),
    /// Whatever is installed must stay exactly as it is
    UseExisting,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Exists(spec) => write!(f, "{}", spec),
            Requirement::Absent(spec) => write!(f, "not {}", spec),
            Requirement::UseExisting => write!(f, "keep existing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    /// Must hold, or the resolution fails
    Hard,
    /// Preferred; dropped with a warning when it cannot hold
    Soft,
    /// Only shown to the user, never acted on by itself
    Suggestion,
}

/// When an installed package satisfying a constraint may be kept instead of rebuilt.
///
/// Variants are ordered from strictest to loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UseExisting {
    Never,
    IfSame,
    IfSameVersion,
    IfPossible,
}

/// One requirement on a resolvent together with its owned reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub reason: Reason,
    pub requirement: Requirement,
    pub strength: Strength,
    pub use_existing: UseExisting,
}

impl Constraint {
    /// A hard constraint that is happy with any existing install.
    pub fn new(reason: Reason, requirement: Requirement) -> Self {
        Self {
            reason,
            requirement,
            strength: Strength::Hard,
            use_existing: UseExisting::IfPossible,
        }
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_use_existing(mut self, use_existing: UseExisting) -> Self {
        self.use_existing = use_existing;
        self
    }

    pub fn is_absence(&self) -> bool {
        matches!(self.requirement, Requirement::Absent(_))
    }

    /// Does the state a decision leads to satisfy this constraint?
    pub fn admits(&self, outcome: &Outcome<'_>) -> bool {
        match (&self.requirement, outcome) {
            (Requirement::Exists(spec), Outcome::Present { candidate, .. }) => spec.matches(candidate),
            (Requirement::Exists(_), Outcome::Absent { .. }) => false,
            (Requirement::Absent(spec), Outcome::Present { candidate, .. }) => !spec.matches(candidate),
            (Requirement::Absent(_), Outcome::Absent { .. }) => true,
            (Requirement::UseExisting, Outcome::Present { kept, .. }) => *kept,
            (Requirement::UseExisting, Outcome::Absent { removed }) => !*removed,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strength = match self.strength {
            Strength::Hard => "",
            Strength::Soft => " (soft)",
            Strength::Suggestion => " (suggestion)",
        };
        write!(f, "{}{}, from {}", self.requirement, strength, self.reason)
    }
}

/// The ordered constraints accumulated on one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    items: Vec<Constraint>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.items.push(constraint);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, constraint: &Constraint) -> bool {
        self.items.contains(constraint)
    }

    pub fn has_hard(&self) -> bool {
        self.items.iter().any(|c| c.strength == Strength::Hard)
    }

    /// Every constraint is a suggestion, so nothing has to be acted on.
    pub fn all_suggestions(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|c| c.strength == Strength::Suggestion)
    }

    /// Some constraint asks for action: the decision will produce jobs.
    pub fn is_taken(&self) -> bool {
        self.items.iter().any(|c| c.strength != Strength::Suggestion)
    }

    /// Constraints that must hold. When there are no hard ones, everything is primary.
    pub fn primary(&self) -> Vec<&Constraint> {
        if self.has_hard() {
            self.items.iter().filter(|c| c.strength == Strength::Hard).collect()
        } else {
            self.items.iter().collect()
        }
    }

    /// Constraints that are only preferred while hard ones exist.
    pub fn preferred(&self) -> Vec<&Constraint> {
        if self.has_hard() {
            self.items.iter().filter(|c| c.strength != Strength::Hard).collect()
        } else {
            Vec::new()
        }
    }

    /// Absence is acceptable: no primary constraint asks for something to exist.
    pub fn nothing_is_fine_too(&self) -> bool {
        self.primary()
            .iter()
            .all(|c| !matches!(c.requirement, Requirement::Exists(_)))
    }

    /// The strictest use-existing level among primary constraints.
    pub fn strictest_use_existing(&self) -> UseExisting {
        self.primary()
            .iter()
            .map(|c| c.use_existing)
            .min()
            .unwrap_or(UseExisting::IfPossible)
    }

    /// Choice states required by the given constraints, in first-seen order.
    pub fn choice_requirements<'a>(constraints: &[&'a Constraint]) -> Vec<&'a ChoiceRequirement> {
        let mut out: Vec<&ChoiceRequirement> = Vec::new();
        for constraint in constraints {
            if let Requirement::Exists(spec) = &constraint.requirement {
                for req in &spec.choices {
                    if !out.contains(&req) {
                        out.push(req);
                    }
                }
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a Constraints {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{CandidateRecord, Version};

    fn target(spec: &str) -> Reason {
        Reason::Target {
            spec: spec.parse().unwrap(),
        }
    }

    #[test]
    fn test_admits_outcomes() {
        let candidate = CandidateRecord::new("a", Version::new(1, 0, 0)).with_choice("x", true);
        let present = Outcome::Present {
            candidate: &candidate,
            kept: false,
        };
        let removed = Outcome::Absent { removed: true };

        let exists = Constraint::new(target("a[x]"), Requirement::Exists("a[x]".parse().unwrap()));
        assert!(exists.admits(&present));
        assert!(!exists.admits(&removed));

        let absent = Constraint::new(target("a"), Requirement::Absent("a@>=2".parse().unwrap()));
        assert!(absent.admits(&present));
        assert!(absent.admits(&removed));

        let keep = Constraint::new(target("a"), Requirement::UseExisting);
        assert!(!keep.admits(&present));
        assert!(!keep.admits(&removed));
        assert!(keep.admits(&Outcome::Absent { removed: false }));
    }

    #[test]
    fn test_primary_and_preferred() {
        let mut constraints = Constraints::new();
        constraints.add(
            Constraint::new(target("a"), Requirement::Exists("a".parse().unwrap()))
                .with_strength(Strength::Soft),
        );
        assert_eq!(constraints.primary().len(), 1);
        assert!(constraints.preferred().is_empty());
        assert!(constraints.is_taken());

        constraints.add(
            Constraint::new(target("a"), Requirement::Exists("a@<2".parse().unwrap()))
                .with_use_existing(UseExisting::IfSame),
        );
        assert_eq!(constraints.primary().len(), 1);
        assert_eq!(constraints.preferred().len(), 1);
        assert_eq!(constraints.strictest_use_existing(), UseExisting::IfSame);
        assert!(!constraints.nothing_is_fine_too());
    }

    #[test]
    fn test_suggestions_only() {
        let mut constraints = Constraints::new();
        constraints.add(
            Constraint::new(target("a"), Requirement::Exists("a".parse().unwrap()))
                .with_strength(Strength::Suggestion),
        );
        assert!(constraints.all_suggestions());
        assert!(!constraints.is_taken());
    }

    #[test]
    fn test_choice_requirements_dedup() {
        let a = Constraint::new(target("a"), Requirement::Exists("a[x,-y]".parse().unwrap()));
        let b = Constraint::new(target("a"), Requirement::Exists("a[x]".parse().unwrap()));
        let reqs = Constraints::choice_requirements(&[&a, &b]);
        assert_eq!(reqs.len(), 2);
    }
}
