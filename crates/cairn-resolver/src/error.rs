//! Error types for resolution and ordering.

use crate::decision::UnresolvableDiagnostic;
use crate::resolvent::Resolvent;
use std::fmt;
use thiserror::Error;

/// Errors that end a resolve.
///
/// Expected "nothing fits" outcomes are recorded as decisions first and only
/// become an error once the whole resolve has finished.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// Some resolutions have no acceptable decision.
    #[error("could not resolve {}", format_resolvents(.failures))]
    Unresolvable { failures: Vec<UnresolvableReport> },

    /// Blockers that could not be satisfied by removing or replacing anything.
    #[error("unresolved blockers on {}", format_resolvents(.failures))]
    BlockerConflict { failures: Vec<UnresolvableReport> },

    /// A pre-dependency cycle under `circular = error`.
    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<String> },

    /// More restarts were needed than allowed.
    #[error("gave up after {limit} restarts (last: {})", .history.last().map(String::as_str).unwrap_or("none"))]
    RestartLimitExceeded { limit: usize, history: Vec<String> },

    /// The job graph contains a cycle; expansion should have prevented this.
    #[error("internal error: job requirement cycle: {}", format_cycle(.cycle))]
    RequirementCycle { cycle: Vec<String> },

    /// A `@set` target that the repository does not know.
    #[error("no such package set: @{0}")]
    NoSuchSet(String),

    /// An uninstall target that matches nothing installed.
    #[error("no installed package matches {0}")]
    NotInstalled(String),

    /// The candidate query layer failed.
    #[error("failed to query packages: {0}")]
    ProviderError(String),
}

fn format_cycle(cycle: &[String]) -> String {
    cycle.join(" -> ")
}

fn format_resolvents(failures: &[UnresolvableReport]) -> String {
    failures
        .iter()
        .map(|f| f.resolvent.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ResolveError {
    /// The per-resolvent reports carried by this error, if any.
    pub fn reports(&self) -> &[UnresolvableReport] {
        match self {
            ResolveError::Unresolvable { failures } | ResolveError::BlockerConflict { failures } => {
                failures
            }
            _ => &[],
        }
    }
}

/// A constraint together with the chain of resolvents that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintChain {
    /// The requirement, rendered
    pub requirement: String,
    /// The immediate reason, rendered
    pub reason: String,
    /// Resolvents from the user's request down to the one imposing the constraint
    pub chain: Vec<String>,
}

impl fmt::Display for ConstraintChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} required by {}", self.requirement, self.reason)?;
        if !self.chain.is_empty() {
            write!(f, " (via {})", self.chain.join(" -> "))?;
        }
        Ok(())
    }
}

/// Why one resolvent could not be decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvableReport {
    pub resolvent: Resolvent,
    pub constraints: Vec<ConstraintChain>,
    pub diagnostic: UnresolvableDiagnostic,
    pub suggestions: Vec<ResolutionSuggestion>,
}

/// Suggested ways out of a resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSuggestion {
    /// A masked candidate would fit if its mask were overridden.
    OverrideMask { candidate: String, mask: String },

    /// A locked choice stands in the way.
    UnlockChoice { candidate: String, choice: String },

    /// The blocked package could be removed.
    PermitUninstall { package: String },

    /// An installed version is newer than every fitting candidate.
    AllowDowngrade { package: String },

    /// Nothing by that name exists.
    CheckName { package: String },
}

impl fmt::Display for ResolutionSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverrideMask { candidate, mask } => {
                write!(f, "{} is masked ({}); allow it with --override-masks", candidate, mask)
            }
            Self::UnlockChoice { candidate, choice } => {
                write!(f, "{} has '{}' locked; change it in the repository", candidate, choice)
            }
            Self::PermitUninstall { package } => {
                write!(f, "Allow removing {} with --permit-uninstall", package)
            }
            Self::AllowDowngrade { package } => {
                write!(f, "Allow downgrading {} with --dl-downgrade as-needed", package)
            }
            Self::CheckName { package } => {
                write!(f, "No repository provides '{}'; check the name", package)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvent::SlotKey;
    use cairn_types::DestinationKind;

    #[test]
    fn test_constraint_chain_display() {
        let chain = ConstraintChain {
            requirement: "openssl@>=3".to_string(),
            reason: "run dependency of curl-8.4.0:0::core".to_string(),
            chain: vec!["git:0 -> filesystem".to_string(), "curl:0 -> filesystem".to_string()],
        };
        let text = chain.to_string();
        assert!(text.starts_with("openssl@>=3 required by run dependency"));
        assert!(text.contains("(via git:0 -> filesystem -> curl:0 -> filesystem)"));
    }

    #[test]
    fn test_error_display_lists_resolvents() {
        let err = ResolveError::Unresolvable {
            failures: vec![UnresolvableReport {
                resolvent: Resolvent::new("seven", SlotKey::named("0"), DestinationKind::Filesystem),
                constraints: vec![],
                diagnostic: UnresolvableDiagnostic::default(),
                suggestions: vec![],
            }],
        };
        assert_eq!(err.to_string(), "could not resolve seven:0 -> filesystem");
        assert_eq!(err.reports().len(), 1);

        let cycle = ResolveError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.to_string(), "dependency cycle detected: a -> b -> a");
    }
}
