//! Error reporting for Cairn.
//!
//! Library errors are converted into [`CairnError`], which carries a code and
//! a help text for miette to render.

// These fields are used by thiserror/miette derive macros
#![allow(unused_assignments)]

pub use miette::{Diagnostic, Report, Result};

use cairn_repository::RepositoryError;
use cairn_resolver::{ConflictFormatter, ResolveError};
use cairn_types::{PolicyParseError, SpecError};
use thiserror::Error;

/// A Cairn error with rich diagnostics.
#[derive(Error, Diagnostic, Debug)]
pub enum CairnError {
    #[error("Could not resolve {targets}")]
    #[diagnostic(
        code(cairn::resolve::unresolvable),
        help("{details}")
    )]
    Unresolvable { targets: String, details: String },

    #[error("Unresolved blockers on {targets}")]
    #[diagnostic(
        code(cairn::resolve::blockers),
        help("{details}\nBlocked packages can be removed with --permit-uninstall, or blockers ignored with --dl-blocks pretend-satisfied")
    )]
    BlockerConflict { targets: String, details: String },

    #[error("Dependency cycle detected")]
    #[diagnostic(
        code(cairn::resolve::cycle),
        help("{cycle}\nUse --dl-circular discard to drop the ordering between these packages")
    )]
    DependencyCycle { cycle: String },

    #[error("Gave up after {limit} restarts")]
    #[diagnostic(
        code(cairn::resolve::restarts),
        help("Last restart was for {last}. Raise the limit with --max-restarts")
    )]
    RestartLimit { limit: usize, last: String },

    #[error("No such package set: @{name}")]
    #[diagnostic(
        code(cairn::resolve::no_such_set),
        help("Sets come from the [sets] table of a repository; @world is the world file")
    )]
    NoSuchSet { name: String },

    #[error("No installed package matches {spec}")]
    #[diagnostic(code(cairn::uninstall::not_installed))]
    NotInstalled { spec: String },

    #[error("Invalid package spec: {message}")]
    #[diagnostic(
        code(cairn::spec::invalid),
        help("Specs look like name[@version-req][:slot][::repository][[choice,-choice]]")
    )]
    InvalidSpec {
        message: String,
        #[source_code]
        src: String,
        #[label("in this spec")]
        span: miette::SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(cairn::config::invalid))]
    InvalidOption { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(cairn::repository::error),
        help("Check the repository, installed database and world paths in cairn.toml")
    )]
    Repository { message: String },

    #[error("{failed} of {total} jobs failed")]
    #[diagnostic(
        code(cairn::execute::failed),
        help("Use --continue-on-failure to carry on with jobs that do not depend on a failure")
    )]
    ExecutionFailed { failed: usize, total: usize },

    #[error("{0}")]
    #[diagnostic(code(cairn::generic))]
    Generic(String),
}

impl CairnError {
    pub fn invalid_spec(spec: &str, error: &SpecError) -> Self {
        Self::InvalidSpec {
            message: error.to_string(),
            src: spec.to_string(),
            span: (0, spec.len()).into(),
        }
    }

    pub fn execution_failed(failed: usize, total: usize) -> Self {
        Self::ExecutionFailed { failed, total }
    }
}

fn targets(error: &ResolveError) -> String {
    error
        .reports()
        .iter()
        .map(|report| report.resolvent.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ResolveError> for CairnError {
    fn from(error: ResolveError) -> Self {
        match &error {
            ResolveError::Unresolvable { .. } => Self::Unresolvable {
                targets: targets(&error),
                details: ConflictFormatter::format_error(&error),
            },
            ResolveError::BlockerConflict { .. } => Self::BlockerConflict {
                targets: targets(&error),
                details: ConflictFormatter::format_error(&error),
            },
            ResolveError::CircularDependency { cycle } => Self::DependencyCycle {
                cycle: ConflictFormatter::format_cycle(cycle),
            },
            ResolveError::RestartLimitExceeded { limit, history } => Self::RestartLimit {
                limit: *limit,
                last: history.last().cloned().unwrap_or_else(|| "nothing".to_string()),
            },
            ResolveError::NoSuchSet(name) => Self::NoSuchSet { name: name.clone() },
            ResolveError::NotInstalled(spec) => Self::NotInstalled { spec: spec.clone() },
            ResolveError::RequirementCycle { .. } | ResolveError::ProviderError(_) => {
                Self::Generic(error.to_string())
            }
        }
    }
}

impl From<RepositoryError> for CairnError {
    fn from(error: RepositoryError) -> Self {
        Self::Repository {
            message: error.to_string(),
        }
    }
}

impl From<PolicyParseError> for CairnError {
    fn from(error: PolicyParseError) -> Self {
        Self::InvalidOption {
            message: error.to_string(),
        }
    }
}

/// Setup miette for pretty error output.
pub fn setup(color: bool) {
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .color(color)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_resolver::{MemoryRepository, Resolver, Target};
    use cairn_types::{CandidateRecord, DepTree, PackageSpec, Version};

    #[test]
    fn test_unresolvable_carries_report() {
        let mut repo = MemoryRepository::new();
        repo.add_package(
            CandidateRecord::new("app", Version::new(1, 0, 0))
                .with_run(DepTree::all(vec![DepTree::named("missing")])),
        );
        let error = Resolver::new(repo)
            .resolve(&[Target::Package(PackageSpec::new("app"))])
            .unwrap_err();

        match CairnError::from(error) {
            CairnError::Unresolvable { targets, details } => {
                assert!(targets.starts_with("missing"));
                assert!(details.contains("No decision for missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_codes() {
        let error = CairnError::from(ResolveError::NoSuchSet("desktop".into()));
        assert_eq!(error.to_string(), "No such package set: @desktop");
        assert_eq!(
            error.code().map(|c| c.to_string()),
            Some("cairn::resolve::no_such_set".to_string())
        );

        let spec_error = "@1.0".parse::<PackageSpec>().unwrap_err();
        let error = CairnError::invalid_spec("@1.0", &spec_error);
        assert!(matches!(error, CairnError::InvalidSpec { .. }));
    }
}
