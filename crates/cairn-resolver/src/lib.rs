//! Constraint-driven package resolution for Cairn.
//!
//! Targets are turned into constraints on resolvents (one slot of one package
//! for one destination). Every resolvent gets a single decision, taken
//! decisions pull in their dependencies, and when a late constraint shows an
//! earlier decision was wrong the whole pass starts over with that constraint
//! preloaded. The result is a set of decisions plus a job graph in a valid
//! execution order.
//!
//! # Example
//!
//! ```ignore
//! use cairn_resolver::{MemoryRepository, Resolver, Target};
//!
//! let resolver = Resolver::new(repository);
//! let resolved = resolver.resolve(&[Target::Package("git".parse()?)])?;
//! for job in resolved.jobs().ordered() {
//!     println!("{}", job);
//! }
//! ```

pub mod conflict;
pub mod constraint;
pub mod decider;
pub mod decision;
pub mod error;
pub mod expander;
pub mod jobs;
pub mod provider;
pub mod reason;
pub mod resolvent;
pub mod restart;
pub mod uninstall;

pub use conflict::{ConflictFormatter, ErrorMessageBuilder};
pub use constraint::{Constraint, Constraints, Requirement, Strength, UseExisting};
pub use decider::{Resolution, Target};
pub use decision::{ChangeKind, ChoiceChange, Decision, UnresolvableDiagnostic, UnsuitableCandidate};
pub use error::{ConstraintChain, ResolutionSuggestion, ResolveError, UnresolvableReport};
pub use jobs::{Job, JobGraph, JobId, JobKind, JobRequirement, RequiredIf};
pub use provider::{CandidateFilter, CandidateQuery, MemoryRepository};
pub use reason::Reason;
pub use resolvent::{Resolvent, SlotKey};
pub use restart::RestartRecord;
pub use uninstall::{DependencyIndex, RemovalCause, RemovalEntry, UninstallList, UninstallOptions};

use cairn_types::{PackageSpec, ResolverOptions};
use decider::{Decider, Interrupt};
use indexmap::IndexMap;
use restart::RestartLedger;

impl From<RemovalEntry> for Target {
    fn from(entry: RemovalEntry) -> Self {
        Target::Remove {
            candidate: entry.candidate,
            cause: entry.cause,
        }
    }
}

/// The outcome of a successful resolve.
#[derive(Debug, Clone)]
pub struct Resolved {
    resolutions: IndexMap<Resolvent, Resolution>,
    jobs: JobGraph,
    warnings: Vec<String>,
    restarts: Vec<RestartRecord>,
}

impl Resolved {
    /// Every resolution, in the order it was first constrained.
    pub fn resolutions(&self) -> impl Iterator<Item = &Resolution> + '_ {
        self.resolutions.values()
    }

    pub fn resolution(&self, resolvent: &Resolvent) -> Option<&Resolution> {
        self.resolutions.get(resolvent)
    }

    /// The first decision made for a package, whatever its slot or destination.
    pub fn decision_for(&self, name: &str) -> Option<&Decision> {
        self.resolutions
            .values()
            .filter(|r| r.resolvent.name == name)
            .find_map(|r| r.decision.as_ref())
    }

    /// Taken decisions that change something.
    pub fn changes(&self) -> impl Iterator<Item = &Resolution> + '_ {
        self.resolutions.values().filter(|r| {
            matches!(
                r.decision,
                Some(Decision::Install { taken: true, .. })
                    | Some(Decision::RemoveExisting { taken: true, .. })
            )
        })
    }

    /// Decisions that were only suggested.
    pub fn suggestions(&self) -> impl Iterator<Item = &Resolution> + '_ {
        self.resolutions.values().filter(|r| {
            r.decision
                .as_ref()
                .map_or(false, |d| !d.taken() && !d.is_unresolvable() && !d.is_nothing())
        })
    }

    pub fn jobs(&self) -> &JobGraph {
        &self.jobs
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Restarts that happened before the resolve settled.
    pub fn restarts(&self) -> &[RestartRecord] {
        &self.restarts
    }

    /// Names of installed packages, in execution order.
    pub fn install_order(&self) -> Vec<String> {
        self.jobs
            .ordered()
            .filter_map(|job| match &job.kind {
                JobKind::Install { candidate, .. } => Some(candidate.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Names of removed packages, in execution order.
    pub fn removal_order(&self) -> Vec<String> {
        self.jobs
            .ordered()
            .filter_map(|job| match &job.kind {
                JobKind::Uninstall { removing } => removing.first().map(|c| c.name.clone()),
                _ => None,
            })
            .collect()
    }
}

/// The resolver façade.
///
/// Holds the query backend, the options and the targets accepted so far.
/// Adding a target re-resolves everything and only commits if that succeeds,
/// so a failed add leaves the previous result untouched.
pub struct Resolver<Q: CandidateQuery> {
    query: Q,
    options: ResolverOptions,
    targets: Vec<Target>,
    resolved: Option<Resolved>,
}

impl<Q: CandidateQuery> Resolver<Q> {
    /// Create a resolver with default options.
    pub fn new(query: Q) -> Self {
        Self::with_options(query, ResolverOptions::default())
    }

    pub fn with_options(query: Q, options: ResolverOptions) -> Self {
        Self {
            query,
            options,
            targets: Vec::new(),
            resolved: None,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Targets accepted so far.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// The result for the accepted targets, once any have been added.
    pub fn resolved(&self) -> Option<&Resolved> {
        self.resolved.as_ref()
    }

    /// Add one target and re-resolve. On failure nothing changes.
    pub fn add_target(&mut self, target: Target) -> Result<&Resolved, ResolveError> {
        self.add_targets(std::iter::once(target))
    }

    /// Add several targets at once, all or nothing.
    pub fn add_targets(&mut self, targets: impl IntoIterator<Item = Target>) -> Result<&Resolved, ResolveError> {
        let mut candidate_targets = self.targets.clone();
        candidate_targets.extend(targets);
        let resolved = self.resolve(&candidate_targets)?;
        self.targets = candidate_targets;
        Ok(self.resolved.insert(resolved))
    }

    /// Resolve a list of targets from scratch.
    pub fn resolve(&self, targets: &[Target]) -> Result<Resolved, ResolveError> {
        let mut ledger = RestartLedger::new(self.options.max_restarts);
        loop {
            let restart = {
                let mut decider = Decider::new(&self.query, &self.options, &ledger);
                match decider.run(targets) {
                    Ok(()) => return finish(decider, &ledger),
                    Err(Interrupt::Fatal(err)) => return Err(err),
                    Err(Interrupt::Restart(restart)) => restart,
                }
            };
            ledger.record(*restart)?;
        }
    }

    /// Removal targets for `specs` plus whatever has to go with them.
    pub fn removal_targets(
        &self,
        specs: &[PackageSpec],
        options: &UninstallOptions,
    ) -> Result<Vec<Target>, ResolveError> {
        let mut candidates = Vec::new();
        for spec in specs {
            let matched: Vec<_> = self
                .query
                .installed_candidates_for(&spec.name)?
                .into_iter()
                .filter(|c| spec.matches_ignoring_choices(c))
                .collect();
            if matched.is_empty() {
                return Err(ResolveError::NotInstalled(spec.to_string()));
            }
            candidates.extend(matched);
        }
        let index = DependencyIndex::new(self.query.all_installed()?);
        Ok(UninstallList::new(&index, options)
            .compute(&candidates)
            .into_iter()
            .map(Target::from)
            .collect())
    }

    /// Removal targets for every installed package no protected package needs.
    pub fn unused_targets(&self, protected: &[PackageSpec]) -> Result<Vec<Target>, ResolveError> {
        let index = DependencyIndex::new(self.query.all_installed()?);
        Ok(uninstall::compute_unused(&index, protected)
            .into_iter()
            .map(Target::from)
            .collect())
    }
}

fn finish<Q: CandidateQuery>(decider: Decider<'_, Q>, ledger: &RestartLedger) -> Result<Resolved, ResolveError> {
    let failures = decider.failures();
    if !failures.is_empty() {
        let blocked = failures.iter().all(|(_, blocked)| *blocked);
        let failures: Vec<UnresolvableReport> = failures.into_iter().map(|(report, _)| report).collect();
        return Err(if blocked {
            ResolveError::BlockerConflict { failures }
        } else {
            ResolveError::Unresolvable { failures }
        });
    }

    let outcomes = decider.into_outcomes();
    let jobs = JobGraph::build(&outcomes.resolutions, &outcomes.edges)?;
    tracing::debug!("resolved {} resolutions into {} jobs", outcomes.resolutions.len(), jobs.len());
    Ok(Resolved {
        resolutions: outcomes.resolutions,
        jobs,
        warnings: outcomes.warnings,
        restarts: ledger.history().to_vec(),
    })
}
