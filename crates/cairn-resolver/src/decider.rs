//! The decision engine.
//!
//! Constraints are collected per resolvent, each resolvent gets exactly one
//! decision, and taken decisions are expanded into constraints on further
//! resolvents until nothing changes. When a constraint turns up that an
//! earlier decision cannot meet, the decider asks for a restart instead of
//! rewriting that decision.

use crate::conflict::ConflictFormatter;
use crate::constraint::{Constraint, Constraints, Requirement, Strength, UseExisting};
use crate::decision::{
    ChangeKind, ChoiceChange, Decision, Outcome, UnresolvableDiagnostic, UnsuitableCandidate,
};
use crate::error::{ConstraintChain, ResolveError, UnresolvableReport};
use crate::expander::{self, AnyScore, DependencySpec, SanitisedDependency};
use crate::jobs::{EdgeKind, OrderingEdge};
use crate::provider::{CandidateFilter, CandidateQuery};
use crate::reason::{AlreadyMet, OrderingBucket, Reason};
use crate::restart::{RestartLedger, SuggestRestart};
use crate::resolvent::{Resolvent, SlotKey};
use crate::uninstall::{DependencyIndex, RemovalCause};
use cairn_types::{
    BlockerPolicy, CandidateRecord, CircularPolicy, DepClass, DepsPolicy, DestinationKind,
    DowngradePolicy, MaskReason, NewSlotsPolicy, PackageSpec, ReinstallPolicy, ResolverOptions,
    RetryOrder, SuggestedPolicy, UpgradePolicy, Version, VersionReq,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Install something matching the spec
    Package(PackageSpec),
    /// Install every member of a named set
    Set(String),
    /// Remove an installed package
    Remove {
        candidate: Arc<CandidateRecord>,
        cause: RemovalCause,
    },
}

/// Constraints and the decision for one resolvent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub resolvent: Resolvent,
    pub constraints: Constraints,
    pub decision: Option<Decision>,
    /// Identifies the decision whose dependencies were added. An expanded
    /// decision is never replaced in place: a constraint it cannot meet,
    /// including a different choice state, restarts the pass instead.
    expanded: Option<String>,
}

impl Resolution {
    fn new(resolvent: Resolvent, constraints: Constraints) -> Self {
        Self {
            resolvent,
            constraints,
            decision: None,
            expanded: None,
        }
    }
}

fn expansion_key(decision: &Decision) -> Option<String> {
    match decision {
        Decision::Install { candidate, .. } => {
            Some(format!("install {} {:?}", candidate.id(), candidate.choice_snapshot()))
        }
        Decision::KeepExisting {
            existing: Some(existing),
            ..
        } => Some(format!("keep {}", existing.id())),
        Decision::RemoveExisting { existing, .. } => {
            let ids: Vec<String> = existing.iter().map(|c| c.id()).collect();
            Some(format!("remove {}", ids.join(" ")))
        }
        _ => None,
    }
}

/// Why a pass stopped early.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Restart(Box<SuggestRestart>),
    Fatal(ResolveError),
}

impl From<ResolveError> for Interrupt {
    fn from(err: ResolveError) -> Self {
        Interrupt::Fatal(err)
    }
}

/// How far a candidate search may bend the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    AsIs,
    ChangeChoices,
    OverrideMasks,
    Both,
}

impl Pass {
    fn changes_choices(self) -> bool {
        matches!(self, Pass::ChangeChoices | Pass::Both)
    }

    fn overrides_masks(self) -> bool {
        matches!(self, Pass::OverrideMasks | Pass::Both)
    }
}

/// An installable candidate that fits.
struct Found {
    candidate: Arc<CandidateRecord>,
    choice_changes: Vec<ChoiceChange>,
    mask_overrides: Vec<MaskReason>,
    best: bool,
    /// Soft constraints hold too
    full: bool,
}

/// What one pass produced.
pub(crate) struct Outcomes {
    pub resolutions: IndexMap<Resolvent, Resolution>,
    pub edges: Vec<OrderingEdge>,
    pub warnings: Vec<String>,
}

/// One pass of the decision engine.
pub(crate) struct Decider<'a, Q: CandidateQuery> {
    query: &'a Q,
    options: &'a ResolverOptions,
    ledger: &'a RestartLedger,
    resolutions: IndexMap<Resolvent, Resolution>,
    edges: Vec<OrderingEdge>,
    /// Pre edges: a resolvent and the resolvents it needs first
    pre_graph: IndexMap<Resolvent, Vec<Resolvent>>,
    /// Blocker constraints, applied to matching resolutions as they appear
    blockers: Vec<Constraint>,
    warnings: Vec<String>,
    installed: HashMap<String, Vec<Arc<CandidateRecord>>>,
    installable: HashMap<String, Vec<Arc<CandidateRecord>>>,
    index: Option<Arc<DependencyIndex>>,
    protected: Option<Vec<PackageSpec>>,
}

impl<'a, Q: CandidateQuery> Decider<'a, Q> {
    pub fn new(query: &'a Q, options: &'a ResolverOptions, ledger: &'a RestartLedger) -> Self {
        Self {
            query,
            options,
            ledger,
            resolutions: IndexMap::new(),
            edges: Vec::new(),
            pre_graph: IndexMap::new(),
            blockers: Vec::new(),
            warnings: Vec::new(),
            installed: HashMap::new(),
            installable: HashMap::new(),
            index: None,
            protected: None,
        }
    }

    /// Seed every target, then run to a fixpoint.
    pub fn run(&mut self, targets: &[Target]) -> Result<(), Interrupt> {
        for target in targets {
            self.add_target(target)?;
        }
        self.resolve()
    }

    /// Every taken, hard-constrained resolution left without a decision.
    pub fn failures(&self) -> Vec<(UnresolvableReport, bool)> {
        let mut failures = Vec::new();
        for (resolvent, resolution) in &self.resolutions {
            let Some(Decision::Unresolvable {
                diagnostic,
                taken: true,
            }) = &resolution.decision
            else {
                continue;
            };
            if !resolution.constraints.has_hard() {
                continue;
            }
            let primary = resolution.constraints.primary();
            let blocked = !primary.is_empty() && primary.iter().all(|c| is_blocker(&c.reason));
            let constraints = resolution
                .constraints
                .iter()
                .map(|c| ConstraintChain {
                    requirement: c.requirement.to_string(),
                    reason: c.reason.to_string(),
                    chain: self.chain_for(&c.reason),
                })
                .collect();
            failures.push((
                UnresolvableReport {
                    resolvent: resolvent.clone(),
                    constraints,
                    diagnostic: diagnostic.clone(),
                    suggestions: ConflictFormatter::suggest_fixes(resolvent, diagnostic, blocked),
                },
                blocked,
            ));
        }
        failures
    }

    pub fn into_outcomes(mut self) -> Outcomes {
        let unresolved_soft: Vec<String> = self
            .resolutions
            .values()
            .filter(|r| {
                !r.constraints.has_hard()
                    && r.decision.as_ref().map_or(false, |d| d.is_unresolvable() && d.taken())
            })
            .map(|r| format!("{}: could not satisfy soft constraints, ignoring", r.resolvent))
            .collect();
        for message in unresolved_soft {
            self.warn(message);
        }
        Outcomes {
            resolutions: self.resolutions,
            edges: self.edges,
            warnings: self.warnings,
        }
    }

    /// Resolvents from the one imposing `reason` back up to what the user asked for.
    fn chain_for(&self, reason: &Reason) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = reason.from_resolvent().cloned();
        while let Some(resolvent) = current {
            let text = resolvent.to_string();
            if chain.contains(&text) {
                break;
            }
            chain.push(text);
            current = self
                .resolutions
                .get(&resolvent)
                .and_then(|r| r.constraints.iter().next())
                .and_then(|c| c.reason.from_resolvent().cloned());
        }
        chain.reverse();
        chain
    }

    fn warn(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            tracing::warn!("{}", message);
            self.warnings.push(message);
        }
    }

    fn push_edge(&mut self, before: Resolvent, after: Resolvent, kind: EdgeKind) {
        let edge = OrderingEdge { before, after, kind };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    // ----- queries ---------------------------------------------------------

    /// Installed candidates of a package, best version first.
    fn installed_for(&mut self, name: &str) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        if let Some(found) = self.installed.get(name) {
            return Ok(found.clone());
        }
        let mut found = self.query.installed_candidates_for(name)?;
        found.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.slot.cmp(&b.slot)));
        self.installed.insert(name.to_string(), found.clone());
        Ok(found)
    }

    /// Installable candidates of a package including masked ones, best first.
    fn installable_for(&mut self, name: &str) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        if let Some(found) = self.installable.get(name) {
            return Ok(found.clone());
        }
        let mut found = self
            .query
            .candidates_for(name, &CandidateFilter::any().including_masked())?;
        found.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| a.repository.cmp(&b.repository))
                .then_with(|| a.slot.cmp(&b.slot))
        });
        self.installable.insert(name.to_string(), found.clone());
        Ok(found)
    }

    /// What counts as installed for a resolvent. Binary repositories start empty.
    fn installed_here(&mut self, resolvent: &Resolvent) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        if resolvent.destination == DestinationKind::BinaryRepository {
            return Ok(Vec::new());
        }
        Ok(self
            .installed_for(&resolvent.name)?
            .into_iter()
            .filter(|c| resolvent.admits(c))
            .collect())
    }

    fn dependency_index(&mut self) -> Result<Arc<DependencyIndex>, ResolveError> {
        if let Some(index) = &self.index {
            return Ok(index.clone());
        }
        let index = Arc::new(DependencyIndex::new(self.query.all_installed()?));
        self.index = Some(index.clone());
        Ok(index)
    }

    fn is_protected(&mut self, candidate: &CandidateRecord) -> Result<bool, ResolveError> {
        if self.protected.is_none() {
            self.protected = Some(self.query.package_set("world")?.unwrap_or_default());
        }
        Ok(self
            .protected
            .as_ref()
            .map_or(false, |specs| specs.iter().any(|s| s.matches_ignoring_choices(candidate))))
    }

    fn dependency_use_existing(&self) -> UseExisting {
        let by_reinstall = match self.options.reinstall {
            ReinstallPolicy::Never => UseExisting::IfPossible,
            ReinstallPolicy::IfOptionsChanged => UseExisting::IfSame,
            ReinstallPolicy::Always => UseExisting::Never,
        };
        let by_upgrade = match self.options.upgrade {
            UpgradePolicy::Always => UseExisting::IfSameVersion,
            UpgradePolicy::AsNeeded => UseExisting::IfPossible,
        };
        by_reinstall.min(by_upgrade)
    }

    // ----- resolvents and constraints --------------------------------------

    fn add_target(&mut self, target: &Target) -> Result<(), Interrupt> {
        match target {
            Target::Package(spec) => {
                let use_existing = if self.options.reinstall_targets {
                    UseExisting::Never
                } else {
                    self.dependency_use_existing()
                };
                let resolvent = self.resolvent_for(spec, self.options.destination)?;
                let constraint = Constraint::new(
                    Reason::Target { spec: spec.clone() },
                    Requirement::Exists(spec.clone()),
                )
                .with_use_existing(use_existing);
                self.apply_constraint(&resolvent, constraint)
            }
            Target::Set(name) => {
                let members = self
                    .query
                    .package_set(name)?
                    .ok_or_else(|| ResolveError::NoSuchSet(name.clone()))?;
                let use_existing = self.dependency_use_existing();
                for member in members {
                    let resolvent = self.resolvent_for(&member, self.options.destination)?;
                    let constraint = Constraint::new(
                        Reason::SetMembership {
                            set: name.clone(),
                            member: member.clone(),
                        },
                        Requirement::Exists(member),
                    )
                    .with_use_existing(use_existing);
                    self.apply_constraint(&resolvent, constraint)?;
                }
                Ok(())
            }
            Target::Remove { candidate, cause } => {
                let resolvent = Resolvent::for_candidate(candidate, DestinationKind::RemoveOnly);
                let spec = slot_spec(candidate);
                let reason = self.removal_reason(cause, &spec)?;
                self.apply_constraint(&resolvent, Constraint::new(reason, Requirement::Absent(spec)))
            }
        }
    }

    fn removal_reason(&mut self, cause: &RemovalCause, spec: &PackageSpec) -> Result<Reason, ResolveError> {
        let index = self.dependency_index()?;
        let resolvent_of = |id: &str| {
            index
                .find(id)
                .map(|c| Resolvent::for_candidate(c, DestinationKind::RemoveOnly))
        };
        Ok(match cause {
            RemovalCause::Target | RemovalCause::Unreachable => Reason::Target { spec: spec.clone() },
            RemovalCause::Dependent { of } => match resolvent_of(of) {
                Some(on_resolvent) => Reason::Dependent {
                    on_id: of.clone(),
                    on_resolvent,
                },
                None => Reason::Target { spec: spec.clone() },
            },
            RemovalCause::Unused { by } => match resolvent_of(by) {
                Some(by_resolvent) => Reason::WasUsedBy {
                    by_id: by.clone(),
                    by_resolvent,
                },
                None => Reason::Target { spec: spec.clone() },
            },
        })
    }

    /// The resolvent a spec lands in.
    ///
    /// An explicit slot wins. Otherwise a slot already decided in this pass,
    /// then the installed slot, then the best installable slot (the last two
    /// swap under `new_slots = always`). A spec nothing matches gets the
    /// wildcard slot, which can only end up unresolvable.
    fn resolvent_for(&mut self, spec: &PackageSpec, destination: DestinationKind) -> Result<Resolvent, ResolveError> {
        if let Some(slot) = &spec.slot {
            return Ok(Resolvent::new(&spec.name, SlotKey::named(slot), destination));
        }

        let decided = self.resolutions.iter().find(|(r, res)| {
            r.name == spec.name
                && r.destination == destination
                && res
                    .decision
                    .as_ref()
                    .and_then(Decision::candidate)
                    .map_or(false, |c| spec.matches_ignoring_choices(c))
        });
        if let Some((resolvent, _)) = decided {
            return Ok(resolvent.clone());
        }

        let installed = self
            .installed_for(&spec.name)?
            .into_iter()
            .find(|c| spec.matches_ignoring_choices(c));
        let installable: Vec<Arc<CandidateRecord>> = self
            .installable_for(&spec.name)?
            .into_iter()
            .filter(|c| spec.matches_ignoring_choices(c))
            .collect();
        let unmasked = installable.iter().find(|c| self.query.is_masked(c).is_empty());
        let masked = installable.first();

        let chosen = match self.options.new_slots {
            NewSlotsPolicy::Always => unmasked.or(installed.as_ref()).or(masked),
            NewSlotsPolicy::AsNeeded => installed.as_ref().or(unmasked).or(masked),
        };
        Ok(match chosen {
            Some(candidate) => Resolvent::for_candidate(candidate, destination),
            None => Resolvent::new(&spec.name, SlotKey::Any, destination),
        })
    }

    /// Every slot a blocker could hit: installed ones and ones already in play.
    fn blocker_resolvents(&mut self, spec: &PackageSpec, destination: DestinationKind) -> Result<Vec<Resolvent>, ResolveError> {
        if let Some(slot) = &spec.slot {
            return Ok(vec![Resolvent::new(&spec.name, SlotKey::named(slot), destination)]);
        }
        let mut out: Vec<Resolvent> = Vec::new();
        for candidate in self.installed_for(&spec.name)? {
            let resolvent = Resolvent::for_candidate(&candidate, destination);
            if spec.matches_ignoring_choices(&candidate) && !out.contains(&resolvent) {
                out.push(resolvent);
            }
        }
        for resolvent in self.resolutions.keys() {
            if resolvent.name == spec.name
                && resolvent.destination == destination
                && resolvent.slot != SlotKey::Any
                && !out.contains(resolvent)
            {
                out.push(resolvent.clone());
            }
        }
        Ok(out)
    }

    /// Constraints a resolution starts with: presets from earlier passes,
    /// `keep` specs, pending blockers and removals decided elsewhere.
    fn initial_constraints(&mut self, resolvent: &Resolvent) -> Result<Constraints, ResolveError> {
        let mut constraints = Constraints::new();
        for preload in self.ledger.preloads_for(resolvent) {
            constraints.add(preload.clone());
        }

        if resolvent.destination != DestinationKind::BinaryRepository {
            let installed = self.installed_here(resolvent)?;
            for spec in &self.options.keep {
                if installed.iter().any(|c| spec.matches_ignoring_choices(c)) {
                    constraints.add(Constraint::new(
                        Reason::Preset {
                            note: format!("kept by configuration ({})", spec),
                            original: None,
                        },
                        Requirement::UseExisting,
                    ));
                }
            }
        }

        for blocker in &self.blockers {
            let Requirement::Absent(spec) = &blocker.requirement else {
                continue;
            };
            let applies = spec.name == resolvent.name
                && spec.slot.as_ref().map_or(true, |s| resolvent.slot.admits(s))
                && resolvent.destination != DestinationKind::RemoveOnly
                && blocker
                    .reason
                    .from_resolvent()
                    .map_or(true, |from| from.name != resolvent.name);
            if applies && !constraints.contains(blocker) {
                constraints.add(blocker.clone());
            }
        }

        if resolvent.destination == DestinationKind::Filesystem {
            let sibling = resolvent.with_destination(DestinationKind::RemoveOnly);
            let removed = self
                .resolutions
                .get(&sibling)
                .and_then(|r| r.decision.as_ref())
                .map_or(false, |d| matches!(d, Decision::RemoveExisting { .. }));
            if removed {
                constraints.add(like_other_destination(resolvent, &sibling));
            }
        }
        Ok(constraints)
    }

    /// Add a constraint, checking it against any decision already made.
    fn apply_constraint(&mut self, resolvent: &Resolvent, constraint: Constraint) -> Result<(), Interrupt> {
        if !self.resolutions.contains_key(resolvent) {
            let initial = self.initial_constraints(resolvent)?;
            self.resolutions
                .insert(resolvent.clone(), Resolution::new(resolvent.clone(), initial));
        }
        let Some(resolution) = self.resolutions.get_mut(resolvent) else {
            return Ok(());
        };
        if resolution.constraints.contains(&constraint) {
            return Ok(());
        }
        let Some(decision) = resolution.decision.clone() else {
            resolution.constraints.add(constraint);
            return Ok(());
        };

        if still_holds(&decision, &constraint) {
            resolution.constraints.add(constraint);
            if !decision.taken() && resolution.constraints.is_taken() {
                if let Some(decision) = resolution.decision.as_mut() {
                    decision.set_taken(true);
                }
            }
            return Ok(());
        }
        self.made_wrong_decision(resolvent, decision, constraint)
    }

    /// A new constraint rules out the current decision.
    fn made_wrong_decision(
        &mut self,
        resolvent: &Resolvent,
        previous: Decision,
        constraint: Constraint,
    ) -> Result<(), Interrupt> {
        let mut adapted = self
            .resolutions
            .get(resolvent)
            .map(|r| r.constraints.clone())
            .unwrap_or_default();
        adapted.add(constraint.clone());
        // nothing has been expanded from these, so they can change in place
        let replaceable = previous.is_nothing() || previous.is_unresolvable();

        if constraint.strength != Strength::Hard && !replaceable {
            self.warn(format!(
                "{}: {} does not meet {}, ignoring it",
                resolvent, previous, constraint
            ));
            self.store(resolvent, adapted, None);
            return Ok(());
        }

        match self.try_to_find_decision(resolvent, &adapted)? {
            Some(decision) if replaceable => {
                tracing::debug!("{}: {} replaced by {}", resolvent, previous, decision);
                self.store(resolvent, adapted, Some(decision));
                Ok(())
            }
            Some(_) => Err(Interrupt::Restart(Box::new(SuggestRestart {
                resolvent: resolvent.clone(),
                previous: previous.to_string(),
                constraint,
            }))),
            None => {
                let decision = self.unresolvable_decision(resolvent, &adapted)?;
                self.store(resolvent, adapted, Some(decision));
                Ok(())
            }
        }
    }

    fn store(&mut self, resolvent: &Resolvent, constraints: Constraints, decision: Option<Decision>) {
        let Some(resolution) = self.resolutions.get_mut(resolvent) else {
            return;
        };
        let taken = constraints.is_taken();
        resolution.constraints = constraints;
        if let Some(decision) = decision {
            resolution.decision = Some(decision);
            resolution.expanded = None;
        }
        if let Some(decision) = resolution.decision.as_mut() {
            decision.set_taken(taken);
        }
    }

    // ----- the fixpoint ----------------------------------------------------

    fn resolve(&mut self) -> Result<(), Interrupt> {
        let mut suggestions = false;
        loop {
            let mut changed = false;
            let mut i = 0;
            // resolutions appended during the sweep are handled in the same sweep
            while let Some((resolvent, resolution)) = self.resolutions.get_index(i) {
                let resolvent = resolvent.clone();
                let undecided = resolution.decision.is_none();
                let postponed = !suggestions && resolution.constraints.all_suggestions();
                if undecided && !postponed {
                    self.decide(&resolvent)?;
                    changed = true;
                }
                if self.needs_expansion(&resolvent) {
                    self.expand(&resolvent)?;
                    changed = true;
                }
                i += 1;
            }
            if !changed {
                if suggestions {
                    break;
                }
                suggestions = true;
            }
        }
        Ok(())
    }

    fn decide(&mut self, resolvent: &Resolvent) -> Result<(), Interrupt> {
        let constraints = self
            .resolutions
            .get(resolvent)
            .map(|r| r.constraints.clone())
            .unwrap_or_default();
        let mut decision = match self.try_to_find_decision(resolvent, &constraints)? {
            Some(decision) => decision,
            None => self.unresolvable_decision(resolvent, &constraints)?,
        };
        decision.set_taken(constraints.is_taken());
        tracing::debug!("{}: {}", resolvent, decision);
        if let Some(resolution) = self.resolutions.get_mut(resolvent) {
            resolution.decision = Some(decision);
        }
        Ok(())
    }

    fn needs_expansion(&self, resolvent: &Resolvent) -> bool {
        let Some(resolution) = self.resolutions.get(resolvent) else {
            return false;
        };
        match &resolution.decision {
            Some(decision) if decision.taken() => {
                let key = expansion_key(decision);
                key.is_some() && key != resolution.expanded
            }
            _ => false,
        }
    }

    // ----- choosing --------------------------------------------------------

    fn try_to_find_decision(
        &mut self,
        resolvent: &Resolvent,
        constraints: &Constraints,
    ) -> Result<Option<Decision>, ResolveError> {
        let installed_here = self.installed_here(resolvent)?;
        let primary = constraints.primary();
        let preferred = constraints.preferred();

        let existing_full = installed_here
            .iter()
            .find(|c| kept_satisfies(c, &primary) && kept_satisfies(c, &preferred))
            .cloned();
        let (existing, existing_full) = match existing_full {
            Some(e) => (Some(e), true),
            None => (installed_here.iter().find(|c| kept_satisfies(c, &primary)).cloned(), false),
        };

        if resolvent.destination == DestinationKind::RemoveOnly || constraints.nothing_is_fine_too() {
            return self.decide_absence(resolvent, constraints, installed_here, existing);
        }

        let found = self.find_installable(resolvent, constraints, &installed_here)?;
        let keep = |existing: Arc<CandidateRecord>| Decision::KeepExisting {
            existing: Some(existing),
            taken: false,
        };
        let use_existing = constraints.strictest_use_existing();
        Ok(match (existing, found) {
            (None, None) => None,
            (Some(existing), None) => match use_existing {
                UseExisting::Never => None,
                _ => Some(keep(existing)),
            },
            (None, Some(found)) => Some(self.install(resolvent, found)?),
            (Some(existing), Some(found)) => {
                let keep_it = match use_existing {
                    UseExisting::Never => false,
                    UseExisting::IfSame => found.candidate.same_build(&existing),
                    UseExisting::IfSameVersion => found.candidate.same_version(&existing),
                    UseExisting::IfPossible => existing_full || !found.full,
                };
                if keep_it {
                    Some(keep(existing))
                } else {
                    Some(self.install(resolvent, found)?)
                }
            }
        })
    }

    fn install(&mut self, resolvent: &Resolvent, found: Found) -> Result<Decision, ResolveError> {
        let installed_here = self.installed_here(resolvent)?;
        let change = if resolvent.destination == DestinationKind::BinaryRepository {
            ChangeKind::New
        } else {
            ChangeKind::classify(&found.candidate, &self.installed_for(&resolvent.name)?)
        };
        if change == ChangeKind::Downgrade && self.options.downgrade == DowngradePolicy::Warning {
            self.warn(format!("{}: downgrading to {}", resolvent, found.candidate));
        }
        if !found.mask_overrides.is_empty() {
            tracing::debug!("{}: overriding masks on {}", resolvent, found.candidate);
        }
        Ok(Decision::Install {
            candidate: found.candidate,
            destination: resolvent.destination,
            change,
            replacing: installed_here,
            choice_changes: found.choice_changes,
            mask_overrides: found.mask_overrides,
            best: found.best,
            taken: false,
        })
    }

    /// Nothing has to exist: keep what is there if allowed, else replace or remove it.
    fn decide_absence(
        &mut self,
        resolvent: &Resolvent,
        constraints: &Constraints,
        installed_here: Vec<Arc<CandidateRecord>>,
        existing: Option<Arc<CandidateRecord>>,
    ) -> Result<Option<Decision>, ResolveError> {
        if installed_here.is_empty() {
            return Ok(Some(Decision::KeepExisting {
                existing: None,
                taken: false,
            }));
        }
        if let Some(existing) = existing {
            return Ok(Some(Decision::KeepExisting {
                existing: Some(existing),
                taken: false,
            }));
        }
        if resolvent.destination != DestinationKind::RemoveOnly {
            if let Some(found) = self.find_installable(resolvent, constraints, &installed_here)? {
                return Ok(Some(self.install(resolvent, found)?));
            }
        }
        if self.removal_refused(resolvent, constraints, &installed_here)?.is_none() {
            return Ok(Some(Decision::RemoveExisting {
                existing: installed_here,
                taken: false,
            }));
        }
        Ok(None)
    }

    /// `None` when the installed packages may be removed, else why not.
    fn removal_refused(
        &mut self,
        resolvent: &Resolvent,
        constraints: &Constraints,
        installed_here: &[Arc<CandidateRecord>],
    ) -> Result<Option<String>, ResolveError> {
        let primary = constraints.primary();
        let removed = Outcome::Absent { removed: true };
        if !primary.iter().all(|c| c.admits(&removed)) {
            return Ok(Some("something requires it to stay".to_string()));
        }
        let requested = primary.iter().any(|c| {
            c.is_absence()
                && (c.reason.permits_removal() || (self.options.permit_uninstall && is_blocker(&c.reason)))
        });
        if !requested {
            return Ok(Some("removing it is not permitted".to_string()));
        }
        if self.options.remove_dependents {
            return Ok(None);
        }

        let index = self.dependency_index()?;
        let mut broken: Vec<String> = Vec::new();
        for candidate in installed_here {
            for dependent in index.allowed_to_remove(candidate, installed_here, false) {
                let id = dependent.id();
                if self.removal_resolvent_for(&dependent).is_none() && !broken.contains(&id) {
                    broken.push(id);
                }
            }
        }
        if broken.is_empty() {
            Ok(None)
        } else {
            tracing::debug!("{}: removal would break {}", resolvent, broken.join(", "));
            Ok(Some(format!("removing it would break {}", broken.join(", "))))
        }
    }

    fn passes(&self) -> Vec<Pass> {
        let choices = self.options.allow_choice_changes;
        let masks = !self.options.override_masks.is_empty();
        let retries = match self.options.retry_order {
            RetryOrder::ChoicesFirst => [(choices, Pass::ChangeChoices), (masks, Pass::OverrideMasks)],
            RetryOrder::MasksFirst => [(masks, Pass::OverrideMasks), (choices, Pass::ChangeChoices)],
        };
        let mut passes = vec![Pass::AsIs];
        passes.extend(retries.into_iter().filter(|(on, _)| *on).map(|(_, pass)| pass));
        if choices && masks {
            passes.push(Pass::Both);
        }
        passes
    }

    /// The best installable candidate meeting the constraints.
    ///
    /// Each pass scans every candidate before the next one is tried, so a
    /// choice change or mask override is only used when nothing fits as-is.
    fn find_installable(
        &mut self,
        resolvent: &Resolvent,
        constraints: &Constraints,
        installed_here: &[Arc<CandidateRecord>],
    ) -> Result<Option<Found>, ResolveError> {
        if resolvent.destination == DestinationKind::RemoveOnly {
            return Ok(None);
        }
        let candidates: Vec<Arc<CandidateRecord>> = self
            .installable_for(&resolvent.name)?
            .into_iter()
            .filter(|c| resolvent.admits(c))
            .collect();
        let newest_installed = installed_here.iter().map(|c| &c.version).max().cloned();
        let best_unmasked = candidates
            .iter()
            .find(|c| self.query.is_masked(c).is_empty())
            .map(|c| c.version.clone());

        let primary = constraints.primary();
        let preferred = constraints.preferred();
        let mut everything = primary.clone();
        everything.extend(preferred.iter().copied());
        let sets: Vec<(&[&Constraint], bool)> = if preferred.is_empty() {
            vec![(primary.as_slice(), true)]
        } else {
            vec![(everything.as_slice(), true), (primary.as_slice(), false)]
        };

        for (set, full) in sets {
            for pass in self.passes() {
                for candidate in &candidates {
                    let Some((record, choice_changes, mask_overrides)) =
                        self.try_candidate(candidate, set, pass, newest_installed.as_ref())
                    else {
                        continue;
                    };
                    if !full {
                        let dropped: Vec<String> = preferred.iter().map(|c| c.to_string()).collect();
                        self.warn(format!("{}: dropping {}", resolvent, dropped.join("; ")));
                    }
                    let best = best_unmasked.as_ref().map_or(true, |v| record.version >= *v);
                    return Ok(Some(Found {
                        candidate: record,
                        choice_changes,
                        mask_overrides,
                        best,
                        full,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn try_candidate(
        &self,
        candidate: &Arc<CandidateRecord>,
        constraints: &[&Constraint],
        pass: Pass,
        newest_installed: Option<&Version>,
    ) -> Option<(Arc<CandidateRecord>, Vec<ChoiceChange>, Vec<MaskReason>)> {
        let masks = self.query.is_masked(candidate);
        if !masks.is_empty()
            && !(pass.overrides_masks() && masks.iter().all(|m| self.options.may_override(m.kind())))
        {
            return None;
        }
        if self.options.downgrade == DowngradePolicy::Error
            && newest_installed.map_or(false, |newest| candidate.version < *newest)
        {
            return None;
        }
        let (record, changes) = if pass.changes_choices() {
            apply_choice_changes(candidate, constraints)?
        } else {
            (candidate.clone(), Vec::new())
        };
        let outcome = Outcome::Present {
            candidate: &record,
            kept: false,
        };
        constraints
            .iter()
            .all(|c| c.admits(&outcome))
            .then_some((record, changes, masks))
    }

    fn unresolvable_decision(
        &mut self,
        resolvent: &Resolvent,
        constraints: &Constraints,
    ) -> Result<Decision, ResolveError> {
        let installed_here = self.installed_here(resolvent)?;
        let mut considered: Vec<Arc<CandidateRecord>> = Vec::new();
        if resolvent.destination != DestinationKind::RemoveOnly {
            considered.extend(
                self.installable_for(&resolvent.name)?
                    .into_iter()
                    .filter(|c| resolvent.admits(c)),
            );
        }
        considered.extend(installed_here.iter().cloned());

        let primary = constraints.primary();
        let choice_requirements = Constraints::choice_requirements(&primary);
        let newest_installed = installed_here.iter().map(|c| c.version.clone()).max();
        let mut diagnostic = UnresolvableDiagnostic::default();
        let mut newer_installed = false;

        for candidate in considered {
            let outcome = Outcome::Present {
                candidate: &candidate,
                kept: candidate.installed,
            };
            let mut unmet: Vec<String> = primary
                .iter()
                .filter(|c| !c.admits(&outcome))
                .map(|c| c.to_string())
                .collect();
            for requirement in &choice_requirements {
                let locked = candidate
                    .choices
                    .iter()
                    .any(|c| c.name == requirement.name && c.locked && c.enabled != requirement.enabled);
                if locked {
                    unmet.push(format!("locked choice {}", requirement.name));
                }
            }
            let masks = if candidate.installed {
                Vec::new()
            } else {
                self.query.is_masked(&candidate)
            };
            if unmet.is_empty()
                && !candidate.installed
                && self.options.downgrade == DowngradePolicy::Error
                && newest_installed.as_ref().map_or(false, |v| candidate.version < *v)
            {
                newer_installed = true;
            }
            diagnostic.unsuitable.push(UnsuitableCandidate {
                candidate,
                unmet,
                masks,
            });
        }

        if newer_installed {
            let newest = installed_here
                .first()
                .map(|c| c.id())
                .unwrap_or_else(|| resolvent.name.clone());
            diagnostic = diagnostic.with_note(format!("installed {} is newer than every fitting candidate", newest));
        }
        if constraints.nothing_is_fine_too() && !installed_here.is_empty() {
            if let Some(refusal) = self.removal_refused(resolvent, constraints, &installed_here)? {
                diagnostic = diagnostic.with_note(refusal);
            }
        }
        if constraints.strictest_use_existing() == UseExisting::Never
            && !installed_here.is_empty()
            && diagnostic.unsuitable.iter().all(|u| u.candidate.installed || !u.unmet.is_empty())
        {
            diagnostic = diagnostic.with_note("a reinstall was requested but nothing installable fits");
        }

        tracing::debug!("{}: unresolvable", resolvent);
        Ok(Decision::Unresolvable {
            diagnostic,
            taken: false,
        })
    }

    // ----- expanding -------------------------------------------------------

    fn expand(&mut self, resolvent: &Resolvent) -> Result<(), Interrupt> {
        let Some(resolution) = self.resolutions.get_mut(resolvent) else {
            return Ok(());
        };
        let Some(decision) = resolution.decision.clone() else {
            return Ok(());
        };
        resolution.expanded = expansion_key(&decision);

        match decision {
            Decision::Install { candidate, .. } => {
                self.add_dependencies(resolvent, &candidate, false)?;
                if self.options.make_binaries && resolvent.destination == DestinationKind::Filesystem {
                    self.add_via_binary(resolvent, &candidate)?;
                }
            }
            Decision::KeepExisting {
                existing: Some(existing),
                ..
            } => self.add_dependencies(resolvent, &existing, true)?,
            Decision::RemoveExisting { existing, .. } => {
                self.add_removal_consequences(resolvent, &existing)?
            }
            Decision::KeepExisting { existing: None, .. } | Decision::Unresolvable { .. } => {}
        }
        Ok(())
    }

    fn any_score(&mut self, spec: &PackageSpec) -> Result<AnyScore, ResolveError> {
        let installed = self.installed_for(&spec.name)?;
        if installed.iter().any(|c| spec.matches(c)) {
            return Ok(AnyScore::InstalledMatching);
        }
        if installed.iter().any(|c| spec.matches_ignoring_choices(c)) {
            return Ok(AnyScore::InstalledWrongChoices);
        }
        let being_installed = self.resolutions.values().any(|r| match &r.decision {
            Some(Decision::Install { candidate, taken, .. }) => *taken && spec.matches(candidate),
            _ => false,
        });
        if being_installed {
            return Ok(AnyScore::BeingInstalled);
        }
        let installable = self.installable_for(&spec.name)?;
        if installable
            .iter()
            .any(|c| spec.matches(c) && self.query.is_masked(c).is_empty())
        {
            return Ok(AnyScore::Installable);
        }
        if installable.iter().any(|c| spec.matches_ignoring_choices(c)) {
            return Ok(AnyScore::Exists);
        }
        Ok(AnyScore::Nothing)
    }

    fn already_met(&mut self, spec: &PackageSpec) -> Result<AlreadyMet, ResolveError> {
        let installed = self.installed_for(&spec.name)?;
        Ok(if installed.iter().any(|c| spec.matches(c)) {
            AlreadyMet::Yes
        } else if installed.is_empty() {
            AlreadyMet::Indeterminate
        } else {
            AlreadyMet::No
        })
    }

    fn add_dependencies(
        &mut self,
        from: &Resolvent,
        candidate: &Arc<CandidateRecord>,
        from_installed: bool,
    ) -> Result<(), Interrupt> {
        let dependencies = expander::expand(candidate, |spec| self.any_score(spec))?;
        for dependency in dependencies {
            self.add_dependency(from, candidate, from_installed, dependency)?;
        }
        Ok(())
    }

    fn add_dependency(
        &mut self,
        from: &Resolvent,
        candidate: &CandidateRecord,
        from_installed: bool,
        dependency: SanitisedDependency,
    ) -> Result<(), Interrupt> {
        let policy = self.options.deps_policy(dependency.class, from_installed);
        if policy == DepsPolicy::Discard {
            return Ok(());
        }
        let destination = match dependency.class {
            DepClass::Build => DestinationKind::Filesystem,
            _ => from.destination,
        };

        match &dependency.spec {
            DependencySpec::Package(spec) => {
                let (strength, bucket) = match (dependency.class, policy) {
                    (DepClass::Suggested, _) => match self.options.suggested {
                        SuggestedPolicy::Install => (Strength::Soft, OrderingBucket::Post),
                        _ => (Strength::Suggestion, OrderingBucket::Post),
                    },
                    (_, DepsPolicy::Pre) | (_, DepsPolicy::PreOrPost) => (Strength::Hard, OrderingBucket::Pre),
                    (_, DepsPolicy::Post) => (Strength::Hard, OrderingBucket::Post),
                    (_, DepsPolicy::TryPost) | (_, DepsPolicy::Discard) => (Strength::Soft, OrderingBucket::Post),
                };
                let already_met = self.already_met(spec)?;
                let target = self.resolvent_for(spec, destination)?;
                let bucket = match bucket {
                    OrderingBucket::Pre => self.order_pre_edge(from, &target, policy, already_met)?,
                    other => other,
                };
                match bucket {
                    OrderingBucket::Pre => {
                        self.push_edge(target.clone(), from.clone(), EdgeKind::Requires { already_met })
                    }
                    OrderingBucket::Post if strength != Strength::Suggestion => {
                        self.push_edge(from.clone(), target.clone(), EdgeKind::PostDependency)
                    }
                    _ => {}
                }

                let constraint = Constraint::new(
                    Reason::Dependency {
                        from_id: candidate.id(),
                        from_resolvent: from.clone(),
                        dependency: dependency.clone(),
                        already_met,
                        bucket,
                    },
                    Requirement::Exists(spec.clone()),
                )
                .with_strength(strength)
                .with_use_existing(self.dependency_use_existing());
                self.apply_constraint(&target, constraint)
            }
            DependencySpec::Block(block) => {
                if self.options.blocks == BlockerPolicy::Discard {
                    return Ok(());
                }
                let installed = self.installed_for(&block.blocking.name)?;
                let already_met = if installed.iter().any(|c| block.blocking.matches(c)) {
                    AlreadyMet::No
                } else {
                    AlreadyMet::Yes
                };
                let strength = if self.options.blocks == BlockerPolicy::PretendSatisfied {
                    if !already_met.is_yes() {
                        self.warn(format!("{}: pretending blocker {} is satisfied", from, block));
                    }
                    Strength::Soft
                } else {
                    Strength::Hard
                };
                let constraint = Constraint::new(
                    Reason::Blocker {
                        from_id: candidate.id(),
                        from_resolvent: from.clone(),
                        block: block.clone(),
                        already_met,
                    },
                    Requirement::Absent(block.blocking.clone()),
                )
                .with_strength(strength);
                if !self.blockers.contains(&constraint) {
                    self.blockers.push(constraint.clone());
                }

                for target in self.blocker_resolvents(&block.blocking, destination)? {
                    if target.name == from.name && target.slot == from.slot {
                        continue;
                    }
                    if block.strong {
                        self.push_edge(target.clone(), from.clone(), EdgeKind::Blocker);
                    }
                    self.apply_constraint(&target, constraint.clone())?;
                }
                Ok(())
            }
        }
    }

    /// Decide the ordering bucket of a pre edge, breaking cycles per policy.
    fn order_pre_edge(
        &mut self,
        from: &Resolvent,
        to: &Resolvent,
        policy: DepsPolicy,
        already_met: AlreadyMet,
    ) -> Result<OrderingBucket, Interrupt> {
        if from == to {
            return Ok(OrderingBucket::Unordered);
        }
        if let Some(path) = self.pre_path(to, from) {
            let mut cycle = vec![from.to_string()];
            cycle.extend(path.iter().map(ToString::to_string));
            if already_met.is_yes() {
                tracing::debug!("dropping already met edge in cycle {}", cycle.join(" -> "));
                return Ok(OrderingBucket::Unordered);
            }
            if policy == DepsPolicy::PreOrPost {
                tracing::debug!("demoting {} -> {} to post to avoid a cycle", from, to);
                return Ok(OrderingBucket::Post);
            }
            return match self.options.circular {
                CircularPolicy::Error => Err(ResolveError::CircularDependency { cycle }.into()),
                CircularPolicy::Discard => {
                    self.warn(format!("discarding ordering in cycle {}", cycle.join(" -> ")));
                    Ok(OrderingBucket::Unordered)
                }
            };
        }
        self.pre_graph.entry(from.clone()).or_default().push(to.clone());
        Ok(OrderingBucket::Pre)
    }

    /// A path of pre edges from `start` to `goal`, both ends included.
    fn pre_path(&self, start: &Resolvent, goal: &Resolvent) -> Option<Vec<Resolvent>> {
        let mut stack: Vec<(Resolvent, usize)> = vec![(start.clone(), 0)];
        let mut seen: Vec<Resolvent> = vec![start.clone()];
        while let Some((node, next)) = stack.last().cloned() {
            if &node == goal {
                return Some(stack.into_iter().map(|(r, _)| r).collect());
            }
            let children = self.pre_graph.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            match children.get(next) {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if !seen.contains(child) {
                        seen.push(child.clone());
                        stack.push((child.clone(), 0));
                    }
                }
                None => {
                    stack.pop();
                }
            }
        }
        None
    }

    fn add_via_binary(&mut self, resolvent: &Resolvent, candidate: &CandidateRecord) -> Result<(), Interrupt> {
        let sibling = resolvent.with_destination(DestinationKind::BinaryRepository);
        let mut spec = slot_spec(candidate)
            .with_version(exact_version(&candidate.version))
            .in_repository(&candidate.repository);
        for choice in &candidate.choices {
            spec = spec.with_choice(&choice.name, choice.enabled);
        }
        self.push_edge(sibling.clone(), resolvent.clone(), EdgeKind::ViaBinary);
        let constraint = Constraint::new(
            Reason::ViaBinary {
                other: resolvent.clone(),
            },
            Requirement::Exists(spec),
        );
        self.apply_constraint(&sibling, constraint)
    }

    /// The resolvent that removes `candidate`, if anything does.
    fn removal_resolvent_for(&self, candidate: &CandidateRecord) -> Option<Resolvent> {
        let id = candidate.id();
        self.resolutions
            .iter()
            .find(|(resolvent, resolution)| {
                resolvent.admits(candidate)
                    && match &resolution.decision {
                        Some(Decision::RemoveExisting { existing, .. }) => {
                            existing.iter().any(|c| c.id() == id)
                        }
                        Some(_) => false,
                        None => resolution.constraints.iter().any(|c| {
                            c.strength == Strength::Hard
                                && matches!(&c.requirement, Requirement::Absent(spec) if spec.matches(candidate))
                        }),
                    }
            })
            .map(|(resolvent, _)| resolvent.clone())
    }

    /// Order removals against each other and pull in dependents and unused
    /// dependencies when the options ask for it.
    fn add_removal_consequences(
        &mut self,
        resolvent: &Resolvent,
        existing: &[Arc<CandidateRecord>],
    ) -> Result<(), Interrupt> {
        let index = self.dependency_index()?;
        let is_existing = |c: &CandidateRecord| existing.iter().any(|e| e.id() == c.id());

        for removed in existing {
            let Some(position) = index.position(removed) else {
                continue;
            };

            let runtime_dependents = index.dependents_of(position, false);
            for dependent in index.dependents_of(position, true) {
                let candidate = index.candidate(dependent).clone();
                if is_existing(candidate.as_ref()) {
                    continue;
                }
                if let Some(target) = self.removal_resolvent_for(&candidate) {
                    self.push_edge(target, resolvent.clone(), EdgeKind::Dependent);
                } else if self.options.remove_dependents && runtime_dependents.contains(&dependent) {
                    let target = Resolvent::for_candidate(&candidate, DestinationKind::RemoveOnly);
                    self.push_edge(target.clone(), resolvent.clone(), EdgeKind::Dependent);
                    let constraint = Constraint::new(
                        Reason::Dependent {
                            on_id: removed.id(),
                            on_resolvent: resolvent.clone(),
                        },
                        Requirement::Absent(slot_spec(&candidate)),
                    );
                    self.apply_constraint(&target, constraint)?;
                }
            }

            if !self.options.remove_unused {
                continue;
            }
            for dependency in index.dependencies_of(position, true) {
                let candidate = index.candidate(dependency).clone();
                if is_existing(candidate.as_ref()) || self.is_protected(&candidate)? {
                    continue;
                }
                if let Some(target) = self.removal_resolvent_for(&candidate) {
                    self.push_edge(resolvent.clone(), target, EdgeKind::Dependent);
                    continue;
                }
                let still_used = index.dependents_of(dependency, true).into_iter().any(|user| {
                    let user = index.candidate(user);
                    !is_existing(user.as_ref()) && self.removal_resolvent_for(user).is_none()
                });
                if still_used {
                    continue;
                }
                let target = Resolvent::for_candidate(&candidate, DestinationKind::RemoveOnly);
                self.push_edge(resolvent.clone(), target.clone(), EdgeKind::Dependent);
                let constraint = Constraint::new(
                    Reason::WasUsedBy {
                        by_id: removed.id(),
                        by_resolvent: resolvent.clone(),
                    },
                    Requirement::Absent(slot_spec(&candidate)),
                )
                .with_strength(Strength::Soft);
                self.apply_constraint(&target, constraint)?;
            }
        }

        if resolvent.destination == DestinationKind::RemoveOnly {
            let sibling = resolvent.with_destination(DestinationKind::Filesystem);
            if self.resolutions.contains_key(&sibling) {
                self.apply_constraint(&sibling, like_other_destination(&sibling, resolvent))?;
            }
        }
        Ok(())
    }
}

/// Would keeping `candidate` meet every constraint in `set`?
fn kept_satisfies(candidate: &CandidateRecord, set: &[&Constraint]) -> bool {
    let outcome = Outcome::Present {
        candidate,
        kept: true,
    };
    set.iter().all(|c| c.admits(&outcome))
}

/// Does `decision` still hold with `constraint` added?
fn still_holds(decision: &Decision, constraint: &Constraint) -> bool {
    let Some(outcome) = decision.outcome() else {
        return false;
    };
    let forces_rebuild = constraint.use_existing == UseExisting::Never
        && matches!(constraint.requirement, Requirement::Exists(_))
        && matches!(decision, Decision::KeepExisting { existing: Some(_), .. });
    constraint.admits(&outcome) && !forces_rebuild
}

fn is_blocker(reason: &Reason) -> bool {
    match reason {
        Reason::Blocker { .. } => true,
        Reason::Preset {
            original: Some(original),
            ..
        } => is_blocker(original),
        _ => false,
    }
}

/// Name and slot of a candidate, nothing else.
fn slot_spec(candidate: &CandidateRecord) -> PackageSpec {
    PackageSpec::new(&candidate.name).with_slot(&candidate.slot)
}

fn exact_version(version: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![semver::Comparator {
            op: semver::Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        }],
    }
}

fn like_other_destination(resolvent: &Resolvent, other: &Resolvent) -> Constraint {
    let mut spec = PackageSpec::new(&resolvent.name);
    if let Some(slot) = resolvent.slot.as_str() {
        spec = spec.with_slot(slot);
    }
    Constraint::new(
        Reason::LikeOtherDestination {
            other: other.clone(),
        },
        Requirement::Absent(spec),
    )
}

/// Toggle unlocked choices so the candidate meets every choice requirement.
///
/// `None` if nothing needs changing, or a locked or contradictory choice is in the way.
fn apply_choice_changes(
    candidate: &Arc<CandidateRecord>,
    constraints: &[&Constraint],
) -> Option<(Arc<CandidateRecord>, Vec<ChoiceChange>)> {
    let mut record = CandidateRecord::clone(candidate);
    let mut changes: Vec<ChoiceChange> = Vec::new();
    for requirement in Constraints::choice_requirements(constraints) {
        let choice = record.choices.iter_mut().find(|c| c.name == requirement.name)?;
        if choice.enabled == requirement.enabled {
            continue;
        }
        if choice.locked || changes.iter().any(|c| c.name == requirement.name) {
            return None;
        }
        choice.enabled = requirement.enabled;
        changes.push(ChoiceChange {
            name: requirement.name.clone(),
            enabled: requirement.enabled,
        });
    }
    if changes.is_empty() {
        return None;
    }
    Some((Arc::new(record), changes))
}
