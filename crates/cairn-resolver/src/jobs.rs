//! Turning decisions into an ordered job graph.

use crate::constraint::Requirement;
use crate::decider::Resolution;
use crate::decision::Decision;
use crate::error::ResolveError;
use crate::reason::AlreadyMet;
use crate::resolvent::Resolvent;
use cairn_types::{CandidateRecord, DestinationKind, PackageSpec};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An ordering relation discovered while deciding: `before`'s job has to
/// finish before `after`'s job may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingEdge {
    pub before: Resolvent,
    pub after: Resolvent,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// A pre-dependency of `after`
    Requires { already_met: AlreadyMet },
    /// `after` is a post-dependency of `before`; only a placement hint
    PostDependency,
    /// `after` holds a strong blocker on `before`
    Blocker,
    /// `after` is installed from the binary package `before` builds
    ViaBinary,
    /// `before` depends on `after`, and both are being removed
    Dependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// When a failed requirement stops the job that has it.
///
/// The executor's continue-on-failure policy picks which flag it looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RequiredIf {
    /// Needed for the job's dependencies to be satisfied
    pub satisfied: bool,
    /// Needed even if the job is run on its own
    pub independent: bool,
    /// Needed under every policy
    pub always: bool,
}

impl RequiredIf {
    pub const ALL: RequiredIf = RequiredIf {
        satisfied: true,
        independent: true,
        always: true,
    };

    fn merge(&mut self, other: RequiredIf) {
        self.satisfied |= other.satisfied;
        self.independent |= other.independent;
        self.always |= other.always;
    }
}

impl fmt::Display for RequiredIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.satisfied {
            flags.push("satisfied");
        }
        if self.independent {
            flags.push("independent");
        }
        if self.always {
            flags.push("always");
        }
        write!(f, "{}", flags.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRequirement {
    pub job: JobId,
    pub required_if: RequiredIf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Fetch {
        candidate: Arc<CandidateRecord>,
    },
    Install {
        candidate: Arc<CandidateRecord>,
        destination: DestinationKind,
        /// Installed packages in the same slot that go away
        replacing: Vec<Arc<CandidateRecord>>,
    },
    Uninstall {
        removing: Vec<Arc<CandidateRecord>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub resolvent: Resolvent,
    /// Specs of the constraints that led here
    pub origins: Vec<PackageSpec>,
    pub requirements: Vec<JobRequirement>,
}

impl Job {
    pub fn is_fetch(&self) -> bool {
        matches!(self.kind, JobKind::Fetch { .. })
    }

    fn require(&mut self, job: JobId, required_if: RequiredIf) {
        if job == self.id {
            return;
        }
        match self.requirements.iter_mut().find(|r| r.job == job) {
            Some(existing) => existing.required_if.merge(required_if),
            None => self.requirements.push(JobRequirement { job, required_if }),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            JobKind::Fetch { candidate } => write!(f, "fetch {}", candidate),
            JobKind::Install {
                candidate,
                destination,
                ..
            } => write!(f, "install {} to {}", candidate, destination),
            JobKind::Uninstall { removing } => {
                let ids: Vec<String> = removing.iter().map(|c| c.id()).collect();
                write!(f, "uninstall {}", ids.join(", "))
            }
        }
    }
}

/// Jobs plus the order to run them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobGraph {
    jobs: Vec<Job>,
    order: Vec<JobId>,
}

impl JobGraph {
    /// Build jobs for every taken decision, then linearise them.
    pub fn build(
        resolutions: &IndexMap<Resolvent, Resolution>,
        edges: &[OrderingEdge],
    ) -> Result<Self, ResolveError> {
        let mut jobs: Vec<Job> = Vec::new();
        let mut primary: HashMap<&Resolvent, JobId> = HashMap::new();
        let mut removed_by: HashMap<String, JobId> = HashMap::new();

        for (resolvent, resolution) in resolutions {
            let Some(decision) = resolution.decision.as_ref().filter(|d| d.taken()) else {
                continue;
            };
            let origins = origins(resolution);
            match decision {
                Decision::Install {
                    candidate,
                    destination,
                    replacing,
                    ..
                } => {
                    let fetch = if candidate.needs_fetch() {
                        let id = JobId(jobs.len());
                        jobs.push(Job {
                            id,
                            kind: JobKind::Fetch {
                                candidate: candidate.clone(),
                            },
                            resolvent: resolvent.clone(),
                            origins: origins.clone(),
                            requirements: Vec::new(),
                        });
                        Some(id)
                    } else {
                        None
                    };

                    let id = JobId(jobs.len());
                    let mut job = Job {
                        id,
                        kind: JobKind::Install {
                            candidate: candidate.clone(),
                            destination: *destination,
                            replacing: replacing.clone(),
                        },
                        resolvent: resolvent.clone(),
                        origins,
                        requirements: Vec::new(),
                    };
                    if let Some(fetch) = fetch {
                        job.require(fetch, RequiredIf::ALL);
                    }
                    jobs.push(job);
                    primary.insert(resolvent, id);
                }
                Decision::RemoveExisting { existing, .. } => {
                    if superseded(resolutions, resolvent) {
                        continue;
                    }
                    // the same packages removed for another destination share one job
                    if let Some(&shared) = existing.first().and_then(|c| removed_by.get(&c.id())) {
                        primary.insert(resolvent, shared);
                        continue;
                    }
                    let id = JobId(jobs.len());
                    for candidate in existing {
                        removed_by.insert(candidate.id(), id);
                    }
                    jobs.push(Job {
                        id,
                        kind: JobKind::Uninstall {
                            removing: existing.clone(),
                        },
                        resolvent: resolvent.clone(),
                        origins,
                        requirements: Vec::new(),
                    });
                    primary.insert(resolvent, id);
                }
                Decision::KeepExisting { .. } | Decision::Unresolvable { .. } => {}
            }
        }

        let mut post_hints: HashMap<JobId, Vec<JobId>> = HashMap::new();
        for edge in edges {
            let (Some(&before), Some(&after)) = (primary.get(&edge.before), primary.get(&edge.after))
            else {
                continue;
            };
            let required_if = match edge.kind {
                EdgeKind::Requires { already_met } => RequiredIf {
                    satisfied: !already_met.is_yes(),
                    independent: true,
                    always: false,
                },
                EdgeKind::Blocker | EdgeKind::ViaBinary => RequiredIf {
                    always: true,
                    ..RequiredIf::default()
                },
                EdgeKind::Dependent => RequiredIf {
                    satisfied: true,
                    ..RequiredIf::default()
                },
                EdgeKind::PostDependency => {
                    post_hints.entry(before).or_default().push(after);
                    continue;
                }
            };
            jobs[after.0].require(before, required_if);
        }

        check_acyclic(&jobs)?;
        let order = linearise(&jobs, &post_hints);
        if let Some((job, requirement)) = misordered(&jobs, &order) {
            return Err(ResolveError::RequirementCycle {
                cycle: vec![jobs[job.0].to_string(), jobs[requirement.0].to_string()],
            });
        }
        Ok(Self { jobs, order })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id.0)
    }

    /// Job ids in execution order.
    pub fn order(&self) -> &[JobId] {
        &self.order
    }

    /// Jobs in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().map(move |id| &self.jobs[id.0])
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn origins(resolution: &Resolution) -> Vec<PackageSpec> {
    let mut specs: Vec<PackageSpec> = Vec::new();
    for constraint in &resolution.constraints {
        let spec = match &constraint.requirement {
            Requirement::Exists(spec) | Requirement::Absent(spec) => spec,
            Requirement::UseExisting => continue,
        };
        if !specs.contains(spec) {
            specs.push(spec.clone());
        }
    }
    specs
}

/// A removal whose slot is being reinstalled anyway.
fn superseded(resolutions: &IndexMap<Resolvent, Resolution>, resolvent: &Resolvent) -> bool {
    resolutions.iter().any(|(other, resolution)| {
        other != resolvent
            && other.name == resolvent.name
            && other.slot == resolvent.slot
            && other.destination != DestinationKind::BinaryRepository
            && matches!(
                resolution.decision,
                Some(Decision::Install { taken: true, .. })
            )
    })
}

fn check_acyclic(jobs: &[Job]) -> Result<(), ResolveError> {
    fn visit(jobs: &[Job], id: usize, marks: &mut [Mark], stack: &mut Vec<usize>) -> Result<(), ResolveError> {
        match marks[id] {
            Mark::Emitted => return Ok(()),
            Mark::Active => {
                let start = stack.iter().position(|&s| s == id).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|&s| jobs[s].to_string()).collect();
                cycle.push(jobs[id].to_string());
                return Err(ResolveError::RequirementCycle { cycle });
            }
            Mark::New => {}
        }
        marks[id] = Mark::Active;
        stack.push(id);
        for requirement in &jobs[id].requirements {
            visit(jobs, requirement.job.0, marks, stack)?;
        }
        stack.pop();
        marks[id] = Mark::Emitted;
        Ok(())
    }

    let mut marks = vec![Mark::New; jobs.len()];
    let mut stack = Vec::new();
    for id in 0..jobs.len() {
        visit(jobs, id, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Emitted,
}

/// Post-order DFS from jobs in creation order, requirements in declared order.
///
/// A post-dependency hint is visited right after the job that hints it, unless
/// one of its requirements is still waiting on the DFS stack. Such a hint is
/// deferred and retried after every later emission.
struct Lineariser<'a> {
    jobs: &'a [Job],
    post_hints: &'a HashMap<JobId, Vec<JobId>>,
    marks: Vec<Mark>,
    deferred: Vec<JobId>,
    order: Vec<JobId>,
}

impl<'a> Lineariser<'a> {
    fn new(jobs: &'a [Job], post_hints: &'a HashMap<JobId, Vec<JobId>>) -> Self {
        Self {
            jobs,
            post_hints,
            marks: vec![Mark::New; jobs.len()],
            deferred: Vec::new(),
            order: Vec::with_capacity(jobs.len()),
        }
    }

    fn run(mut self) -> Vec<JobId> {
        for job in self.jobs {
            self.visit(job.id);
        }
        self.order
    }

    fn visit(&mut self, id: JobId) {
        if self.marks[id.0] != Mark::New {
            return;
        }
        let (jobs, post_hints) = (self.jobs, self.post_hints);
        self.marks[id.0] = Mark::Active;
        for requirement in &jobs[id.0].requirements {
            self.visit(requirement.job);
        }
        self.marks[id.0] = Mark::Emitted;
        self.order.push(id);

        if let Some(hints) = post_hints.get(&id) {
            for &hint in hints {
                self.visit_hint(hint);
            }
        }
        let pending = std::mem::take(&mut self.deferred);
        for hint in pending {
            self.visit_hint(hint);
        }
    }

    fn visit_hint(&mut self, id: JobId) {
        if self.marks[id.0] != Mark::New {
            return;
        }
        let mut checked = vec![false; self.jobs.len()];
        if self.waits_on_stack(id, &mut checked) {
            if !self.deferred.contains(&id) {
                self.deferred.push(id);
            }
        } else {
            self.visit(id);
        }
    }

    /// Whether `id` needs, directly or not, a job that is not emitted yet but
    /// already on the DFS stack.
    fn waits_on_stack(&self, id: JobId, checked: &mut [bool]) -> bool {
        if checked[id.0] {
            return false;
        }
        checked[id.0] = true;
        match self.marks[id.0] {
            Mark::Active => true,
            Mark::Emitted => false,
            Mark::New => self.jobs[id.0]
                .requirements
                .iter()
                .any(|requirement| self.waits_on_stack(requirement.job, checked)),
        }
    }
}

fn linearise(jobs: &[Job], post_hints: &HashMap<JobId, Vec<JobId>>) -> Vec<JobId> {
    Lineariser::new(jobs, post_hints).run()
}

/// The first requirement of a job in `order` that comes after the job itself.
fn misordered(jobs: &[Job], order: &[JobId]) -> Option<(JobId, JobId)> {
    let mut position = vec![usize::MAX; jobs.len()];
    for (i, id) in order.iter().enumerate() {
        position[id.0] = i;
    }
    order.iter().find_map(|&id| {
        jobs[id.0]
            .requirements
            .iter()
            .find(|requirement| position[requirement.job.0] > position[id.0])
            .map(|requirement| (id, requirement.job))
    })
}
