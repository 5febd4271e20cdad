//! Job execution for Cairn.
//!
//! Runs a resolved [`JobGraph`]: every fetch job first, concurrently and
//! bounded by the worker count, then install and uninstall jobs one at a time
//! in the graph's order. A failed job never aborts the run; the
//! continue-on-failure policy decides which later jobs are skipped, and
//! everything ends up in an [`ExecutionReport`].

pub mod mirror;

pub use mirror::{hash_file, MirrorFetcher};

use cairn_resolver::{Job, JobGraph, JobId, JobKind};
use cairn_types::{CandidateRecord, ContinueOnFailure, DestinationKind};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Why a fetch did not produce a usable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchFailureKind {
    Network,
    ChecksumMismatch,
    /// The artifact has to be put in place by hand
    ManualFetchRequired,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchFailureKind::Network => "network",
            FetchFailureKind::ChecksumMismatch => "checksum-mismatch",
            FetchFailureKind::ManualFetchRequired => "manual-fetch-required",
        })
    }
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to fetch {candidate} ({kind}): {message}")]
    Fetch {
        candidate: String,
        kind: FetchFailureKind,
        message: String,
    },
    #[error("failed to merge {candidate}: {message}")]
    Merge { candidate: String, message: String },
    #[error("failed to unmerge {candidate}: {message}")]
    Unmerge { candidate: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(String),
    #[error("{job} was ordered before its requirement {requirement}")]
    OutOfOrder { job: String, requirement: JobId },
    #[error("execution was cancelled")]
    Cancelled,
}

impl ExecError {
    pub fn fetch(candidate: &CandidateRecord, kind: FetchFailureKind, message: impl Into<String>) -> Self {
        ExecError::Fetch {
            candidate: candidate.id(),
            kind,
            message: message.into(),
        }
    }

    pub fn fetch_kind(&self) -> Option<FetchFailureKind> {
        match self {
            ExecError::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Gets a candidate's distfiles in place. Called from blocking worker threads.
pub trait FetchEngine: Send + Sync + 'static {
    fn fetch(&self, candidate: &CandidateRecord) -> Result<(), ExecError>;
}

/// Installs and removes packages. Called from a blocking worker thread, one
/// job at a time.
pub trait MergeEngine: Send + Sync + 'static {
    /// Install `candidate`, replacing the installed packages in `replacing`.
    fn install(
        &self,
        candidate: &CandidateRecord,
        destination: DestinationKind,
        replacing: &[Arc<CandidateRecord>],
    ) -> Result<InstallManifest, ExecError>;

    fn uninstall(&self, candidate: &CandidateRecord) -> Result<(), ExecError>;
}

/// What a merge recorded on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallManifest {
    pub candidate: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Concurrent fetch workers
    pub jobs: usize,
    pub continue_on_failure: ContinueOnFailure,
    /// Stop once every fetch job has run
    pub fetch_only: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        Self {
            jobs,
            continue_on_failure: ContinueOnFailure::Never,
            fetch_only: false,
        }
    }
}

/// Progress notifications, keyed by the job's description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Started,
    Succeeded,
    Failed(String),
    Skipped,
}

#[derive(Debug)]
pub enum JobOutcome {
    Succeeded,
    Failed(ExecError),
    /// Not run because `because` failed or was itself skipped
    Skipped { because: JobId },
}

impl JobOutcome {
    fn broken(&self) -> bool {
        !matches!(self, JobOutcome::Succeeded)
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub id: JobId,
    pub description: String,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs: {} succeeded, {} failed, {} skipped",
            self.total, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Per-job outcomes in the order the jobs settled.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub jobs: Vec<JobReport>,
    pub manifests: Vec<InstallManifest>,
}

impl ExecutionReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            total: self.jobs.len(),
            ..Summary::default()
        };
        for job in &self.jobs {
            match job.outcome {
                JobOutcome::Succeeded => summary.succeeded += 1,
                JobOutcome::Failed(_) => summary.failed += 1,
                JobOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    /// No job failed or was skipped.
    pub fn success(&self) -> bool {
        self.jobs.iter().all(|job| !job.outcome.broken())
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> + '_ {
        self.jobs
            .iter()
            .filter(|job| matches!(job.outcome, JobOutcome::Failed(_)))
    }

    pub fn outcome(&self, id: JobId) -> Option<&JobOutcome> {
        self.jobs.iter().find(|job| job.id == id).map(|job| &job.outcome)
    }
}

/// Runs job graphs against a fetch engine and a merge engine.
pub struct Executor<F, M> {
    fetcher: Arc<F>,
    merger: Arc<M>,
    options: ExecuteOptions,
}

impl<F: FetchEngine, M: MergeEngine> Executor<F, M> {
    pub fn new(fetcher: F, merger: M) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            merger: Arc::new(merger),
            options: ExecuteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    pub fn merger(&self) -> &M {
        &self.merger
    }

    /// Run every job in `graph`. Job failures land in the report.
    pub async fn execute<P>(&self, graph: &JobGraph, on_progress: P) -> ExecutionReport
    where
        P: FnMut(&str, JobStatus) + Send,
    {
        let progress = Mutex::new(on_progress);
        let mut report = ExecutionReport::default();
        let mut broken: HashSet<JobId> = HashSet::new();
        // jobs with an outcome of any kind
        let mut settled: HashSet<JobId> = HashSet::new();
        let mut first_failure: Option<JobId> = None;

        let fetches: Vec<&Job> = graph.ordered().filter(|job| job.is_fetch()).collect();
        if !fetches.is_empty() {
            info!(
                "Fetching for {} jobs with {} workers",
                fetches.len(),
                self.options.jobs.max(1)
            );
        }
        for (job, result) in self.run_fetches(fetches, &progress).await {
            let outcome = match result {
                Ok(()) => JobOutcome::Succeeded,
                Err(e) => {
                    warn!("{} failed: {}", job, e);
                    first_failure.get_or_insert(job.id);
                    broken.insert(job.id);
                    JobOutcome::Failed(e)
                }
            };
            settled.insert(job.id);
            report.jobs.push(JobReport {
                id: job.id,
                description: job.to_string(),
                outcome,
            });
        }

        if self.options.fetch_only {
            info!("Fetch-only run finished: {}", report.summary());
            return report;
        }

        for job in graph.ordered().filter(|job| !job.is_fetch()) {
            let label = job.to_string();
            settled.insert(job.id);
            if let Some(requirement) = unsettled_requirement(job, &settled) {
                let e = ExecError::OutOfOrder {
                    job: label.clone(),
                    requirement,
                };
                warn!("{}", e);
                notify(&progress, &label, JobStatus::Failed(e.to_string()));
                first_failure.get_or_insert(job.id);
                broken.insert(job.id);
                report.jobs.push(JobReport {
                    id: job.id,
                    description: label,
                    outcome: JobOutcome::Failed(e),
                });
                continue;
            }
            if let Some(because) = self.should_skip(job, &broken, first_failure) {
                debug!("Skipping {} because {} did not succeed", label, because);
                notify(&progress, &label, JobStatus::Skipped);
                broken.insert(job.id);
                report.jobs.push(JobReport {
                    id: job.id,
                    description: label,
                    outcome: JobOutcome::Skipped { because },
                });
                continue;
            }

            notify(&progress, &label, JobStatus::Started);
            let outcome = match self.merge(job).await {
                Ok(manifest) => {
                    notify(&progress, &label, JobStatus::Succeeded);
                    report.manifests.extend(manifest);
                    JobOutcome::Succeeded
                }
                Err(e) => {
                    warn!("{} failed: {}", label, e);
                    notify(&progress, &label, JobStatus::Failed(e.to_string()));
                    first_failure.get_or_insert(job.id);
                    broken.insert(job.id);
                    JobOutcome::Failed(e)
                }
            };
            report.jobs.push(JobReport {
                id: job.id,
                description: label,
                outcome,
            });
        }

        info!("Execution finished: {}", report.summary());
        report
    }

    /// Run fetch jobs concurrently; the semaphore caps the worker count.
    async fn run_fetches<'g, P>(
        &self,
        fetches: Vec<&'g Job>,
        progress: &Mutex<P>,
    ) -> Vec<(&'g Job, Result<(), ExecError>)>
    where
        P: FnMut(&str, JobStatus) + Send,
    {
        use futures::future::join_all;

        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));

        let tasks: Vec<_> = fetches
            .into_iter()
            .map(|job| {
                let sem = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&self.fetcher);

                async move {
                    let label = job.to_string();
                    let Ok(_permit) = sem.acquire().await else {
                        return (job, Err(ExecError::Cancelled));
                    };
                    notify(progress, &label, JobStatus::Started);

                    let result = match &job.kind {
                        JobKind::Fetch { candidate } => {
                            let candidate = Arc::clone(candidate);
                            run_blocking(move || fetcher.fetch(&candidate)).await
                        }
                        _ => Ok(()),
                    };

                    match &result {
                        Ok(()) => notify(progress, &label, JobStatus::Succeeded),
                        Err(e) => notify(progress, &label, JobStatus::Failed(e.to_string())),
                    }
                    (job, result)
                }
            })
            .collect();

        join_all(tasks).await
    }

    async fn merge(&self, job: &Job) -> Result<Option<InstallManifest>, ExecError> {
        let merger = Arc::clone(&self.merger);
        match &job.kind {
            JobKind::Install {
                candidate,
                destination,
                replacing,
            } => {
                info!("Installing {} to {}", candidate, destination);
                let candidate = Arc::clone(candidate);
                let destination = *destination;
                let replacing = replacing.clone();
                run_blocking(move || merger.install(&candidate, destination, &replacing))
                    .await
                    .map(Some)
            }
            JobKind::Uninstall { removing } => {
                let removing = removing.clone();
                run_blocking(move || {
                    for candidate in &removing {
                        info!("Uninstalling {}", candidate);
                        merger.uninstall(candidate)?;
                    }
                    Ok(None)
                })
                .await
            }
            JobKind::Fetch { .. } => Ok(None),
        }
    }

    /// The requirement whose failure stops `job`, if the policy says so.
    fn should_skip(
        &self,
        job: &Job,
        broken: &HashSet<JobId>,
        first_failure: Option<JobId>,
    ) -> Option<JobId> {
        let policy = match (self.options.continue_on_failure, self.options.fetch_only) {
            (ContinueOnFailure::IfFetchOnly, true) => ContinueOnFailure::IfIndependent,
            (ContinueOnFailure::IfFetchOnly, false) => ContinueOnFailure::Never,
            (policy, _) => policy,
        };
        if policy == ContinueOnFailure::Never {
            return first_failure;
        }

        job.requirements
            .iter()
            .filter(|requirement| broken.contains(&requirement.job))
            .find(|requirement| {
                let flags = requirement.required_if;
                match policy {
                    ContinueOnFailure::IfSatisfied => flags.satisfied || flags.always,
                    ContinueOnFailure::IfIndependent => flags.independent || flags.always,
                    _ => flags.always,
                }
            })
            .map(|requirement| requirement.job)
    }
}

/// A requirement of `job` that has not settled yet. The graph order rules
/// this out, so running `job` anyway would be a bug.
fn unsettled_requirement(job: &Job, settled: &HashSet<JobId>) -> Option<JobId> {
    job.requirements
        .iter()
        .map(|requirement| requirement.job)
        .find(|requirement| !settled.contains(requirement))
}

fn notify<P>(progress: &Mutex<P>, label: &str, status: JobStatus)
where
    P: FnMut(&str, JobStatus),
{
    if let Ok(mut cb) = progress.lock() {
        cb(label, status);
    }
}

async fn run_blocking<T, W>(work: W) -> Result<T, ExecError>
where
    W: FnOnce() -> Result<T, ExecError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ExecError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_resolver::{MemoryRepository, Resolver, Target};
    use cairn_types::{DepTree, PackageSpec, Version};

    #[derive(Default)]
    struct RecordingMerger {
        fail: Vec<String>,
        log: Mutex<Vec<String>>,
    }

    impl RecordingMerger {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|s| s.to_string()).collect(),
                log: Mutex::new(Vec::new()),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl MergeEngine for RecordingMerger {
        fn install(
            &self,
            candidate: &CandidateRecord,
            _destination: DestinationKind,
            _replacing: &[Arc<CandidateRecord>],
        ) -> Result<InstallManifest, ExecError> {
            if self.fail.contains(&candidate.name) {
                return Err(ExecError::Merge {
                    candidate: candidate.id(),
                    message: "build failed".into(),
                });
            }
            self.log.lock().unwrap().push(format!("install {}", candidate.name));
            Ok(InstallManifest {
                candidate: candidate.id(),
                paths: vec![PathBuf::from(format!("/usr/bin/{}", candidate.name))],
            })
        }

        fn uninstall(&self, candidate: &CandidateRecord) -> Result<(), ExecError> {
            self.log.lock().unwrap().push(format!("uninstall {}", candidate.name));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        missing: Vec<String>,
    }

    impl FetchEngine for FakeFetcher {
        fn fetch(&self, candidate: &CandidateRecord) -> Result<(), ExecError> {
            if self.missing.contains(&candidate.name) {
                return Err(ExecError::fetch(
                    candidate,
                    FetchFailureKind::ManualFetchRequired,
                    "not on the mirror",
                ));
            }
            Ok(())
        }
    }

    fn pkg(name: &str, run: &[&str]) -> CandidateRecord {
        CandidateRecord::new(name, Version::new(1, 0, 0))
            .with_run(DepTree::all(run.iter().map(|s| DepTree::named(*s)).collect()))
    }

    /// `app` needs `lib`; `other` stands alone.
    fn graph(with_distfiles: bool) -> JobGraph {
        let mut repo = MemoryRepository::new();
        for (name, deps) in [("app", vec!["lib"]), ("lib", vec![]), ("other", vec![])] {
            let mut candidate = pkg(name, &deps);
            if with_distfiles {
                candidate = candidate.with_distfile(format!("{name}-1.0.0.tar"), None);
            }
            repo.add_package(candidate);
        }
        let resolved = Resolver::new(repo)
            .resolve(&[
                Target::Package(PackageSpec::new("app")),
                Target::Package(PackageSpec::new("other")),
            ])
            .unwrap();
        resolved.jobs().clone()
    }

    fn outcome<'r>(report: &'r ExecutionReport, description: &str) -> &'r JobOutcome {
        &report
            .jobs
            .iter()
            .find(|job| job.description.starts_with(description))
            .unwrap_or_else(|| panic!("no job for {description}"))
            .outcome
    }

    fn options(policy: ContinueOnFailure) -> ExecuteOptions {
        ExecuteOptions {
            jobs: 2,
            continue_on_failure: policy,
            fetch_only: false,
        }
    }

    #[tokio::test]
    async fn test_runs_jobs_in_order() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::default());
        let report = executor.execute(&graph(false), |_, _| {}).await;

        assert!(report.success());
        assert_eq!(executor.merger().log(), vec!["install lib", "install app", "install other"]);
        assert_eq!(report.manifests.len(), 3);
        assert_eq!(
            report.summary(),
            Summary {
                total: 3,
                succeeded: 3,
                failed: 0,
                skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_never_skips_everything_after_failure() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::Never));
        let report = executor.execute(&graph(false), |_, _| {}).await;

        assert!(matches!(outcome(&report, "install lib"), JobOutcome::Failed(_)));
        assert!(matches!(outcome(&report, "install app"), JobOutcome::Skipped { .. }));
        assert!(matches!(outcome(&report, "install other"), JobOutcome::Skipped { .. }));
        assert!(executor.merger().log().is_empty());
    }

    #[tokio::test]
    async fn test_if_independent_runs_unrelated_jobs() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::IfIndependent));
        let report = executor.execute(&graph(false), |_, _| {}).await;

        assert!(matches!(outcome(&report, "install app"), JobOutcome::Skipped { .. }));
        assert!(matches!(outcome(&report, "install other"), JobOutcome::Succeeded));
        assert_eq!(report.summary().failed, 1);
        assert_eq!(report.summary().skipped, 1);
    }

    #[tokio::test]
    async fn test_always_only_honours_hard_requirements() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::Always));
        let report = executor.execute(&graph(false), |_, _| {}).await;

        assert!(matches!(outcome(&report, "install app"), JobOutcome::Succeeded));
        assert!(matches!(outcome(&report, "install other"), JobOutcome::Succeeded));
    }

    /// `lib` is already installed and reinstalled as a target, so `app` only
    /// needs it when run on its own.
    fn reinstall_graph() -> JobGraph {
        let mut repo = MemoryRepository::new();
        repo.add_package(pkg("app", &["lib"]));
        repo.add_package(pkg("lib", &[]));
        repo.add_installed(pkg("lib", &[]));
        let resolved = Resolver::new(repo)
            .resolve(&[
                Target::Package(PackageSpec::new("lib")),
                Target::Package(PackageSpec::new("app")),
            ])
            .unwrap();
        resolved.jobs().clone()
    }

    #[tokio::test]
    async fn test_if_satisfied_ignores_already_met_requirements() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::IfSatisfied));
        let report = executor.execute(&reinstall_graph(), |_, _| {}).await;
        assert!(matches!(outcome(&report, "install lib"), JobOutcome::Failed(_)));
        assert!(matches!(outcome(&report, "install app"), JobOutcome::Succeeded));

        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::IfIndependent));
        let report = executor.execute(&reinstall_graph(), |_, _| {}).await;
        assert!(matches!(outcome(&report, "install app"), JobOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_if_satisfied_skips_unmet_requirements() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::failing(&["lib"]))
            .with_options(options(ContinueOnFailure::IfSatisfied));
        let report = executor.execute(&graph(false), |_, _| {}).await;

        assert!(matches!(outcome(&report, "install app"), JobOutcome::Skipped { .. }));
        assert!(matches!(outcome(&report, "install other"), JobOutcome::Succeeded));
    }

    #[test]
    fn test_unsettled_requirement() {
        let graph = graph(false);
        let app = graph
            .ordered()
            .find(|job| job.to_string().starts_with("install app"))
            .unwrap();
        let lib = app.requirements[0].job;

        assert_eq!(unsettled_requirement(app, &HashSet::new()), Some(lib));
        assert_eq!(unsettled_requirement(app, &HashSet::from([lib])), None);
        let err = ExecError::OutOfOrder {
            job: app.to_string(),
            requirement: lib,
        };
        assert!(err.to_string().contains("before its requirement"));
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_its_install() {
        let fetcher = FakeFetcher {
            missing: vec!["other".into()],
        };
        let executor = Executor::new(fetcher, RecordingMerger::default())
            .with_options(options(ContinueOnFailure::Always));
        let report = executor.execute(&graph(true), |_, _| {}).await;

        match outcome(&report, "fetch other") {
            JobOutcome::Failed(e) => {
                assert_eq!(e.fetch_kind(), Some(FetchFailureKind::ManualFetchRequired))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(outcome(&report, "install other"), JobOutcome::Skipped { .. }));
        assert_eq!(executor.merger().log(), vec!["install lib", "install app"]);
    }

    #[tokio::test]
    async fn test_fetch_only_stops_after_fetches() {
        let executor = Executor::new(FakeFetcher::default(), RecordingMerger::default()).with_options(
            ExecuteOptions {
                fetch_only: true,
                ..options(ContinueOnFailure::IfFetchOnly)
            },
        );
        let mut seen = Vec::new();
        let report = executor
            .execute(&graph(true), |label, status| {
                if status == JobStatus::Succeeded {
                    seen.push(label.to_string());
                }
            })
            .await;

        assert_eq!(report.summary().total, 3);
        assert!(report.jobs.iter().all(|job| job.description.starts_with("fetch")));
        assert!(executor.merger().log().is_empty());
        assert_eq!(seen.len(), 3);
    }
}
