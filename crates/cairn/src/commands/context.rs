//! Everything a command needs from the environment: root, config and paths.

use super::args::ExecArgs;
use cairn_diagnostics::CairnError;
use cairn_exec::{ExecuteOptions, Executor, MirrorFetcher};
use cairn_repository::{Config, InstalledDatabase, PackageDatabase, Paths, World};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub paths: Paths,
    jobs: Option<usize>,
    quiet: bool,
}

impl Context {
    pub fn load(
        root: PathBuf,
        config_file: Option<&Path>,
        jobs: Option<usize>,
        quiet: bool,
    ) -> Result<Self, CairnError> {
        let (config, used) = Config::discover(&root, config_file)?;
        match used {
            Some(path) => debug!("Loaded config from {}", path.display()),
            None => debug!("No config file found, using defaults"),
        }
        let paths = config.paths(&root);
        Ok(Self {
            root,
            config,
            paths,
            jobs,
            quiet,
        })
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }

    pub fn database(&self) -> Result<PackageDatabase, CairnError> {
        Ok(PackageDatabase::open(&self.config, &self.root)?)
    }

    pub fn world(&self) -> Result<World, CairnError> {
        Ok(World::load(&self.paths.world)?)
    }

    /// `-j` wins over the config file; flags win over `[execute]`.
    pub fn execute_options(&self, exec: &ExecArgs) -> ExecuteOptions {
        let mut options = ExecuteOptions::default();
        if let Some(jobs) = self.jobs.or(self.config.execute.jobs) {
            options.jobs = jobs;
        }
        options.continue_on_failure = exec
            .continue_on_failure
            .unwrap_or(self.config.execute.continue_on_failure);
        options.fetch_only = exec.fetch;
        options
    }

    pub fn executor(
        &self,
        exec: &ExecArgs,
    ) -> Result<Executor<MirrorFetcher, InstalledDatabase>, CairnError> {
        let fetcher = MirrorFetcher::new(&self.paths.mirror, &self.paths.distfiles);
        let merger = InstalledDatabase::open(&self.paths.installed, &self.paths.binaries)?;
        Ok(Executor::new(fetcher, merger).with_options(self.execute_options(exec)))
    }
}
