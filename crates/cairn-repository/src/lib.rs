//! Package databases for Cairn.
//!
//! Loads TOML repository files, the installed database, the binary package
//! store and the world file, and answers the resolver's candidate queries
//! from them.

mod config;
mod installed;
mod source;
mod world;

pub use config::{Config, ExecuteConfig, Paths, CONFIG_FILE};
pub use installed::{InstalledDatabase, PackageStore};
pub use source::Repository;
pub use world::World;

use cairn_resolver::{CandidateFilter, CandidateQuery, ResolveError};
use cairn_types::{CandidateRecord, PackageSpec, SpecError};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("invalid package {package} in {}: {message}", path.display())]
    Invalid {
        path: PathBuf,
        package: String,
        message: String,
    },
    #[error("invalid package spec in {}: {source}", path.display())]
    Spec {
        path: PathBuf,
        #[source]
        source: SpecError,
    },
}

/// Every installable and installed package, plus package sets.
#[derive(Debug, Clone, Default)]
pub struct PackageDatabase {
    installable: IndexMap<String, Vec<Arc<CandidateRecord>>>,
    installed: IndexMap<String, Vec<Arc<CandidateRecord>>>,
    sets: IndexMap<String, Vec<PackageSpec>>,
    world: Vec<PackageSpec>,
    repositories: Vec<String>,
}

impl PackageDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load everything `config` points at under `root`.
    pub fn open(config: &Config, root: &std::path::Path) -> Result<Self, RepositoryError> {
        let paths = config.paths(root);
        let mut db = Self::new();
        for repository in Repository::load_dir(&paths.repositories, &config.accept_keywords)? {
            db.add_repository(repository);
        }
        for binary in PackageStore::load(&paths.binaries)?.packages() {
            db.add_installable(binary.clone());
        }
        db.add_installed(PackageStore::load(&paths.installed)?.packages().iter().cloned());
        db.set_world(World::load(&paths.world)?.specs().to_vec());
        debug!(
            "Package database: {} repositories, {} installable names, {} installed names",
            db.repositories.len(),
            db.installable.len(),
            db.installed.len()
        );
        Ok(db)
    }

    /// Add a repository. Sets with the same name as an earlier one are merged.
    pub fn add_repository(&mut self, repository: Repository) {
        self.repositories.push(repository.name.clone());
        for candidate in repository.candidates {
            self.add_installable(candidate);
        }
        for (name, members) in repository.sets {
            let set = self.sets.entry(name).or_default();
            for member in members {
                if !set.contains(&member) {
                    set.push(member);
                }
            }
        }
    }

    pub fn add_installable(&mut self, mut candidate: CandidateRecord) {
        candidate.installed = false;
        self.installable
            .entry(candidate.name.clone())
            .or_default()
            .push(Arc::new(candidate));
    }

    pub fn add_installed(&mut self, candidates: impl IntoIterator<Item = CandidateRecord>) {
        for mut candidate in candidates {
            candidate.installed = true;
            self.installed
                .entry(candidate.name.clone())
                .or_default()
                .push(Arc::new(candidate));
        }
    }

    pub fn set_world(&mut self, world: Vec<PackageSpec>) {
        self.world = world;
    }

    pub fn world(&self) -> &[PackageSpec] {
        &self.world
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }
}

impl CandidateQuery for PackageDatabase {
    fn candidates_for(
        &self,
        name: &str,
        filter: &CandidateFilter,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        let Some(candidates) = self.installable.get(name) else {
            return Ok(Vec::new());
        };
        Ok(candidates
            .iter()
            .filter(|c| filter.slot.as_ref().map_or(true, |s| *s == c.slot))
            .filter(|c| filter.include_masked || c.masks.is_empty())
            .cloned()
            .collect())
    }

    fn installed_candidates_for(
        &self,
        name: &str,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        Ok(self.installed.get(name).cloned().unwrap_or_default())
    }

    fn all_installed(&self) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        Ok(self.installed.values().flatten().cloned().collect())
    }

    /// `world` is the world file; every other set comes from repositories.
    fn package_set(&self, name: &str) -> Result<Option<Vec<PackageSpec>>, ResolveError> {
        if name == "world" {
            return Ok(Some(self.world.clone()));
        }
        Ok(self.sets.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_exec::MergeEngine;
    use cairn_resolver::{Decision, Resolver, Target};
    use cairn_types::DestinationKind;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_root() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "var/db/cairn/repos/core.toml",
            r#"
[[package]]
name = "zlib"
version = "1.3.0"

[[package]]
name = "curl"
version = "8.5.0"
run = ["zlib"]

[[package]]
name = "curl"
version = "8.6.0"
keyword = "~amd64"

[sets]
network = ["curl"]
"#,
        );
        write(temp_dir.path(), "var/lib/cairn/world", "curl\n");
        temp_dir
    }

    #[test]
    fn test_open_and_query() {
        let root = sample_root();
        let db = PackageDatabase::open(&Config::default(), root.path()).unwrap();

        assert_eq!(db.repositories(), &["core".to_string()]);
        assert_eq!(db.candidates_for("curl", &CandidateFilter::any()).unwrap().len(), 1);
        assert_eq!(
            db.candidates_for("curl", &CandidateFilter::any().including_masked())
                .unwrap()
                .len(),
            2
        );
        assert!(db.all_installed().unwrap().is_empty());
        assert_eq!(db.package_set("world").unwrap(), Some(vec![PackageSpec::new("curl")]));
        assert_eq!(db.package_set("network").unwrap(), Some(vec![PackageSpec::new("curl")]));
        assert_eq!(db.package_set("nope").unwrap(), None);
    }

    #[test]
    fn test_accepted_keyword_unmasks() {
        let root = sample_root();
        let config = Config {
            accept_keywords: vec!["~amd64".into()],
            ..Config::default()
        };
        let db = PackageDatabase::open(&config, root.path()).unwrap();
        assert_eq!(db.candidates_for("curl", &CandidateFilter::any()).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_and_record() {
        let root = sample_root();
        let config = Config::default();
        let paths = config.paths(root.path());
        let db = PackageDatabase::open(&config, root.path()).unwrap();

        let resolved = Resolver::new(db)
            .resolve(&[Target::Set("world".into())])
            .unwrap();
        assert_eq!(resolved.install_order(), vec!["zlib", "curl"]);

        let merger = InstalledDatabase::open(&paths.installed, &paths.binaries).unwrap();
        for resolution in resolved.changes() {
            if let Some(Decision::Install { candidate, .. }) = &resolution.decision {
                merger
                    .install(candidate, DestinationKind::Filesystem, &[])
                    .unwrap();
            }
        }

        let reopened = PackageDatabase::open(&config, root.path()).unwrap();
        let installed = reopened.installed_candidates_for("curl").unwrap();
        assert_eq!(installed[0].id(), "curl-8.5.0:0::core");
        assert!(installed[0].installed);
    }
}
