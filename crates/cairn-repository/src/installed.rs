//! The installed package database and the binary package store.
//!
//! Both are TOML files holding a list of candidate records. The merge engine
//! here only records and forgets packages; it does not copy any files.

use crate::RepositoryError;
use cairn_exec::{ExecError, InstallManifest, MergeEngine};
use cairn_types::{CandidateRecord, DestinationKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    package: Vec<CandidateRecord>,
}

/// A TOML list of candidate records on disk.
#[derive(Debug, Clone)]
pub struct PackageStore {
    path: PathBuf,
    packages: Vec<CandidateRecord>,
}

impl PackageStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        if !path.exists() {
            debug!("No package store at {}, starting empty", path.display());
            return Ok(Self {
                path,
                packages: Vec::new(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|source| RepositoryError::Read {
            path: path.clone(),
            source,
        })?;
        let file: StoreFile = toml::from_str(&content).map_err(|source| RepositoryError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            packages: file.package,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packages(&self) -> &[CandidateRecord] {
        &self.packages
    }

    /// Record `candidate`, dropping whatever occupied its slot.
    pub fn insert(&mut self, candidate: CandidateRecord) {
        self.packages
            .retain(|p| !(p.name == candidate.name && p.slot == candidate.slot));
        self.packages.push(candidate);
    }

    /// Forget the package with `id`. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|p| p.id() != id);
        self.packages.len() != before
    }

    pub fn save(&self) -> Result<(), RepositoryError> {
        let file = StoreFile {
            package: self.packages.clone(),
        };
        let content = toml::to_string_pretty(&file).map_err(|source| RepositoryError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RepositoryError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, content).map_err(|source| RepositoryError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Merge engine over the installed database and the binary store.
pub struct InstalledDatabase {
    installed: Mutex<PackageStore>,
    binaries: Mutex<PackageStore>,
}

impl InstalledDatabase {
    pub fn new(installed: PackageStore, binaries: PackageStore) -> Self {
        Self {
            installed: Mutex::new(installed),
            binaries: Mutex::new(binaries),
        }
    }

    pub fn open(installed: &Path, binaries: &Path) -> Result<Self, RepositoryError> {
        Ok(Self::new(PackageStore::load(installed)?, PackageStore::load(binaries)?))
    }

    /// A copy of the installed records.
    pub fn installed(&self) -> Vec<CandidateRecord> {
        self.installed
            .lock()
            .map(|store| store.packages().to_vec())
            .unwrap_or_default()
    }

    fn store_for(&self, destination: DestinationKind) -> &Mutex<PackageStore> {
        match destination {
            DestinationKind::BinaryRepository => &self.binaries,
            DestinationKind::Filesystem | DestinationKind::RemoveOnly => &self.installed,
        }
    }
}

fn merge_error(candidate: &CandidateRecord, message: impl ToString) -> ExecError {
    ExecError::Merge {
        candidate: candidate.id(),
        message: message.to_string(),
    }
}

impl MergeEngine for InstalledDatabase {
    fn install(
        &self,
        candidate: &CandidateRecord,
        destination: DestinationKind,
        replacing: &[Arc<CandidateRecord>],
    ) -> Result<InstallManifest, ExecError> {
        let mut store = self
            .store_for(destination)
            .lock()
            .map_err(|e| merge_error(candidate, e))?;

        for old in replacing {
            if store.remove(&old.id()) {
                debug!("Replacing {}", old);
            }
        }
        let mut record = candidate.clone();
        if destination == DestinationKind::BinaryRepository {
            record.repository = "binaries".to_string();
            record.installed = false;
        } else {
            record.installed = true;
        }
        store.insert(record);
        store.save().map_err(|e| merge_error(candidate, e))?;

        info!("Recorded {} in {}", candidate, store.path().display());
        Ok(InstallManifest {
            candidate: candidate.id(),
            paths: vec![store.path().to_path_buf()],
        })
    }

    fn uninstall(&self, candidate: &CandidateRecord) -> Result<(), ExecError> {
        let unmerge_error = |message: String| ExecError::Unmerge {
            candidate: candidate.id(),
            message,
        };
        let mut store = self
            .installed
            .lock()
            .map_err(|e| unmerge_error(e.to_string()))?;
        if !store.remove(&candidate.id()) {
            return Err(unmerge_error("not in the installed database".to_string()));
        }
        store.save().map_err(|e| unmerge_error(e.to_string()))
    }
}
