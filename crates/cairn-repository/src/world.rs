//! The world file: one package spec per line, `#` starts a comment.

use crate::RepositoryError;
use cairn_types::PackageSpec;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct World {
    path: PathBuf,
    specs: Vec<PackageSpec>,
}

impl World {
    /// Read the world file. A missing file is an empty world.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                specs: Vec::new(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|source| RepositoryError::Read {
            path: path.clone(),
            source,
        })?;
        let specs = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(str::parse::<PackageSpec>)
            .collect::<Result<Vec<PackageSpec>, _>>()
            .map_err(|source| RepositoryError::Spec {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, specs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn specs(&self) -> &[PackageSpec] {
        &self.specs
    }

    /// Add `spec` unless the same spec is already listed. Returns whether it was added.
    pub fn add(&mut self, spec: &PackageSpec) -> bool {
        if self.specs.contains(spec) {
            return false;
        }
        debug!("Adding {} to world", spec);
        self.specs.push(spec.clone());
        true
    }

    /// Drop every entry naming `name`. Returns whether anything was dropped.
    pub fn remove_name(&mut self, name: &str) -> bool {
        let before = self.specs.len();
        self.specs.retain(|s| s.name != name);
        self.specs.len() != before
    }

    pub fn save(&self) -> Result<(), RepositoryError> {
        let mut content = String::new();
        for spec in &self.specs {
            content.push_str(&spec.to_string());
            content.push('\n');
        }
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
