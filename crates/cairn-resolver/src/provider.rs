//! The candidate query seam between the resolver and package databases.

use crate::error::ResolveError;
use cairn_types::{CandidateRecord, MaskReason, PackageSpec};
use indexmap::IndexMap;
use std::sync::Arc;

/// Restricts which candidates [`CandidateQuery::candidates_for`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Only candidates in this slot
    pub slot: Option<String>,
    /// Also return masked candidates
    pub include_masked: bool,
}

impl CandidateFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn in_slot(slot: impl Into<String>) -> Self {
        Self {
            slot: Some(slot.into()),
            include_masked: false,
        }
    }

    pub fn including_masked(mut self) -> Self {
        self.include_masked = true;
        self
    }
}

/// Supplies candidate records to the resolver.
///
/// Implemented by repository backends. Queries may be issued repeatedly and
/// from several threads at once, so implementations must be read-only or
/// synchronise their own caches.
pub trait CandidateQuery: Send + Sync {
    /// Installable candidates of a package that pass `filter`, in any order.
    fn candidates_for(
        &self,
        name: &str,
        filter: &CandidateFilter,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError>;

    /// Installed candidates of a package.
    fn installed_candidates_for(&self, name: &str)
        -> Result<Vec<Arc<CandidateRecord>>, ResolveError>;

    /// Mask reasons for a candidate, including any the backend imposes by policy.
    fn is_masked(&self, candidate: &CandidateRecord) -> Vec<MaskReason> {
        candidate.masks.clone()
    }

    /// Every installed package.
    fn all_installed(&self) -> Result<Vec<Arc<CandidateRecord>>, ResolveError>;

    /// Members of a named package set, or `None` if there is no such set.
    fn package_set(&self, _name: &str) -> Result<Option<Vec<PackageSpec>>, ResolveError> {
        Ok(None)
    }
}

impl<Q: CandidateQuery> CandidateQuery for &Q {
    fn candidates_for(
        &self,
        name: &str,
        filter: &CandidateFilter,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        (*self).candidates_for(name, filter)
    }

    fn installed_candidates_for(
        &self,
        name: &str,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        (*self).installed_candidates_for(name)
    }

    fn is_masked(&self, candidate: &CandidateRecord) -> Vec<MaskReason> {
        (*self).is_masked(candidate)
    }

    fn all_installed(&self) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        (*self).all_installed()
    }

    fn package_set(&self, name: &str) -> Result<Option<Vec<PackageSpec>>, ResolveError> {
        (*self).package_set(name)
    }
}

/// A simple in-memory package database, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    installable: IndexMap<String, Vec<Arc<CandidateRecord>>>,
    installed: IndexMap<String, Vec<Arc<CandidateRecord>>>,
    sets: IndexMap<String, Vec<PackageSpec>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an installable candidate.
    pub fn add_package(&mut self, mut candidate: CandidateRecord) {
        candidate.installed = false;
        self.installable
            .entry(candidate.name.clone())
            .or_default()
            .push(Arc::new(candidate));
    }

    /// Add an installed package.
    pub fn add_installed(&mut self, mut candidate: CandidateRecord) {
        candidate.installed = true;
        self.installed
            .entry(candidate.name.clone())
            .or_default()
            .push(Arc::new(candidate));
    }

    pub fn add_set(&mut self, name: impl Into<String>, members: Vec<PackageSpec>) {
        self.sets.insert(name.into(), members);
    }
}

impl CandidateQuery for MemoryRepository {
    fn candidates_for(
        &self,
        name: &str,
        filter: &CandidateFilter,
    ) -> Result<Vec<Arc<CandidateRecord>>, ResolveError> {
        Ok(self
            .installable
            .get(name)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|c| filter.slot.as_ref().map_or(true, |s| *s == c.slot))
                    .filter(|c| filter.include_masked || self.is_masked(c).is_empty())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
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

    fn package_set(&self, name: &str) -> Result<Option<Vec<PackageSpec>>, ResolveError> {
        Ok(self.sets.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;

    #[test]
    fn test_memory_repository_filters() {
        let mut repo = MemoryRepository::new();
        repo.add_package(CandidateRecord::new("gcc", Version::new(13, 2, 0)).with_slot("13"));
        repo.add_package(CandidateRecord::new("gcc", Version::new(12, 3, 0)).with_slot("12"));
        repo.add_package(
            CandidateRecord::new("gcc", Version::new(14, 0, 0))
                .with_slot("14")
                .with_mask(MaskReason::Keyword("~amd64".into())),
        );

        assert_eq!(repo.candidates_for("gcc", &CandidateFilter::any()).unwrap().len(), 2);
        assert_eq!(
            repo.candidates_for("gcc", &CandidateFilter::any().including_masked())
                .unwrap()
                .len(),
            3
        );
        let slot12 = repo.candidates_for("gcc", &CandidateFilter::in_slot("12")).unwrap();
        assert_eq!(slot12.len(), 1);
        assert_eq!(slot12[0].version, Version::new(12, 3, 0));
        assert!(repo.candidates_for("clang", &CandidateFilter::any()).unwrap().is_empty());
    }

    #[test]
    fn test_memory_repository_installed() {
        let mut repo = MemoryRepository::new();
        repo.add_installed(CandidateRecord::new("bash", Version::new(5, 2, 0)));
        let installed = repo.installed_candidates_for("bash").unwrap();
        assert!(installed[0].installed);
        assert_eq!(repo.all_installed().unwrap().len(), 1);
        assert!(repo.package_set("world").unwrap().is_none());
    }
}
