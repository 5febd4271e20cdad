//! Uninstall closure calculation.
//!
//! Given removal targets and the installed state, work out everything that has
//! to go with them and in which order.

use cairn_types::{CandidateRecord, DepClass, DepTree, PackageSpec};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

/// Knobs for [`UninstallList::compute`].
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Installed packages depending on a removed package are removed too
    pub with_dependencies: bool,
    /// Dependencies nothing else needs any more are removed too
    pub with_unused_dependencies: bool,
    /// Packages that only need a removed package to build are left alone
    pub exempt_build_dependents: bool,
    /// Never removed as an unused dependency, e.g. world file entries
    pub protected: Vec<PackageSpec>,
}

/// Why a package ended up in the removal list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalCause {
    /// Named by the user
    Target,
    /// Depends on the package with this id, which is being removed
    Dependent { of: String },
    /// Was only used by the package with this id
    Unused { by: String },
    /// Not reachable from any protected package
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalEntry {
    pub candidate: Arc<CandidateRecord>,
    pub cause: RemovalCause,
}

/// Who depends on whom among installed packages.
///
/// References are collected once per installed package. Conditionals follow
/// the installed choices, every any-of alternative counts and blockers are
/// ignored.
#[derive(Debug, Clone)]
pub struct DependencyIndex {
    installed: Vec<Arc<CandidateRecord>>,
    by_id: IndexMap<String, usize>,
    /// Run and post references
    runtime: Vec<Vec<usize>>,
    /// References that only exist at build time
    build: Vec<Vec<usize>>,
}

impl DependencyIndex {
    pub fn new(installed: Vec<Arc<CandidateRecord>>) -> Self {
        let mut by_name: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (i, candidate) in installed.iter().enumerate() {
            by_name.entry(candidate.name.as_str()).or_default().push(i);
        }

        let mut runtime = Vec::with_capacity(installed.len());
        let mut build = Vec::with_capacity(installed.len());
        for (i, candidate) in installed.iter().enumerate() {
            let mut refs: Vec<(PackageSpec, DepClass)> = Vec::new();
            for (class, tree) in candidate.dependencies.by_class() {
                collect_refs(candidate, tree, class, &mut refs);
            }

            let mut run_targets = IndexSet::new();
            let mut build_targets = IndexSet::new();
            for (spec, class) in &refs {
                let Some(matches) = by_name.get(spec.name.as_str()) else {
                    continue;
                };
                for &j in matches {
                    if j == i || !spec.matches_ignoring_choices(&installed[j]) {
                        continue;
                    }
                    if *class == DepClass::Build {
                        build_targets.insert(j);
                    } else {
                        run_targets.insert(j);
                    }
                }
            }
            build_targets.retain(|j| !run_targets.contains(j));
            runtime.push(run_targets.into_iter().collect());
            build.push(build_targets.into_iter().collect());
        }

        let by_id = installed
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id(), i))
            .collect();
        Self {
            installed,
            by_id,
            runtime,
            build,
        }
    }

    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn candidate(&self, index: usize) -> &Arc<CandidateRecord> {
        &self.installed[index]
    }

    pub fn position(&self, candidate: &CandidateRecord) -> Option<usize> {
        self.by_id.get(&candidate.id()).copied()
    }

    /// The installed package with this id.
    pub fn find(&self, id: &str) -> Option<&Arc<CandidateRecord>> {
        self.by_id.get(id).map(|&i| &self.installed[i])
    }

    /// Installed packages `index` refers to.
    pub fn dependencies_of(&self, index: usize, include_build: bool) -> Vec<usize> {
        let mut out = self.runtime[index].clone();
        if include_build {
            out.extend(self.build[index].iter().copied());
        }
        out
    }

    /// Installed packages referring to `index`, in installed order.
    pub fn dependents_of(&self, index: usize, include_build: bool) -> Vec<usize> {
        (0..self.installed.len())
            .filter(|&i| {
                self.runtime[i].contains(&index) || (include_build && self.build[i].contains(&index))
            })
            .collect()
    }

    /// Installed dependents of `candidate` that are not in `removal_set`,
    /// i.e. what removing the set would break. Empty means removal is allowed.
    pub fn allowed_to_remove(
        &self,
        candidate: &CandidateRecord,
        removal_set: &[Arc<CandidateRecord>],
        include_build: bool,
    ) -> Vec<Arc<CandidateRecord>> {
        let Some(index) = self.position(candidate) else {
            return Vec::new();
        };
        let removing: Vec<String> = removal_set.iter().map(|c| c.id()).collect();
        self.dependents_of(index, include_build)
            .into_iter()
            .map(|i| &self.installed[i])
            .filter(|c| !removing.contains(&c.id()))
            .cloned()
            .collect()
    }
}

fn collect_refs(
    candidate: &CandidateRecord,
    tree: &DepTree,
    class: DepClass,
    out: &mut Vec<(PackageSpec, DepClass)>,
) {
    match tree {
        DepTree::All(children) | DepTree::Any(children) => {
            for child in children {
                collect_refs(candidate, child, class, out);
            }
        }
        DepTree::Conditional {
            choice,
            enabled,
            children,
        } => {
            if candidate.choice_enabled(choice).unwrap_or(false) == *enabled {
                for child in children {
                    collect_refs(candidate, child, class, out);
                }
            }
        }
        DepTree::Labelled { class, children } => {
            // suggestions are never real references
            if *class != DepClass::Suggested {
                for child in children {
                    collect_refs(candidate, child, *class, out);
                }
            }
        }
        DepTree::Package(spec) => out.push((spec.clone(), class)),
        DepTree::Block(_) => {}
    }
}

/// The removal list for one uninstall request.
pub struct UninstallList<'a> {
    index: &'a DependencyIndex,
    options: &'a UninstallOptions,
    closure: IndexMap<usize, RemovalCause>,
}

impl<'a> UninstallList<'a> {
    pub fn new(index: &'a DependencyIndex, options: &'a UninstallOptions) -> Self {
        Self {
            index,
            options,
            closure: IndexMap::new(),
        }
    }

    /// Compute the ordered removal list for `targets`.
    ///
    /// Targets that are not installed are ignored.
    pub fn compute(mut self, targets: &[Arc<CandidateRecord>]) -> Vec<RemovalEntry> {
        for target in targets {
            match self.index.position(target) {
                Some(i) => {
                    self.closure.insert(i, RemovalCause::Target);
                }
                None => tracing::warn!("{} is not installed, nothing to remove", target.id()),
            }
        }

        loop {
            let mut changed = self.add_dependents();
            if self.options.with_unused_dependencies {
                changed |= self.add_unused();
            }
            if !changed {
                break;
            }
        }

        tracing::debug!("uninstall closure has {} packages", self.closure.len());
        ordered(self.index, &self.closure)
    }

    fn add_dependents(&mut self) -> bool {
        if !self.options.with_dependencies {
            return false;
        }
        let include_build = !self.options.exempt_build_dependents;
        let mut changed = false;
        let mut i = 0;
        // the closure grows while we walk it
        while i < self.closure.len() {
            let Some((&member, _)) = self.closure.get_index(i) else {
                break;
            };
            for dependent in self.index.dependents_of(member, include_build) {
                if !self.closure.contains_key(&dependent) {
                    self.closure.insert(
                        dependent,
                        RemovalCause::Dependent {
                            of: self.index.candidate(member).id(),
                        },
                    );
                    changed = true;
                }
            }
            i += 1;
        }
        changed
    }

    fn add_unused(&mut self) -> bool {
        let mut changed = false;
        let members: Vec<usize> = self.closure.keys().copied().collect();
        for member in members {
            for dep in self.index.dependencies_of(member, true) {
                if self.closure.contains_key(&dep) || self.is_protected(dep) {
                    continue;
                }
                let still_used = self
                    .index
                    .dependents_of(dep, true)
                    .into_iter()
                    .any(|user| !self.closure.contains_key(&user));
                if !still_used {
                    self.closure.insert(
                        dep,
                        RemovalCause::Unused {
                            by: self.index.candidate(member).id(),
                        },
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    fn is_protected(&self, index: usize) -> bool {
        let candidate = self.index.candidate(index);
        self.options
            .protected
            .iter()
            .any(|spec| spec.matches_ignoring_choices(candidate))
    }
}

/// Everything installed that no protected package needs, directly or not.
pub fn compute_unused(index: &DependencyIndex, protected: &[PackageSpec]) -> Vec<RemovalEntry> {
    let mut kept: IndexSet<usize> = (0..index.len())
        .filter(|&i| protected.iter().any(|s| s.matches_ignoring_choices(index.candidate(i))))
        .collect();
    let mut i = 0;
    while i < kept.len() {
        let Some(&member) = kept.get_index(i) else {
            break;
        };
        for dep in index.dependencies_of(member, true) {
            kept.insert(dep);
        }
        i += 1;
    }

    let closure: IndexMap<usize, RemovalCause> = (0..index.len())
        .filter(|i| !kept.contains(i))
        .map(|i| (i, RemovalCause::Unreachable))
        .collect();
    ordered(index, &closure)
}

/// Dependents before their dependencies; ties go to whatever was seen first.
fn ordered(index: &DependencyIndex, closure: &IndexMap<usize, RemovalCause>) -> Vec<RemovalEntry> {
    let members: Vec<usize> = closure.keys().copied().collect();
    let mut pending_dependents: Vec<usize> = members
        .iter()
        .map(|&m| {
            index
                .dependents_of(m, true)
                .into_iter()
                .filter(|d| *d != m && closure.contains_key(d))
                .count()
        })
        .collect();
    let mut done = vec![false; members.len()];
    let mut out = Vec::with_capacity(members.len());

    while out.len() < members.len() {
        let next = (0..members.len())
            .find(|&k| !done[k] && pending_dependents[k] == 0)
            // a dependency cycle inside the closure: break it at the earliest member
            .or_else(|| (0..members.len()).find(|&k| !done[k]));
        let Some(k) = next else {
            break;
        };
        done[k] = true;
        let member = members[k];
        for dep in index.dependencies_of(member, true) {
            if let Some(pos) = closure.get_index_of(&dep) {
                if !done[pos] && pending_dependents[pos] > 0 {
                    pending_dependents[pos] -= 1;
                }
            }
        }
        out.push(RemovalEntry {
            candidate: index.candidate(member).clone(),
            cause: closure[&member].clone(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;

    fn pkg(name: &str) -> CandidateRecord {
        CandidateRecord::new(name, Version::new(1, 0, 0)).installed()
    }

    fn names(entries: &[RemovalEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.candidate.name.as_str()).collect()
    }

    fn names_of(candidates: &[Arc<CandidateRecord>]) -> Vec<String> {
        candidates.iter().map(|c| c.name.clone()).collect()
    }

    fn index(records: Vec<CandidateRecord>) -> DependencyIndex {
        DependencyIndex::new(records.into_iter().map(Arc::new).collect())
    }

    #[test]
    fn test_unused_dependencies_follow_target() {
        let index = index(vec![
            pkg("bar").with_run(DepTree::all(vec![DepTree::named("baz")])),
            pkg("baz"),
            pkg("other"),
        ]);
        let options = UninstallOptions {
            with_unused_dependencies: true,
            ..Default::default()
        };
        let targets = vec![index.candidate(0).clone()];
        let list = UninstallList::new(&index, &options).compute(&targets);

        assert_eq!(names(&list), vec!["bar", "baz"]);
        assert_eq!(
            list[1].cause,
            RemovalCause::Unused {
                by: "bar-1.0.0:0::local".into()
            }
        );
    }

    #[test]
    fn test_shared_dependency_is_kept() {
        let index = index(vec![
            pkg("bar").with_run(DepTree::all(vec![DepTree::named("baz")])),
            pkg("qux").with_run(DepTree::all(vec![DepTree::named("baz")])),
            pkg("baz"),
        ]);
        let options = UninstallOptions {
            with_unused_dependencies: true,
            ..Default::default()
        };
        let list = UninstallList::new(&index, &options).compute(&[index.candidate(0).clone()]);
        assert_eq!(names(&list), vec!["bar"]);
    }

    #[test]
    fn test_protected_dependency_is_kept() {
        let index = index(vec![
            pkg("bar").with_run(DepTree::all(vec![DepTree::named("baz")])),
            pkg("baz"),
        ]);
        let options = UninstallOptions {
            with_unused_dependencies: true,
            protected: vec![PackageSpec::new("baz")],
            ..Default::default()
        };
        let list = UninstallList::new(&index, &options).compute(&[index.candidate(0).clone()]);
        assert_eq!(names(&list), vec!["bar"]);
    }

    #[test]
    fn test_dependents_are_removed_first() {
        let index = index(vec![
            pkg("lib"),
            pkg("app").with_run(DepTree::all(vec![DepTree::named("lib")])),
            pkg("tool").with_build(DepTree::all(vec![DepTree::named("lib")])),
        ]);
        let options = UninstallOptions {
            with_dependencies: true,
            ..Default::default()
        };
        let list = UninstallList::new(&index, &options).compute(&[index.candidate(0).clone()]);
        assert_eq!(names(&list), vec!["app", "tool", "lib"]);

        let exempt = UninstallOptions {
            with_dependencies: true,
            exempt_build_dependents: true,
            ..Default::default()
        };
        let list = UninstallList::new(&index, &exempt).compute(&[index.candidate(0).clone()]);
        assert_eq!(names(&list), vec!["app", "lib"]);
    }

    #[test]
    fn test_target_that_is_also_a_dependent_appears_once() {
        let index = index(vec![
            pkg("lib"),
            pkg("app").with_run(DepTree::all(vec![DepTree::named("lib")])),
        ]);
        let options = UninstallOptions {
            with_dependencies: true,
            ..Default::default()
        };
        let targets = vec![index.candidate(0).clone(), index.candidate(1).clone()];
        let list = UninstallList::new(&index, &options).compute(&targets);
        assert_eq!(names(&list), vec!["app", "lib"]);
        assert_eq!(list[0].cause, RemovalCause::Target);
    }

    #[test]
    fn test_closure_is_idempotent() {
        let index = index(vec![
            pkg("a").with_run(DepTree::all(vec![DepTree::named("b"), DepTree::named("c")])),
            pkg("b").with_run(DepTree::all(vec![DepTree::named("c")])),
            pkg("c"),
        ]);
        let options = UninstallOptions {
            with_unused_dependencies: true,
            ..Default::default()
        };
        let first = UninstallList::new(&index, &options).compute(&[index.candidate(0).clone()]);
        let second = UninstallList::new(&index, &options).compute(&[index.candidate(0).clone()]);
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_conditional_references_follow_installed_choices() {
        let index = index(vec![
            pkg("app")
                .with_choice("ssl", false)
                .with_run(DepTree::all(vec![DepTree::when("ssl", vec![DepTree::named("openssl")])])),
            pkg("openssl"),
        ]);
        assert!(index.dependents_of(1, true).is_empty());
        assert!(index.allowed_to_remove(index.candidate(1), &[], true).is_empty());
    }

    #[test]
    fn test_allowed_to_remove_lists_dependents_outside_the_set() {
        let index = index(vec![
            pkg("lib"),
            pkg("app").with_run(DepTree::all(vec![DepTree::named("lib")])),
            pkg("tool").with_build(DepTree::all(vec![DepTree::named("lib")])),
        ]);
        let lib = index.candidate(0);

        assert_eq!(names_of(&index.allowed_to_remove(lib, &[], false)), vec!["app"]);
        assert_eq!(names_of(&index.allowed_to_remove(lib, &[], true)), vec!["app", "tool"]);
        let set = vec![lib.clone(), index.candidate(1).clone()];
        assert!(index.allowed_to_remove(lib, &set, false).is_empty());
    }

    #[test]
    fn test_compute_unused() {
        let index = index(vec![
            pkg("app").with_run(DepTree::all(vec![DepTree::any(vec![
                DepTree::named("a"),
                DepTree::named("b"),
            ])])),
            pkg("a"),
            pkg("b"),
            pkg("orphan").with_run(DepTree::all(vec![DepTree::named("leaf")])),
            pkg("leaf"),
        ]);
        let list = compute_unused(&index, &[PackageSpec::new("app")]);
        assert_eq!(names(&list), vec!["orphan", "leaf"]);
        assert!(list.iter().all(|e| e.cause == RemovalCause::Unreachable));
    }
}
