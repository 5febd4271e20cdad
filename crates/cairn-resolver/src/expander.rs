//! Dependency expansion.
//!
//! Walks a candidate's dependency trees under its current choice state and
//! flattens them into leaves. Conditionals are evaluated, labels switch the
//! class of what they enclose, and any-of groups are narrowed to one
//! alternative using a score supplied by the caller.

use crate::error::ResolveError;
use cairn_types::{BlockSpec, CandidateRecord, DepClass, DepTree, PackageSpec};
use std::fmt;

/// A dependency leaf: a package or a blocker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencySpec {
    Package(PackageSpec),
    Block(BlockSpec),
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencySpec::Package(spec) => write!(f, "{}", spec),
            DependencySpec::Block(block) => write!(f, "{}", block),
        }
    }
}

/// One dependency leaf after conditionals and labels have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitisedDependency {
    pub spec: DependencySpec,
    pub class: DepClass,
    /// The choice states this leaf depends on, outermost first
    pub conditions: Vec<(String, bool)>,
    /// Picked out of an any-of group
    pub from_any_of: bool,
}

/// How attractive one alternative of an any-of group is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnyScore {
    Nothing = 0,
    /// Exists, but masked or with the wrong choices
    Exists = 10,
    Installable = 20,
    /// Already decided to be installed in this pass
    BeingInstalled = 30,
    InstalledWrongChoices = 40,
    InstalledMatching = 50,
}

/// Expand every dependency of `candidate`, in tree order.
///
/// `score` rates a package spec appearing as an any-of alternative.
pub fn expand<F>(candidate: &CandidateRecord, mut score: F) -> Result<Vec<SanitisedDependency>, ResolveError>
where
    F: FnMut(&PackageSpec) -> Result<AnyScore, ResolveError>,
{
    let mut walker = Walker {
        candidate,
        score: &mut score,
        conditions: Vec::new(),
        out: Vec::new(),
    };
    for (class, tree) in candidate.dependencies.by_class() {
        walker.walk(tree, class, false)?;
    }
    Ok(walker.out)
}

struct Walker<'a, F> {
    candidate: &'a CandidateRecord,
    score: &'a mut F,
    conditions: Vec<(String, bool)>,
    out: Vec<SanitisedDependency>,
}

impl<'a, F> Walker<'a, F>
where
    F: FnMut(&PackageSpec) -> Result<AnyScore, ResolveError>,
{
    fn condition_holds(&self, choice: &str, enabled: bool) -> bool {
        self.candidate.choice_enabled(choice).unwrap_or(false) == enabled
    }

    fn walk(&mut self, tree: &DepTree, class: DepClass, any_of: bool) -> Result<(), ResolveError> {
        match tree {
            DepTree::All(children) => {
                for child in children {
                    self.walk(child, class, any_of)?;
                }
            }
            DepTree::Any(children) => {
                if let Some(chosen) = self.choose(children)? {
                    self.walk(chosen, class, true)?;
                }
            }
            DepTree::Conditional {
                choice,
                enabled,
                children,
            } => {
                if self.condition_holds(choice, *enabled) {
                    self.conditions.push((choice.clone(), *enabled));
                    for child in children {
                        self.walk(child, class, any_of)?;
                    }
                    self.conditions.pop();
                }
            }
            DepTree::Labelled { class, children } => {
                for child in children {
                    self.walk(child, *class, any_of)?;
                }
            }
            DepTree::Package(spec) => self.out.push(SanitisedDependency {
                spec: DependencySpec::Package(spec.clone()),
                class,
                conditions: self.conditions.clone(),
                from_any_of: any_of,
            }),
            DepTree::Block(block) => {
                if any_of {
                    tracing::warn!(
                        "{}: ignoring blocker {} inside an any-of group",
                        self.candidate.id(),
                        block
                    );
                } else {
                    self.out.push(SanitisedDependency {
                        spec: DependencySpec::Block(block.clone()),
                        class,
                        conditions: self.conditions.clone(),
                        from_any_of: false,
                    });
                }
            }
        }
        Ok(())
    }

    /// Highest-scoring alternative; the first one wins ties.
    fn choose<'t>(&mut self, children: &'t [DepTree]) -> Result<Option<&'t DepTree>, ResolveError> {
        let mut best: Option<(&DepTree, AnyScore)> = None;
        for child in children {
            let Some(score) = self.score_tree(child)? else {
                continue;
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((child, score));
            }
        }
        Ok(best.map(|(tree, _)| tree))
    }

    /// `None` for alternatives that cannot be scored at all, such as blockers.
    fn score_tree(&mut self, tree: &DepTree) -> Result<Option<AnyScore>, ResolveError> {
        match tree {
            DepTree::Package(spec) => Ok(Some((self.score)(spec)?)),
            DepTree::Block(_) => Ok(None),
            DepTree::Any(children) => {
                let mut best = None;
                for child in children {
                    if let Some(score) = self.score_tree(child)? {
                        best = Some(best.map_or(score, |b: AnyScore| b.max(score)));
                    }
                }
                Ok(best)
            }
            DepTree::Conditional {
                choice,
                enabled,
                children,
            } => {
                if self.condition_holds(choice, *enabled) {
                    self.score_all(children)
                } else {
                    Ok(Some(AnyScore::InstalledMatching))
                }
            }
            DepTree::All(children) | DepTree::Labelled { children, .. } => self.score_all(children),
        }
    }

    /// An all-of group is only as good as its worst member.
    fn score_all(&mut self, children: &[DepTree]) -> Result<Option<AnyScore>, ResolveError> {
        let mut worst = AnyScore::InstalledMatching;
        for child in children {
            if let Some(score) = self.score_tree(child)? {
                worst = worst.min(score);
            }
        }
        Ok(Some(worst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::Version;

    fn names(deps: &[SanitisedDependency]) -> Vec<String> {
        deps.iter().map(|d| d.spec.to_string()).collect()
    }

    fn available(spec: &PackageSpec) -> Result<AnyScore, ResolveError> {
        Ok(if spec.name == "two" {
            AnyScore::Installable
        } else {
            AnyScore::Nothing
        })
    }

    #[test]
    fn test_classes_and_labels() {
        let candidate = CandidateRecord::new("one", Version::new(1, 0, 0))
            .with_build(DepTree::all(vec![DepTree::named("cc")]))
            .with_run(DepTree::all(vec![
                DepTree::named("libc"),
                DepTree::labelled(DepClass::Suggested, vec![DepTree::named("docs")]),
            ]))
            .with_post(DepTree::all(vec![DepTree::named("plugin")]));

        let deps = expand(&candidate, available).unwrap();
        assert_eq!(names(&deps), vec!["cc", "libc", "docs", "plugin"]);
        let classes: Vec<DepClass> = deps.iter().map(|d| d.class).collect();
        assert_eq!(
            classes,
            vec![DepClass::Build, DepClass::Run, DepClass::Suggested, DepClass::Post]
        );
    }

    #[test]
    fn test_conditionals_follow_choices() {
        let candidate = CandidateRecord::new("one", Version::new(1, 0, 0))
            .with_choice("ssl", true)
            .with_run(DepTree::all(vec![
                DepTree::when("ssl", vec![DepTree::named("openssl")]),
                DepTree::unless("ssl", vec![DepTree::named("nettle")]),
                DepTree::when("gui", vec![DepTree::named("gtk")]),
                DepTree::unless("gui", vec![DepTree::named("ncurses")]),
            ]));

        let deps = expand(&candidate, available).unwrap();
        assert_eq!(names(&deps), vec!["openssl", "ncurses"]);
        assert_eq!(deps[0].conditions, vec![("ssl".to_string(), true)]);
    }

    #[test]
    fn test_any_of_picks_best_alternative() {
        let candidate = CandidateRecord::new("one", Version::new(1, 0, 0)).with_run(DepTree::all(vec![
            DepTree::any(vec![DepTree::named("three"), DepTree::named("two")]),
        ]));

        let deps = expand(&candidate, available).unwrap();
        assert_eq!(names(&deps), vec!["two"]);
        assert!(deps[0].from_any_of);
    }

    #[test]
    fn test_any_of_ties_go_to_first() {
        let candidate = CandidateRecord::new("one", Version::new(1, 0, 0)).with_run(DepTree::all(vec![
            DepTree::any(vec![DepTree::named("three"), DepTree::named("four")]),
        ]));

        let deps = expand(&candidate, available).unwrap();
        assert_eq!(names(&deps), vec!["three"]);
    }

    #[test]
    fn test_blockers_inside_any_of_are_ignored() {
        let candidate = CandidateRecord::new("one", Version::new(1, 0, 0)).with_run(DepTree::all(vec![
            DepTree::block(PackageSpec::new("old"), false),
            DepTree::any(vec![DepTree::block(PackageSpec::new("older"), false), DepTree::named("two")]),
        ]));

        let deps = expand(&candidate, available).unwrap();
        assert_eq!(names(&deps), vec!["!old", "two"]);
    }
}
