//! Pre-parsed dependency trees.

use crate::spec::{BlockSpec, PackageSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The class a dependency belongs to, which selects the ordering policy applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepClass {
    /// Needed to build the package
    Build,
    /// Needed to run the package
    Run,
    /// Needed eventually, may be installed afterwards
    Post,
    /// Nice to have
    Suggested,
}

impl fmt::Display for DepClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepClass::Build => write!(f, "build"),
            DepClass::Run => write!(f, "run"),
            DepClass::Post => write!(f, "post"),
            DepClass::Suggested => write!(f, "suggested"),
        }
    }
}

/// A dependency tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepTree {
    /// Every child applies
    All(Vec<DepTree>),
    /// One child is enough
    Any(Vec<DepTree>),
    /// Children apply only while `choice` is in state `enabled`
    Conditional {
        choice: String,
        enabled: bool,
        children: Vec<DepTree>,
    },
    /// A plain package dependency
    Package(PackageSpec),
    /// A negative dependency
    Block(BlockSpec),
    /// Children move to another dependency class
    Labelled {
        class: DepClass,
        children: Vec<DepTree>,
    },
}

impl Default for DepTree {
    fn default() -> Self {
        DepTree::All(Vec::new())
    }
}

impl DepTree {
    pub fn all(children: Vec<DepTree>) -> Self {
        DepTree::All(children)
    }

    pub fn any(children: Vec<DepTree>) -> Self {
        DepTree::Any(children)
    }

    /// A dependency on any version of `name`.
    pub fn named(name: impl Into<String>) -> Self {
        DepTree::Package(PackageSpec::new(name))
    }

    pub fn package(spec: PackageSpec) -> Self {
        DepTree::Package(spec)
    }

    pub fn block(spec: PackageSpec, strong: bool) -> Self {
        DepTree::Block(BlockSpec {
            blocking: spec,
            strong,
        })
    }

    /// Children that apply while `choice` is on.
    pub fn when(choice: impl Into<String>, children: Vec<DepTree>) -> Self {
        DepTree::Conditional {
            choice: choice.into(),
            enabled: true,
            children,
        }
    }

    /// Children that apply while `choice` is off.
    pub fn unless(choice: impl Into<String>, children: Vec<DepTree>) -> Self {
        DepTree::Conditional {
            choice: choice.into(),
            enabled: false,
            children,
        }
    }

    pub fn labelled(class: DepClass, children: Vec<DepTree>) -> Self {
        DepTree::Labelled { class, children }
    }

    /// True for a tree with no leaves at all.
    pub fn is_empty(&self) -> bool {
        match self {
            DepTree::All(children) | DepTree::Any(children) => {
                children.iter().all(DepTree::is_empty)
            }
            DepTree::Conditional { children, .. } | DepTree::Labelled { children, .. } => {
                children.iter().all(DepTree::is_empty)
            }
            DepTree::Package(_) | DepTree::Block(_) => false,
        }
    }

    /// Every package spec in the tree, whatever the conditions, in tree order.
    pub fn package_specs(&self) -> Vec<&PackageSpec> {
        let mut out = Vec::new();
        self.collect_specs(&mut out);
        out
    }

    fn collect_specs<'a>(&'a self, out: &mut Vec<&'a PackageSpec>) {
        match self {
            DepTree::All(children) | DepTree::Any(children) => {
                children.iter().for_each(|c| c.collect_specs(out))
            }
            DepTree::Conditional { children, .. } | DepTree::Labelled { children, .. } => {
                children.iter().for_each(|c| c.collect_specs(out))
            }
            DepTree::Package(spec) => out.push(spec),
            DepTree::Block(_) => {}
        }
    }
}

impl From<PackageSpec> for DepTree {
    fn from(spec: PackageSpec) -> Self {
        DepTree::Package(spec)
    }
}

/// The build, run and post dependency trees of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTrees {
    #[serde(default)]
    pub build: DepTree,
    #[serde(default)]
    pub run: DepTree,
    #[serde(default)]
    pub post: DepTree,
}

impl DependencyTrees {
    /// The trees paired with the class they start in.
    pub fn by_class(&self) -> [(DepClass, &DepTree); 3] {
        [
            (DepClass::Build, &self.build),
            (DepClass::Run, &self.run),
            (DepClass::Post, &self.post),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_specs_walks_everything() {
        let tree = DepTree::all(vec![
            DepTree::named("a"),
            DepTree::any(vec![DepTree::named("b"), DepTree::named("c")]),
            DepTree::when("x", vec![DepTree::named("d")]),
            DepTree::block(PackageSpec::new("e"), false),
            DepTree::labelled(DepClass::Suggested, vec![DepTree::named("f")]),
        ]);
        let names: Vec<&str> = tree.package_specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "f"]);
    }

    #[test]
    fn test_is_empty() {
        assert!(DepTree::default().is_empty());
        assert!(DepTree::all(vec![DepTree::when("x", vec![])]).is_empty());
        assert!(!DepTree::all(vec![DepTree::block(PackageSpec::new("e"), true)]).is_empty());
    }
}
