//! Repository files.
//!
//! A repository is one TOML file holding `[[package]]` entries and optional
//! `[sets]`. Dependencies are written as nested lists:
//!
//! ```toml
//! [repository]
//! name = "core"
//!
//! [[package]]
//! name = "curl"
//! version = "8.5.0"
//! keyword = "~amd64"
//! choices = { ssl = true, http3 = { enabled = false, locked = true } }
//! distfiles = [{ name = "curl-8.5.0.tar.xz", blake3 = "..." }]
//! build = ["cc"]
//! run = [
//!     "zlib@>=1.2",
//!     { if = "ssl", then = ["openssl:3"] },
//!     { any = ["libidn2", "libidn"] },
//!     { label = "suggested", deps = ["ca-certificates"] },
//!     "!curl-compat",
//! ]
//!
//! [sets]
//! system = ["bash", "coreutils"]
//! ```

use crate::RepositoryError;
use cairn_types::{
    BlockSpec, CandidateRecord, Choice, DepClass, DepTree, Distfile, MaskReason, PackageSpec,
    SpecError, Version,
};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(default)]
    repository: RawHeader,
    #[serde(default)]
    package: Vec<RawPackage>,
    #[serde(default)]
    sets: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHeader {
    #[serde(default)]
    name: Option<String>,
    /// An unavailable repository masks everything it provides
    #[serde(default = "default_available")]
    available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    version: String,
    #[serde(default)]
    slot: Option<String>,
    /// Unstable keyword; masked unless accepted
    #[serde(default)]
    keyword: Option<String>,
    /// Repository mask comment
    #[serde(default)]
    mask: Option<String>,
    #[serde(default)]
    choices: IndexMap<String, RawChoice>,
    #[serde(default)]
    distfiles: Vec<Distfile>,
    #[serde(default)]
    build: Vec<RawDep>,
    #[serde(default)]
    run: Vec<RawDep>,
    #[serde(default)]
    post: Vec<RawDep>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawChoice {
    Enabled(bool),
    Full {
        enabled: bool,
        #[serde(default)]
        locked: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDep {
    /// `name`, `!name` or `!!name`
    Spec(String),
    Any {
        any: Vec<RawDep>,
    },
    All {
        all: Vec<RawDep>,
    },
    When {
        #[serde(rename = "if")]
        when: String,
        then: Vec<RawDep>,
    },
    Unless {
        unless: String,
        then: Vec<RawDep>,
    },
    Labelled {
        label: DepClass,
        deps: Vec<RawDep>,
    },
}

fn convert_deps(raw: Vec<RawDep>) -> Result<Vec<DepTree>, SpecError> {
    raw.into_iter().map(convert_dep).collect()
}

fn convert_dep(raw: RawDep) -> Result<DepTree, SpecError> {
    Ok(match raw {
        RawDep::Spec(text) => {
            if let Some(rest) = text.strip_prefix("!!") {
                DepTree::Block(BlockSpec::strong(rest.parse()?))
            } else if let Some(rest) = text.strip_prefix('!') {
                DepTree::Block(BlockSpec::weak(rest.parse()?))
            } else {
                DepTree::Package(text.parse()?)
            }
        }
        RawDep::Any { any } => DepTree::any(convert_deps(any)?),
        RawDep::All { all } => DepTree::all(convert_deps(all)?),
        RawDep::When { when, then } => DepTree::when(when, convert_deps(then)?),
        RawDep::Unless { unless, then } => DepTree::unless(unless, convert_deps(then)?),
        RawDep::Labelled { label, deps } => DepTree::labelled(label, convert_deps(deps)?),
    })
}

/// One loaded repository.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    pub name: String,
    pub candidates: Vec<CandidateRecord>,
    pub sets: IndexMap<String, Vec<PackageSpec>>,
}

impl Repository {
    /// Load a repository file. The file stem names the repository unless the
    /// file sets `[repository] name`.
    pub fn load(path: &Path, accept_keywords: &[String]) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path).map_err(|source| RepositoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());
        Self::parse(&content, path, &fallback, accept_keywords)
    }

    /// Every `*.toml` file in `dir`, in file name order. A missing directory
    /// holds no repositories.
    pub fn load_dir(dir: &Path, accept_keywords: &[String]) -> Result<Vec<Self>, RepositoryError> {
        if !dir.is_dir() {
            debug!("No repository directory at {}", dir.display());
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir).map_err(|source| RepositoryError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        files
            .iter()
            .map(|path| Self::load(path, accept_keywords))
            .collect()
    }

    fn parse(
        content: &str,
        path: &Path,
        fallback_name: &str,
        accept_keywords: &[String],
    ) -> Result<Self, RepositoryError> {
        let raw: RawRepository = toml::from_str(content).map_err(|source| RepositoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let name = raw
            .repository
            .name
            .unwrap_or_else(|| fallback_name.to_string());

        let mut candidates: Vec<CandidateRecord> = Vec::with_capacity(raw.package.len());
        for package in raw.package {
            let candidate = convert_package(package, &name, raw.repository.available, accept_keywords)
                .map_err(|(package, message)| RepositoryError::Invalid {
                    path: path.to_path_buf(),
                    package,
                    message,
                })?;
            if candidates.iter().any(|c| c.same_version(&candidate)) {
                return Err(RepositoryError::Invalid {
                    path: path.to_path_buf(),
                    package: candidate.name.clone(),
                    message: format!("version {} in slot {} is listed twice", candidate.version, candidate.slot),
                });
            }
            candidates.push(candidate);
        }

        let sets = raw
            .sets
            .into_iter()
            .map(|(set, members)| {
                let specs = members
                    .iter()
                    .map(|m| m.parse::<PackageSpec>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| RepositoryError::Spec {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok((set, specs))
            })
            .collect::<Result<IndexMap<_, _>, RepositoryError>>()?;

        debug!("Loaded repository {} with {} packages", name, candidates.len());
        Ok(Self {
            name,
            candidates,
            sets,
        })
    }
}

fn convert_package(
    raw: RawPackage,
    repository: &str,
    available: bool,
    accept_keywords: &[String],
) -> Result<CandidateRecord, (String, String)> {
    let name = raw.name;
    let version = Version::parse(&raw.version)
        .map_err(|e| (name.clone(), format!("invalid version '{}': {}", raw.version, e)))?;
    let invalid = |e: SpecError| (name.clone(), e.to_string());

    let mut candidate = CandidateRecord::new(name.clone(), version).in_repository(repository);
    if let Some(slot) = raw.slot {
        candidate = candidate.with_slot(slot);
    }
    candidate.choices = raw
        .choices
        .into_iter()
        .map(|(name, choice)| match choice {
            RawChoice::Enabled(enabled) => Choice {
                name,
                enabled,
                locked: false,
            },
            RawChoice::Full { enabled, locked } => Choice {
                name,
                enabled,
                locked,
            },
        })
        .collect();
    candidate.distfiles = raw.distfiles;
    candidate.dependencies.build = DepTree::all(convert_deps(raw.build).map_err(invalid)?);
    candidate.dependencies.run = DepTree::all(convert_deps(raw.run).map_err(invalid)?);
    candidate.dependencies.post = DepTree::all(convert_deps(raw.post).map_err(invalid)?);

    if let Some(keyword) = raw.keyword {
        if !accept_keywords.contains(&keyword) {
            candidate.masks.push(MaskReason::Keyword(keyword));
        }
    }
    if let Some(comment) = raw.mask {
        candidate.masks.push(MaskReason::Repository(comment));
    }
    if !available {
        candidate.masks.push(MaskReason::Unavailable(repository.to_string()));
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Repository {
        Repository::parse(content, Path::new("core.toml"), "core", &[]).unwrap()
    }

    #[test]
    fn test_parse_dependency_forms() {
        let repo = parse(
            r#"
[[package]]
name = "curl"
version = "8.5.0"
choices = { ssl = true, http3 = { enabled = false, locked = true } }
build = ["cc"]
run = [
    "zlib@>=1.2",
    { if = "ssl", then = ["openssl:3"] },
    { unless = "ssl", then = ["gnutls"] },
    { any = ["libidn2", "libidn"] },
    { label = "suggested", deps = ["ca-certificates"] },
    "!curl-compat",
    "!!old-curl",
]
"#,
        );
        let curl = &repo.candidates[0];
        assert_eq!(curl.id(), "curl-8.5.0:0::core");
        assert_eq!(curl.choice_enabled("ssl"), Some(true));
        assert!(curl.choices[1].locked);

        let DepTree::All(run) = &curl.dependencies.run else {
            panic!("run deps should be an all-of group");
        };
        assert_eq!(run.len(), 7);
        assert_eq!(run[0], DepTree::Package("zlib@>=1.2".parse().unwrap()));
        assert_eq!(
            run[1],
            DepTree::when("ssl", vec![DepTree::Package("openssl:3".parse().unwrap())])
        );
        assert!(matches!(&run[2], DepTree::Conditional { enabled: false, .. }));
        assert!(matches!(&run[3], DepTree::Any(alternatives) if alternatives.len() == 2));
        assert!(matches!(&run[4], DepTree::Labelled { class: DepClass::Suggested, .. }));
        assert_eq!(run[5], DepTree::block(PackageSpec::new("curl-compat"), false));
        assert_eq!(run[6], DepTree::block(PackageSpec::new("old-curl"), true));
    }

    #[test]
    fn test_masks() {
        let content = r#"
[repository]
name = "overlay"
available = false

[[package]]
name = "vim"
version = "9.1.0"
keyword = "~amd64"
mask = "breaks plugins"
"#;
        let repo = Repository::parse(content, Path::new("x.toml"), "x", &[]).unwrap();
        assert_eq!(repo.name, "overlay");
        assert_eq!(
            repo.candidates[0].masks,
            vec![
                MaskReason::Keyword("~amd64".into()),
                MaskReason::Repository("breaks plugins".into()),
                MaskReason::Unavailable("overlay".into()),
            ]
        );

        let accepted = Repository::parse(content, Path::new("x.toml"), "x", &["~amd64".to_string()]).unwrap();
        assert_eq!(accepted.candidates[0].masks.len(), 2);
    }

    #[test]
    fn test_rejects_duplicate_versions() {
        let err = Repository::parse(
            r#"
[[package]]
name = "zlib"
version = "1.3.0"

[[package]]
name = "zlib"
version = "1.3.0"
"#,
            Path::new("core.toml"),
            "core",
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid { package, .. } if package == "zlib"));
    }

    #[test]
    fn test_load_dir_names_by_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("core.toml"),
            "[[package]]\nname = \"bash\"\nversion = \"5.2.0\"\n\n[sets]\nsystem = [\"bash\"]\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let repos = Repository::load_dir(temp_dir.path(), &[]).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "core");
        assert_eq!(repos[0].sets["system"], vec![PackageSpec::new("bash")]);

        let missing = Repository::load_dir(&temp_dir.path().join("nope"), &[]).unwrap();
        assert!(missing.is_empty());
    }
}
