//! The `cairn.toml` configuration file.
//!
//! ```toml
//! accept_keywords = ["~amd64"]
//!
//! [resolver]
//! upgrade = "always"
//! blocks = "pretend-satisfied"
//! keep = ["glibc"]
//!
//! [execute]
//! jobs = 4
//! continue_on_failure = "if-independent"
//!
//! [paths]
//! repositories = "var/db/cairn/repos"
//! ```
//!
//! Relative paths are taken relative to the root passed to [`Config::paths`].

use crate::RepositoryError;
use cairn_types::{ContinueOnFailure, ResolverOptions};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "cairn.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unstable keywords that do not mask
    pub accept_keywords: Vec<String>,
    pub resolver: ResolverOptions,
    pub execute: ExecuteConfig,
    pub(crate) paths: PathsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecuteConfig {
    /// Concurrent fetch workers; all cores when unset
    pub jobs: Option<usize>,
    pub continue_on_failure: ContinueOnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct PathsConfig {
    repositories: PathBuf,
    installed: PathBuf,
    binaries: PathBuf,
    world: PathBuf,
    distfiles: PathBuf,
    mirror: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repositories: PathBuf::from("var/db/cairn/repos"),
            installed: PathBuf::from("var/db/cairn/installed.toml"),
            binaries: PathBuf::from("var/db/cairn/binaries.toml"),
            world: PathBuf::from("var/lib/cairn/world"),
            distfiles: PathBuf::from("var/cache/cairn/distfiles"),
            mirror: PathBuf::from("var/cache/cairn/mirror"),
        }
    }
}

/// Every on-disk location, resolved against a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub repositories: PathBuf,
    pub installed: PathBuf,
    pub binaries: PathBuf,
    pub world: PathBuf,
    pub distfiles: PathBuf,
    pub mirror: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path).map_err(|source| RepositoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| RepositoryError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else `<root>/cairn.toml`, else the per-user
    /// config file, else the defaults. Returns the file that was used.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), RepositoryError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let candidates = [Some(root.join(CONFIG_FILE)), Self::user_config_file()];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                debug!("Using config {}", path.display());
                return Ok((Self::load(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn user_config_file() -> Option<PathBuf> {
        ProjectDirs::from("dev", "cairn", "cairn").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn paths(&self, root: &Path) -> Paths {
        let p = &self.paths;
        Paths {
            repositories: root.join(&p.repositories),
            installed: root.join(&p.installed),
            binaries: root.join(&p.binaries),
            world: root.join(&p.world),
            distfiles: root.join(&p.distfiles),
            mirror: root.join(&p.mirror),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::{BlockerPolicy, PackageSpec, UpgradePolicy};
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
accept_keywords = ["~amd64"]

[resolver]
upgrade = "always"
blocks = "pretend-satisfied"
keep = ["glibc"]
max_restarts = 5

[execute]
jobs = 4
continue_on_failure = "if-independent"

[paths]
world = "/etc/cairn/world"
"#,
        )
        .unwrap();

        assert_eq!(config.accept_keywords, vec!["~amd64"]);
        assert_eq!(config.resolver.upgrade, UpgradePolicy::Always);
        assert_eq!(config.resolver.blocks, BlockerPolicy::PretendSatisfied);
        assert_eq!(config.resolver.keep, vec![PackageSpec::new("glibc")]);
        assert_eq!(config.resolver.max_restarts, 5);
        assert!(config.resolver.allow_choice_changes);
        assert_eq!(config.execute.jobs, Some(4));
        assert_eq!(config.execute.continue_on_failure, ContinueOnFailure::IfIndependent);

        let paths = config.paths(Path::new("/mnt/target"));
        assert_eq!(paths.world, PathBuf::from("/etc/cairn/world"));
        assert_eq!(paths.installed, PathBuf::from("/mnt/target/var/db/cairn/installed.toml"));
    }

    #[test]
    fn test_discover_prefers_root_file() {
        let temp_dir = TempDir::new().unwrap();
        let (config, used) = Config::discover(temp_dir.path(), None).unwrap();
        if used.is_none() {
            assert_eq!(config, Config::default());
        }

        fs::write(temp_dir.path().join(CONFIG_FILE), "[resolver]\npermit_uninstall = true\n").unwrap();
        let (config, used) = Config::discover(temp_dir.path(), None).unwrap();
        assert_eq!(used, Some(temp_dir.path().join(CONFIG_FILE)));
        assert!(config.resolver.permit_uninstall);
    }

    #[test]
    fn test_bad_policy_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[resolver]\nupgrade = \"sometimes\"\n").unwrap();

        assert!(matches!(Config::load(&path), Err(RepositoryError::Parse { .. })));
    }
}
