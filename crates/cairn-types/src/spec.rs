//! Package specifications: the unit targets, dependencies and blockers are written in.

use crate::CandidateRecord;
use semver::VersionReq;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while reading the textual form of a spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The spec had no package name.
    #[error("package spec '{0}' has no package name")]
    MissingName(String),

    /// The version requirement did not parse.
    #[error("invalid version requirement '{requirement}' in '{spec}': {message}")]
    InvalidVersion {
        spec: String,
        requirement: String,
        message: String,
    },

    /// A `[...]` choice list was malformed.
    #[error("invalid choice list in '{0}'")]
    InvalidChoices(String),

    /// A slot or repository qualifier was empty.
    #[error("empty qualifier in '{0}'")]
    EmptyQualifier(String),
}

/// A required state for one choice of the matched candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChoiceRequirement {
    /// Choice name
    pub name: String,
    /// Whether the choice must be on (`true`) or off (`false`)
    pub enabled: bool,
}

impl fmt::Display for ChoiceRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enabled {
            write!(f, "{}", self.name)
        } else {
            write!(f, "-{}", self.name)
        }
    }
}

/// A package name plus optional version, slot, repository and choice constraints.
///
/// The textual form is `name[@version-req][:slot][::repository][[opt,-opt]]`,
/// for example `openssl@>=3.0:3::core[-static]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageSpec {
    /// Package name
    pub name: String,
    /// Version requirement
    pub version: Option<VersionReq>,
    /// Required slot
    pub slot: Option<String>,
    /// Required origin repository
    pub repository: Option<String>,
    /// Required choice states
    pub choices: Vec<ChoiceRequirement>,
}

impl PackageSpec {
    /// Create a spec matching any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            slot: None,
            repository: None,
            choices: Vec::new(),
        }
    }

    /// Restrict the spec to versions matching `req`.
    pub fn with_version(mut self, req: VersionReq) -> Self {
        self.version = Some(req);
        self
    }

    /// Restrict the spec to one slot.
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Restrict the spec to one origin repository.
    pub fn in_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Require a choice to be on or off.
    pub fn with_choice(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.choices.push(ChoiceRequirement {
            name: name.into(),
            enabled,
        });
        self
    }

    /// The same spec with its choice requirements removed.
    pub fn without_choices(&self) -> Self {
        Self {
            choices: Vec::new(),
            ..self.clone()
        }
    }

    /// Does `candidate` match this spec, choices included?
    pub fn matches(&self, candidate: &CandidateRecord) -> bool {
        self.matches_ignoring_choices(candidate)
            && self
                .choices
                .iter()
                .all(|req| candidate.choice_enabled(&req.name) == Some(req.enabled))
    }

    /// Does `candidate` match the name, version, slot and repository parts?
    pub fn matches_ignoring_choices(&self, candidate: &CandidateRecord) -> bool {
        self.name == candidate.name
            && self
                .version
                .as_ref()
                .map_or(true, |req| req.matches(&candidate.version))
            && self.slot.as_ref().map_or(true, |slot| *slot == candidate.slot)
            && self
                .repository
                .as_ref()
                .map_or(true, |repo| *repo == candidate.repository)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(req) = &self.version {
            write!(f, "@{}", req)?;
        }
        if let Some(slot) = &self.slot {
            write!(f, ":{}", slot)?;
        }
        if let Some(repo) = &self.repository {
            write!(f, "::{}", repo)?;
        }
        if !self.choices.is_empty() {
            let choices: Vec<String> = self.choices.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", choices.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for PackageSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (rest, choices) = match text.find('[') {
            Some(open) => {
                let list = text[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| SpecError::InvalidChoices(s.to_string()))?;
                (&text[..open], parse_choices(list, s)?)
            }
            None => (text, Vec::new()),
        };

        let (rest, repository) = match rest.split_once("::") {
            Some((head, repo)) => (head, Some(non_empty(repo, s)?)),
            None => (rest, None),
        };
        let (rest, slot) = match rest.split_once(':') {
            Some((head, slot)) => (head, Some(non_empty(slot, s)?)),
            None => (rest, None),
        };
        let (name, version) = match rest.split_once('@') {
            Some((name, req)) => {
                let parsed = VersionReq::parse(req.trim()).map_err(|e| SpecError::InvalidVersion {
                    spec: s.to_string(),
                    requirement: req.to_string(),
                    message: e.to_string(),
                })?;
                (name, Some(parsed))
            }
            None => (rest, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(SpecError::MissingName(s.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            version,
            slot,
            repository,
            choices,
        })
    }
}

fn non_empty(part: &str, spec: &str) -> Result<String, SpecError> {
    let part = part.trim();
    if part.is_empty() {
        Err(SpecError::EmptyQualifier(spec.to_string()))
    } else {
        Ok(part.to_string())
    }
}

fn parse_choices(list: &str, spec: &str) -> Result<Vec<ChoiceRequirement>, SpecError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, enabled) = match item.strip_prefix('-') {
                Some(name) => (name, false),
                None => (item.strip_prefix('+').unwrap_or(item), true),
            };
            if name.is_empty() || name.contains(['[', ']']) {
                Err(SpecError::InvalidChoices(spec.to_string()))
            } else {
                Ok(ChoiceRequirement {
                    name: name.to_string(),
                    enabled,
                })
            }
        })
        .collect()
}

impl TryFrom<String> for PackageSpec {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageSpec> for String {
    fn from(spec: PackageSpec) -> Self {
        spec.to_string()
    }
}

/// A negative dependency: the matched package must not be present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSpec {
    /// What is blocked
    pub blocking: PackageSpec,
    /// Strong blockers must be gone before the blocking package is installed
    #[serde(default)]
    pub strong: bool,
}

impl BlockSpec {
    pub fn weak(blocking: PackageSpec) -> Self {
        Self {
            blocking,
            strong: false,
        }
    }

    pub fn strong(blocking: PackageSpec) -> Self {
        Self {
            blocking,
            strong: true,
        }
    }
}

impl fmt::Display for BlockSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.strong {
            write!(f, "!!{}", self.blocking)
        } else {
            write!(f, "!{}", self.blocking)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Version;

    #[test]
    fn test_parse_full_spec() {
        let spec: PackageSpec = "openssl@>=3.0:3::core[ssl,-static]".parse().unwrap();
        assert_eq!(spec.name, "openssl");
        assert_eq!(spec.version, Some(VersionReq::parse(">=3.0").unwrap()));
        assert_eq!(spec.slot.as_deref(), Some("3"));
        assert_eq!(spec.repository.as_deref(), Some("core"));
        assert_eq!(spec.choices.len(), 2);
        assert!(spec.choices[0].enabled);
        assert!(!spec.choices[1].enabled);
    }

    #[test]
    fn test_display_parses_back() {
        let spec = PackageSpec::new("zlib")
            .with_version(VersionReq::parse("^1.2").unwrap())
            .with_slot("0")
            .with_choice("minizip", false);
        let again: PackageSpec = spec.to_string().parse().unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "@1.0".parse::<PackageSpec>(),
            Err(SpecError::MissingName(_))
        ));
        assert!(matches!(
            "foo@not-a-version".parse::<PackageSpec>(),
            Err(SpecError::InvalidVersion { .. })
        ));
        assert!(matches!(
            "foo[ssl".parse::<PackageSpec>(),
            Err(SpecError::InvalidChoices(_))
        ));
        assert!(matches!(
            "foo:".parse::<PackageSpec>(),
            Err(SpecError::EmptyQualifier(_))
        ));
    }

    #[test]
    fn test_matching() {
        let candidate = CandidateRecord::new("curl", Version::new(8, 4, 0))
            .with_slot("0")
            .with_choice("ssl", true);

        assert!("curl".parse::<PackageSpec>().unwrap().matches(&candidate));
        assert!("curl@>=8:0[ssl]".parse::<PackageSpec>().unwrap().matches(&candidate));
        assert!(!"curl[-ssl]".parse::<PackageSpec>().unwrap().matches(&candidate));
        assert!("curl[-ssl]"
            .parse::<PackageSpec>()
            .unwrap()
            .matches_ignoring_choices(&candidate));
        assert!(!"curl:1".parse::<PackageSpec>().unwrap().matches(&candidate));
        assert!(!"curl@<8".parse::<PackageSpec>().unwrap().matches(&candidate));
        assert!(!"wget".parse::<PackageSpec>().unwrap().matches(&candidate));
    }

    #[test]
    fn test_block_display() {
        let block = BlockSpec::strong(PackageSpec::new("sysvinit"));
        assert_eq!(block.to_string(), "!!sysvinit");
    }
}
