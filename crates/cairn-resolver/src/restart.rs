//! Bookkeeping for restarts.
//!
//! When a new constraint invalidates a decision that is already confirmed, the
//! decider abandons the whole pass. The constraint that caused it is kept here
//! and fed into the next pass as a preset, so the same mistake is not repeated.

use crate::constraint::Constraint;
use crate::error::ResolveError;
use crate::reason::Reason;
use crate::resolvent::Resolvent;
use indexmap::IndexMap;

/// A request to throw everything away and start over.
#[derive(Debug, Clone)]
pub struct SuggestRestart {
    pub resolvent: Resolvent,
    /// The decision that turned out wrong, rendered
    pub previous: String,
    /// The constraint it failed
    pub constraint: Constraint,
}

impl SuggestRestart {
    /// The constraint to seed into the next pass.
    pub fn preload(&self) -> Constraint {
        Constraint {
            reason: Reason::Preset {
                note: "carried over from an earlier pass".to_string(),
                original: Some(Box::new(self.constraint.reason.clone())),
            },
            ..self.constraint.clone()
        }
    }
}

/// One restart, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRecord {
    pub resolvent: Resolvent,
    pub previous: String,
    pub constraint: String,
}

/// Every restart so far plus the presets they produced.
#[derive(Debug, Clone)]
pub struct RestartLedger {
    limit: usize,
    preloads: IndexMap<Resolvent, Vec<Constraint>>,
    history: Vec<RestartRecord>,
}

impl RestartLedger {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            preloads: IndexMap::new(),
            history: Vec::new(),
        }
    }

    /// Record a restart, failing once more than `limit` restarts have happened.
    pub fn record(&mut self, restart: SuggestRestart) -> Result<(), ResolveError> {
        tracing::debug!(
            "restarting: {} was '{}' but needs {}",
            restart.resolvent,
            restart.previous,
            restart.constraint
        );
        self.history.push(RestartRecord {
            resolvent: restart.resolvent.clone(),
            previous: restart.previous.clone(),
            constraint: restart.constraint.to_string(),
        });
        if self.history.len() > self.limit {
            return Err(ResolveError::RestartLimitExceeded {
                limit: self.limit,
                history: self.history.iter().map(|r| r.resolvent.to_string()).collect(),
            });
        }

        let preload = restart.preload();
        let entry = self.preloads.entry(restart.resolvent).or_default();
        if !entry.contains(&preload) {
            entry.push(preload);
        }
        Ok(())
    }

    /// Presets for a resolvent, in the order they were learned.
    pub fn preloads_for(&self, resolvent: &Resolvent) -> &[Constraint] {
        self.preloads
            .get(resolvent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn history(&self) -> &[RestartRecord] {
        &self.history
    }
}

impl Default for RestartLedger {
    fn default() -> Self {
        Self::new(20)
    }
}
