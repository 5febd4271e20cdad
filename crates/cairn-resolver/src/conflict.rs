//! Rendering resolution failures and suggesting ways out.

use crate::decision::UnresolvableDiagnostic;
use crate::error::{ResolutionSuggestion, ResolveError, UnresolvableReport};
use crate::resolvent::Resolvent;
use cairn_types::MaskKind;

/// Turns failure reports into human-readable text.
pub struct ConflictFormatter;

impl ConflictFormatter {
    /// Render one unresolvable resolvent with its constraints and rejected candidates.
    pub fn format_report(report: &UnresolvableReport) -> String {
        let constraints: Vec<String> = report.constraints.iter().map(ToString::to_string).collect();
        let mut builder = ErrorMessageBuilder::new()
            .add_header(&format!("No decision for {}", report.resolvent))
            .add_list("Constraints", &constraints);

        if report.diagnostic.unsuitable.is_empty() {
            builder = builder.add_section("Candidates", "  none found\n");
        } else {
            let mut lines = Vec::new();
            for unsuitable in &report.diagnostic.unsuitable {
                let mut line = unsuitable.candidate.id();
                if !unsuitable.masks.is_empty() {
                    let masks: Vec<String> = unsuitable.masks.iter().map(ToString::to_string).collect();
                    line.push_str(&format!(" [masked: {}]", masks.join("; ")));
                }
                for unmet in &unsuitable.unmet {
                    line.push_str(&format!("\n      fails {}", unmet));
                }
                lines.push(line);
            }
            builder = builder.add_list("Unsuitable candidates", &lines);
        }

        if !report.diagnostic.notes.is_empty() {
            builder = builder.add_list("Notes", &report.diagnostic.notes);
        }
        builder.add_suggestions(&report.suggestions).build()
    }

    /// Render every report carried by an error, or just its message.
    pub fn format_error(error: &ResolveError) -> String {
        match error {
            ResolveError::CircularDependency { cycle } | ResolveError::RequirementCycle { cycle } => {
                Self::format_cycle(cycle)
            }
            _ if error.reports().is_empty() => error.to_string(),
            _ => error
                .reports()
                .iter()
                .map(Self::format_report)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Suggestions derived from what the rejected candidates failed on.
    pub fn suggest_fixes(
        resolvent: &Resolvent,
        diagnostic: &UnresolvableDiagnostic,
        blocked: bool,
    ) -> Vec<ResolutionSuggestion> {
        let mut suggestions = Vec::new();

        if diagnostic.unsuitable.is_empty() && !blocked {
            suggestions.push(ResolutionSuggestion::CheckName {
                package: resolvent.name.clone(),
            });
        }

        for unsuitable in &diagnostic.unsuitable {
            if let Some(mask) = unsuitable.masks.iter().find(|m| m.kind() != MaskKind::Unavailable) {
                suggestions.push(ResolutionSuggestion::OverrideMask {
                    candidate: unsuitable.candidate.id(),
                    mask: mask.kind().to_string(),
                });
            }
            for unmet in &unsuitable.unmet {
                if let Some(choice) = unmet.strip_prefix("locked choice ") {
                    suggestions.push(ResolutionSuggestion::UnlockChoice {
                        candidate: unsuitable.candidate.id(),
                        choice: choice.to_string(),
                    });
                }
            }
        }

        if diagnostic.notes.iter().any(|n| n.contains("newer than")) {
            suggestions.push(ResolutionSuggestion::AllowDowngrade {
                package: resolvent.name.clone(),
            });
        }

        if blocked {
            suggestions.push(ResolutionSuggestion::PermitUninstall {
                package: resolvent.name.clone(),
            });
        }

        suggestions.dedup();
        suggestions
    }

    /// Format a dependency cycle.
    pub fn format_cycle(cycle: &[String]) -> String {
        let mut output = String::from("Dependency cycle detected:\n\n");

        for (i, node) in cycle.iter().enumerate() {
            if i > 0 {
                output.push_str("  ↓\n");
            }
            output.push_str(&format!("  {}\n", node));
        }

        output
    }
}

/// Helper for building multi-section error messages.
pub struct ErrorMessageBuilder {
    sections: Vec<String>,
}

impl ErrorMessageBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    pub fn add_header(mut self, header: &str) -> Self {
        self.sections.push(format!("{}\n", header));
        self
    }

    pub fn add_section(mut self, title: &str, content: &str) -> Self {
        self.sections.push(format!("{}:\n{}", title, content));
        self
    }

    pub fn add_list(mut self, title: &str, items: &[String]) -> Self {
        let mut section = format!("{}:\n", title);
        for item in items {
            section.push_str(&format!("  • {}\n", item));
        }
        self.sections.push(section);
        self
    }

    pub fn add_suggestions(mut self, suggestions: &[ResolutionSuggestion]) -> Self {
        if suggestions.is_empty() {
            return self;
        }

        let mut section = String::from("Suggestions:\n");
        for (i, suggestion) in suggestions.iter().enumerate() {
            section.push_str(&format!("  {}. {}\n", i + 1, suggestion));
        }
        self.sections.push(section);
        self
    }

    pub fn build(self) -> String {
        self.sections.join("\n")
    }
}

impl Default for ErrorMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::UnsuitableCandidate;
    use crate::error::ConstraintChain;
    use crate::resolvent::SlotKey;
    use cairn_types::{CandidateRecord, DestinationKind, MaskReason, Version};
    use std::sync::Arc;

    fn resolvent() -> Resolvent {
        Resolvent::new("gcc", SlotKey::named("14"), DestinationKind::Filesystem)
    }

    #[test]
    fn test_suggests_mask_override() {
        let diagnostic = UnresolvableDiagnostic {
            unsuitable: vec![UnsuitableCandidate {
                candidate: Arc::new(
                    CandidateRecord::new("gcc", Version::new(14, 0, 0))
                        .with_slot("14")
                        .with_mask(MaskReason::Keyword("~amd64".into())),
                ),
                unmet: vec![],
                masks: vec![MaskReason::Keyword("~amd64".into())],
            }],
            notes: vec![],
        };
        let suggestions = ConflictFormatter::suggest_fixes(&resolvent(), &diagnostic, false);
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].to_string().contains("--override-masks"));
    }

    #[test]
    fn test_suggests_checking_name() {
        let suggestions =
            ConflictFormatter::suggest_fixes(&resolvent(), &UnresolvableDiagnostic::default(), false);
        assert_eq!(
            suggestions,
            vec![ResolutionSuggestion::CheckName {
                package: "gcc".into()
            }]
        );
    }

    #[test]
    fn test_format_report() {
        let report = UnresolvableReport {
            resolvent: resolvent(),
            constraints: vec![ConstraintChain {
                requirement: "gcc@>=14".into(),
                reason: "target gcc@>=14".into(),
                chain: vec![],
            }],
            diagnostic: UnresolvableDiagnostic::default(),
            suggestions: vec![],
        };
        let text = ConflictFormatter::format_report(&report);
        assert!(text.contains("No decision for gcc:14 -> filesystem"));
        assert!(text.contains("gcc@>=14 required by target"));
        assert!(text.contains("none found"));
    }

    #[test]
    fn test_format_cycle() {
        let output = ConflictFormatter::format_cycle(&["a".to_string(), "b".to_string(), "a".to_string()]);
        assert!(output.contains("  a\n  ↓\n  b"));
    }
}
