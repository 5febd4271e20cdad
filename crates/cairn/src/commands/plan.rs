//! Showing a resolved plan and carrying it out.

use super::args::ExecArgs;
use super::context::Context;
use super::ui;
use cairn_diagnostics::CairnError;
use cairn_exec::{ExecutionReport, JobStatus};
use cairn_resolver::{ChangeKind, Decision, JobKind, Resolved};
use console::style;

fn change_label(change: ChangeKind) -> console::StyledObject<String> {
    let text = format!("{:>9}", change.to_string());
    match change {
        ChangeKind::New | ChangeKind::NewSlot => style(text).green(),
        ChangeKind::Upgrade => style(text).cyan(),
        ChangeKind::Downgrade => style(text).yellow(),
        ChangeKind::Reinstall => style(text).dim(),
    }
}

/// Print decisions in execution order, then suggestions and warnings.
pub fn print_plan(resolved: &Resolved) {
    let mut installs = 0;
    let mut removals = 0;

    for job in resolved.jobs().ordered() {
        match &job.kind {
            JobKind::Install {
                candidate,
                destination,
                ..
            } => {
                installs += 1;
                if installs + removals == 1 {
                    ui::header("These changes will be made:");
                }
                let decision = resolved
                    .resolution(&job.resolvent)
                    .and_then(|r| r.decision.as_ref());
                let mut line = String::new();
                if let Some(Decision::Install {
                    change,
                    choice_changes,
                    mask_overrides,
                    ..
                }) = decision
                {
                    line.push_str(&format!("  {} {}", change_label(*change), ui::pkg(candidate)));
                    if !choice_changes.is_empty() {
                        let changes: Vec<String> = choice_changes.iter().map(ToString::to_string).collect();
                        line.push_str(&format!(" [{}]", style(changes.join(" ")).yellow()));
                    }
                    if !mask_overrides.is_empty() {
                        line.push_str(&format!(" {}", style("(masked)").red()));
                    }
                } else {
                    line.push_str(&format!("  {:>9} {}", "install", ui::pkg(candidate)));
                }
                line.push_str(&format!(" {}", ui::dim(format!("to {}", destination))));
                println!("{}", line);
            }
            JobKind::Uninstall { removing } => {
                removals += 1;
                if installs + removals == 1 {
                    ui::header("These changes will be made:");
                }
                for candidate in removing {
                    println!("  {} {}", style(format!("{:>9}", "uninstall")).red(), ui::pkg(candidate));
                }
            }
            JobKind::Fetch { .. } => {}
        }
    }

    if installs + removals == 0 {
        ui::success("Nothing to do");
    } else {
        println!();
        ui::info(format!("{} to install, {} to remove", installs, removals));
    }

    for suggestion in resolved.suggestions() {
        if let Some(Decision::Install { candidate, .. }) = &suggestion.decision {
            ui::hint(format!("{} is suggested but will not be installed", ui::pkg(candidate)));
        }
    }
    for warning in resolved.warnings() {
        ui::warn(warning);
    }
    if !resolved.restarts().is_empty() {
        ui::hint(format!("Resolved after {} restarts", resolved.restarts().len()));
    }
}

async fn execute(ctx: &Context, resolved: &Resolved, exec: &ExecArgs) -> Result<ExecutionReport, CairnError> {
    let executor = ctx.executor(exec)?;
    let fetch_only = executor.options().fetch_only;
    let total = resolved
        .jobs()
        .jobs()
        .iter()
        .filter(|job| !fetch_only || job.is_fetch())
        .count();

    let bar = ui::progress(total as u64, ctx.quiet());
    let progress = bar.clone();
    let report = executor
        .execute(resolved.jobs(), move |label, status| match status {
            JobStatus::Started => progress.set_message(label.to_string()),
            JobStatus::Failed(message) => {
                progress.println(format!("{} {}: {}", style("✗").red().bold(), label, message));
                progress.inc(1);
            }
            JobStatus::Succeeded | JobStatus::Skipped => progress.inc(1),
        })
        .await;
    bar.finish_and_clear();
    Ok(report)
}

fn print_report(report: &ExecutionReport) {
    for failure in report.failures() {
        ui::error(&failure.description);
    }
    let skipped = report.summary().skipped;
    if skipped > 0 {
        ui::warn(format!("{} jobs were skipped after failures", skipped));
    }
    if report.success() {
        ui::success(report.summary());
    } else {
        ui::error(report.summary());
    }
}

/// Print the plan and, unless pretending, execute it.
///
/// Returns whether anything was executed.
pub async fn carry_out(ctx: &Context, resolved: &Resolved, exec: &ExecArgs) -> Result<bool, CairnError> {
    print_plan(resolved);
    if exec.pretend || resolved.jobs().is_empty() {
        return Ok(false);
    }

    let report = execute(ctx, resolved, exec).await?;
    print_report(&report);
    let summary = report.summary();
    if !report.success() {
        return Err(CairnError::execution_failed(summary.failed, summary.total));
    }
    Ok(true)
}
