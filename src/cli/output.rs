//! CLI output formatting

use crate::{
    core::{EnvironmentSpec, ExecutionStatus, JobState},
    execution::{ExecutionEvent, JobOutcome},
    persistence::{RecordKind, RunSummary},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "# ");

/// Create a progress bar for a run of `total` jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule across the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout()
        .map(|(w, _)| w)
        .unwrap_or(80);
    "─".repeat(width.min(120))
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Completed { .. } => style("COMPLETED").green().to_string(),
        JobState::Failed { .. } => style("FAILED").red().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    }
}

/// One line of an environment listing
pub fn format_environment(spec: &EnvironmentSpec) -> String {
    let mut line = format!(
        "{} {}",
        style(&spec.id).bold(),
        style(format!("[{}]", spec.runner_strategy)).dim()
    );
    if let Some(python) = &spec.python {
        line.push_str(&format!(" python {}", style(python).cyan()));
    }
    if !spec.extras.is_empty() {
        line.push_str(&format!(" extras {}", style(spec.extras.join(",")).cyan()));
    }
    if let Some(description) = &spec.description {
        line.push_str(&format!(" - {}", description));
    }
    line
}

/// Format an archived record for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let short_id = summary.run_id.to_string();
    let label = match summary.kind {
        RecordKind::Run => style(&summary.workflow).bold().to_string(),
        _ => format!("  {}", style(&summary.subject).cyan()),
    };

    let mut line = format!(
        "{} {} - {} - {}",
        status_icon(summary.status),
        style(&short_id[..8]).dim(),
        label,
        format_status(summary.status),
    );
    if summary.kind == RecordKind::Run {
        line.push_str(&format!(" - {}", style(&summary.subject).dim()));
    }
    if let Some(detail) = &summary.detail {
        line.push_str(&format!(" ({})", style(detail).dim()));
    }
    line
}

/// Format a finished job for the end-of-run summary
pub fn format_job_outcome(outcome: &JobOutcome) -> String {
    match &outcome.state {
        JobState::Completed { commands_run, .. } => format!(
            "{} {} {} ({} command(s))",
            CHECK,
            style(&outcome.env_id).green(),
            format_job_state(&outcome.state),
            commands_run
        ),
        JobState::Failed { error, step, .. } => format!(
            "{} {} {} at {}: {}",
            CROSS,
            style(&outcome.env_id).red(),
            format_job_state(&outcome.state),
            style(step).yellow(),
            style(error).dim()
        ),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted { run_id, workflow, jobs } => format!(
            "{} Starting {} with {} job(s) ({})",
            ROCKET,
            style(workflow).bold(),
            style(jobs).cyan(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::RunSkipped { reason, .. } => {
            format!("{} Skipped: {}", INFO, style(reason).dim())
        }
        ExecutionEvent::JobStarted { env_id } => format!("{} {}", SPINNER, style(env_id).cyan()),
        ExecutionEvent::JobPrepared { env_id, root } => format!(
            "{} {} prepared in {}",
            INFO,
            style(env_id).cyan(),
            style(root.display()).dim()
        ),
        ExecutionEvent::CommandStarted { env_id, command } => {
            format!("  {} {}", style(format!("{}>", env_id)).dim(), command)
        }
        ExecutionEvent::JobCompleted { env_id, commands_run } => format!(
            "{} {} ({} command(s))",
            CHECK,
            style(env_id).green(),
            commands_run
        ),
        ExecutionEvent::JobFailed { env_id, step, error } => format!(
            "{} {} [{}]: {}",
            CROSS,
            style(env_id).red(),
            step,
            style(error).dim()
        ),
        ExecutionEvent::PublicationQueued {
            target,
            concurrency_group,
        } => format!(
            "{} Publishing to {} (group {})",
            PACKAGE,
            style(target).bold(),
            style(concurrency_group).dim()
        ),
        ExecutionEvent::PublicationCompleted { target, url } => format!(
            "{} Published {} at {}",
            CHECK,
            style(target).green(),
            style(url).underlined()
        ),
        ExecutionEvent::PublicationFailed { target, step, error } => format!(
            "{} Publication to {} failed at {}: {}",
            CROSS,
            style(target).red(),
            step,
            style(error).dim()
        ),
        ExecutionEvent::RunCompleted { run_id, status } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format_status(*other),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Whether an event finishes one unit of the progress bar
pub fn is_job_finished(event: &ExecutionEvent) -> bool {
    matches!(
        event,
        ExecutionEvent::JobCompleted { .. } | ExecutionEvent::JobFailed { .. }
    )
}

/// Format command output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_output_truncates() {
        let output = "a\nb\nc\nd";
        assert_eq!(format_output(output, 5), output);

        let truncated = format_output(output, 2);
        assert!(truncated.starts_with("a\nb\n"));
        assert!(truncated.contains("2 more lines"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_job_finished_events() {
        assert!(is_job_finished(&ExecutionEvent::JobCompleted {
            env_id: "py312".to_string(),
            commands_run: 1,
        }));
        assert!(!is_job_finished(&ExecutionEvent::JobStarted {
            env_id: "py312".to_string(),
        }));
    }

    #[test]
    fn test_event_mentions_environment() {
        let line = format_execution_event(&ExecutionEvent::JobFailed {
            env_id: "py311".to_string(),
            step: "commands".to_string(),
            error: "exit code 1".to_string(),
        });
        assert!(line.contains("py311"));
        assert!(line.contains("exit code 1"));
    }
}
