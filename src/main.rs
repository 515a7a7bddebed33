use anyhow::{Context, Result};
use envflow::cli::commands::{GateCommand, HistoryCommand, ListCommand, PublishCommand, RunCommand, ValidateCommand};
use envflow::cli::output::*;
use envflow::cli::{Cli, Command};
use envflow::core::config::OrchestrationConfig;
use envflow::execution::{ExecutionEngine, PublicationOutcome, RunReport, Workflow, WorkflowOutcome};
use envflow::persistence::{
    skipped_summary, summaries_from_publication, summaries_from_report, InMemoryPersistence,
    PersistenceBackend, RecordKind, RunSummary,
};
use envflow::publication::{DirectoryHost, PublicationJob, PublicationPipeline};
use envflow::resolver::{StrategyResolver, WorkspaceLayout};
use envflow::runner::{RunnerConfig, SubprocessRunner};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(&cli, cmd).await?,
        Command::List(cmd) => list_environments(&cli, cmd)?,
        Command::Validate(cmd) => validate_config(&cli, cmd)?,
        Command::Gate(cmd) => check_gate(&cli, cmd)?,
        Command::Publish(cmd) => publish_artifact(&cli, cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<OrchestrationConfig> {
    OrchestrationConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))
}

#[cfg(feature = "sqlite")]
async fn open_store(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if ephemeral {
        Ok(Arc::new(InMemoryPersistence::new()))
    } else {
        Ok(Arc::new(envflow::persistence::SqliteExecutionStore::with_default_path().await?))
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_workflow(cli: &Cli, cmd: &RunCommand) -> Result<()> {
    let config = load_config(cli)?;
    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let project_dir = cli.project_dir(cmd.project_dir.as_ref());
    let mut runner_config = RunnerConfig::new();
    if let Some(secs) = cmd.timeout {
        runner_config = runner_config.with_timeout(secs);
    }

    let engine = ExecutionEngine::new(
        SubprocessRunner::new(runner_config),
        StrategyResolver::new(WorkspaceLayout::new(&project_dir)),
        cmd.scheduling_strategy(),
    );
    let workflow = Workflow::from_config(&config, engine)?;
    let event = cmd.trigger.to_event(workflow.gate())?;

    // Resolve the selection up front so the progress bar knows its length
    let total = workflow.registry().select(&cmd.envs)?.len();
    let progress = create_progress_bar(total);
    let bar = progress.clone();
    workflow.engine().add_event_handler(move |event| {
        bar.println(format_execution_event(&event));
        if is_job_finished(&event) {
            bar.inc(1);
        }
    });

    let outcome = workflow.dispatch(&event, &cmd.envs, &cmd.posargs).await?;
    progress.finish_and_clear();

    match &outcome {
        WorkflowOutcome::Skipped { run_id, reason } => {
            if cmd.archives_skipped() {
                open_store(false)
                    .await?
                    .save_record(&skipped_summary(workflow.name(), *run_id, reason))
                    .await?;
            }
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "{} {} not admitted: {}",
                    INFO,
                    style(workflow.name()).bold(),
                    style(reason).dim()
                );
            }
            Ok(())
        }
        WorkflowOutcome::Completed(report) => {
            let store = open_store(cmd.no_history).await?;
            store.save_records(&summaries_from_report(report)).await?;
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_report(report, cmd.no_history);
            }

            if !report.is_success() {
                for job in report.failed_jobs() {
                    if let Some(err) = &job.error {
                        error!("{}", err);
                    }
                }
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn print_report(report: &RunReport, ephemeral: bool) {
    println!("\n{}", style(separator()).dim());
    for job in &report.jobs {
        println!("{}", format_job_outcome(job));
    }
    if let Some(publication) = &report.publication {
        match (&publication.result, &publication.failure) {
            (Some(result), _) => println!(
                "{} {} -> {}",
                CHECK,
                style(&publication.target).green(),
                style(&result.url).underlined()
            ),
            (None, failure) => println!(
                "{} {} {}",
                CROSS,
                style(&publication.target).red(),
                style(failure.as_deref().unwrap_or("failed")).dim()
            ),
        }
    }

    if let (Some(started), Some(completed)) = (report.state.started_at, report.state.completed_at) {
        if let Ok(duration) = completed.signed_duration_since(started).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    if !ephemeral {
        println!(
            "{} Run saved to history (ID: {})",
            INFO,
            style(&report.state.run_id.to_string()[..8]).dim()
        );
    }

    if report.is_success() {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&report.workflow).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {} ({} of {} failed)",
            CROSS,
            style(&report.workflow).bold(),
            style("failed").red(),
            report.state.failed_jobs,
            report.state.total_jobs
        );
    }
}

fn list_environments(cli: &Cli, cmd: &ListCommand) -> Result<()> {
    let config = load_config(cli)?;
    let registry = config.to_registry()?;
    let resolver = StrategyResolver::new(WorkspaceLayout::new(cli.project_dir(None)));

    if cmd.json {
        let mut entries = Vec::new();
        for spec in registry.iter() {
            let mut entry = serde_json::to_value(spec)?;
            if cmd.plan {
                entry["sync_plan"] = serde_json::to_value(resolver.plan(spec)?)?;
            }
            entries.push(entry);
        }
        let data = serde_json::json!({ "workflow": config.name, "environments": entries });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} {} declares {} environment(s):",
        INFO,
        style(&config.name).bold(),
        style(registry.len()).cyan()
    );
    for spec in registry.iter() {
        println!("  {}", format_environment(spec));
        if cmd.plan {
            for argv in resolver.plan(spec)? {
                println!("    {} {}", style("sync>").dim(), argv.join(" "));
            }
            for argv in spec.command_lines(&[]) {
                println!("    {} {}", style("run>").dim(), argv.join(" "));
            }
        }
    }

    Ok(())
}

fn validate_config(cli: &Cli, cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating {}...", INFO, cli.config.display());

    match OrchestrationConfig::from_file(&cli.config) {
        Ok(config) => {
            let registry = config.to_registry()?;
            println!("{} Configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Matrices: {}", style(config.matrix.len()).cyan());
            println!("  Environments: {}", style(registry.len()).cyan());
            println!(
                "  Gate: {}",
                match &config.gate {
                    Some(gate) => format!("{} on {}", gate.repository, gate.branch),
                    None => "none".to_string(),
                }
            );
            if let Some(publication) = &config.publication {
                println!(
                    "  Publication: {} -> {} (group {})",
                    style(&publication.environment).cyan(),
                    style(&publication.target).bold(),
                    publication.concurrency_group
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn check_gate(cli: &Cli, cmd: &GateCommand) -> Result<()> {
    let config = load_config(cli)?;
    let gate = config.trigger_gate()?;
    let event = cmd.trigger.to_event(gate.as_ref())?;

    let Some(gate) = gate else {
        println!("{} No gate configured; every event is admitted", INFO);
        return Ok(());
    };

    match gate.rejection_reason(&event) {
        None => println!(
            "{} {} on {} in {} is admitted",
            CHECK,
            style(event.event_type).cyan(),
            style(event.branch()).bold(),
            event.repository
        ),
        Some(reason) => {
            println!("{} Not admitted: {}", CROSS, style(reason).dim());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn publish_artifact(cli: &Cli, cmd: &PublishCommand) -> Result<()> {
    let config = load_config(cli)?;
    let project_dir = cli.project_dir(cmd.project_dir.as_ref());
    let settings = config
        .publication
        .as_ref()
        .context("Configuration has no publication section")?;
    let registry = config.to_registry()?;

    let artifact = match &cmd.artifact {
        Some(path) => path.clone(),
        None => {
            let spec = registry.resolve(&settings.environment)?;
            let dir = spec
                .artifact_dir
                .as_ref()
                .with_context(|| format!("Environment {} declares no artifact_dir", spec.id))?;
            project_dir.join(dir)
        }
    };

    let site_root = cmd
        .site_root
        .clone()
        .unwrap_or_else(|| settings.site_root_in(&project_dir));
    let pipeline = PublicationPipeline::new(Arc::new(DirectoryHost::new(site_root)));
    let job = PublicationJob::new(
        &settings.environment,
        artifact,
        cmd.target.clone().unwrap_or_else(|| settings.target.clone()),
        cmd.group.clone().unwrap_or_else(|| settings.concurrency_group.clone()),
    );

    println!(
        "{} Publishing {} to {} (group {})",
        PACKAGE,
        style(job.artifact.display()).dim(),
        style(&job.target).bold(),
        job.concurrency_group
    );

    let started_at = chrono::Utc::now();
    let outcome = PublicationOutcome::new(&job, pipeline.publish(&job).await);

    let store = open_store(cmd.no_history).await?;
    store
        .save_records(&summaries_from_publication(&config.name, &outcome, started_at))
        .await?;

    match (&outcome.result, &outcome.error) {
        (Some(result), _) => {
            println!(
                "{} Published {} file(s) to {}",
                CHECK,
                style(result.files).cyan(),
                style(&result.url).underlined()
            );
            Ok(())
        }
        (None, err) => {
            if let Some(err) = err {
                error!("{}", err);
            }
            println!("{} Publication failed", CROSS);
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store(false).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        let records = store.load_run(run_id).await?;

        if records.is_empty() {
            println!("{} Run not found", WARN);
        } else if cmd.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else {
            print_run_details(&records);
        }
        return Ok(());
    }

    let mut runs = match &cmd.workflow {
        Some(workflow) => store.list_runs(workflow).await?,
        None => {
            let mut all = Vec::new();
            for workflow in store.list_workflows().await? {
                all.extend(store.list_runs(&workflow).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, runs.len());
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(records: &[RunSummary]) {
    for record in records {
        if record.kind == RecordKind::Run {
            println!("{} Run Details", INFO);
            println!("  ID: {}", style(record.run_id).cyan());
            println!("  Workflow: {}", style(&record.workflow).bold());
            println!("  Status: {}", format_status(record.status));
            println!("  Started: {}", style(record.started_at.to_rfc3339()).dim());
            if let Some(completed) = record.completed_at {
                println!("  Completed: {}", style(completed.to_rfc3339()).dim());
                if let Ok(duration) = completed.signed_duration_since(record.started_at).to_std() {
                    println!("  Duration: {}", style(format_duration(duration)).dim());
                }
            }
        } else {
            println!("  {}", format_run_summary(record));
        }
    }
}
