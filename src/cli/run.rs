// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Run command - run a tool under a root job

use colored::Colorize;
use miette::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::{parse_assignments, GraphFormat, Workspace};
use crate::context::RunContext;
use crate::jobs::{Job, JobRegistry, JobState, MessageLevel};
use crate::manifest::ManifestValidator;
use crate::utils::{create_spinner, print_error, print_section, print_warning};

/// Options of the run command
#[derive(Debug, Default)]
pub struct RunOptions {
    pub tool: Option<String>,
    pub set: Vec<String>,
    pub fail_fast: bool,
    pub dry_run: bool,
    pub manifest: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Run a tool, or the manifest pipeline
pub async fn run(options: RunOptions, verbose: bool) -> Result<()> {
    let mut workspace = Workspace::load(options.manifest.as_deref(), options.config.as_deref())?;
    if options.fail_fast {
        workspace.settings.fail_fast = true;
    }

    let validation = ManifestValidator::validate(&workspace.manifest);
    if !validation.is_valid() {
        eprintln!("{}", "Manifest validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Manifest is invalid"));
    }
    if validation.has_warnings() && verbose {
        eprintln!("{}", "Manifest warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let registry = workspace.registry()?;
    let configuration = parse_assignments(&options.set)?;

    if options.dry_run {
        let graph = workspace.graph(&registry, options.tool.as_deref(), &configuration)?;
        println!("{}", "Dry run, jobs that would run:".bold());
        println!("{}", super::graph::render(&graph, GraphFormat::Text)?);
        return Ok(());
    }

    let tool = workspace.root_tool(&registry, options.tool.as_deref())?;
    let context = RunContext::new(registry).with_settings(workspace.settings.clone());
    let jobs = context.jobs().clone();

    let mut root = Job::new(tool.name(), configuration.clone(), workspace.dir.clone());
    root.execute_environment = tool.environment().name().to_string();
    let handle = jobs.insert(root).await;
    jobs.register_token(handle.id(), context.cancel_token().clone()).await;

    let finished = CancellationToken::new();
    let interrupt = tokio::spawn({
        let jobs = jobs.clone();
        let id = handle.id().to_string();
        let finished = finished.clone();
        async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        tracing::warn!("Interrupted, canceling jobs");
                        if let Err(e) = jobs.cancel(&id, "interrupted by user").await {
                            tracing::warn!(error = %e, "Failed to cancel jobs");
                        }
                    }
                }
            }
        }
    });

    handle.set_state(JobState::Queued, None).await?;
    handle.set_state(JobState::Running, None).await?;

    let spinner = create_spinner(&format!("Running {}", tool.name()));
    let outcome = tool
        .run(Some(&context), Some(&workspace.dir), &configuration, Some(&handle))
        .await;
    spinner.finish_and_clear();
    finished.cancel();
    let _ = interrupt.await;

    match &outcome {
        Ok(()) => {
            handle.set_state(JobState::Done, None).await?;
        }
        Err(e) if e.is_cancelled() => {
            handle.set_state(JobState::Canceled, Some(e.to_string())).await?;
        }
        Err(e) => {
            handle.set_state(JobState::Failed, Some(e.to_string())).await?;
        }
    }
    jobs.unregister_token(handle.id()).await;

    print_job_table(&jobs, handle.id()).await;
    if let Ok(root) = handle.snapshot().await {
        print_messages(&root, verbose);
    }

    match outcome {
        Ok(()) => {
            println!();
            println!("{}", format!("{} completed", tool.name()).green().bold());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the root job and everything it dispatched as an indented tree
async fn print_job_table(jobs: &JobRegistry, root: &str) {
    let all = jobs.list().await;
    let mut children: HashMap<&str, Vec<&Job>> = HashMap::new();
    for job in &all {
        if let Some(ref parent) = job.parent_id {
            children.entry(parent.as_str()).or_default().push(job);
        }
    }

    print_section("Jobs");
    let mut stack: Vec<(&Job, usize)> = all.iter().filter(|j| j.id == root).map(|j| (j, 0)).collect();
    while let Some((job, depth)) = stack.pop() {
        println!("{}{}", "  ".repeat(depth), job_line(job));
        if let Some(kids) = children.get(job.id.as_str()) {
            stack.extend(kids.iter().rev().map(|j| (*j, depth + 1)));
        }
    }
}

fn job_line(job: &Job) -> String {
    let state = job.state();
    let marker = match state {
        JobState::Done => "✓".green(),
        JobState::Failed => "✗".red(),
        JobState::Canceled => "○".dimmed(),
        _ => "→".blue(),
    };
    let stats = job.job_stats();
    let elapsed = match (stats.start_date(), stats.end_date()) {
        (Some(start), Some(end)) => {
            format!(" {:.2}s", (end - start).num_milliseconds() as f64 / 1000.0)
        }
        _ => String::new(),
    };
    let short_id: String = job.id.chars().take(8).collect();

    let mut line = format!(
        "  {} {} {:<8}{} {}",
        marker,
        job.tool_name.bold(),
        state.to_string(),
        elapsed.dimmed(),
        short_id.dimmed()
    );
    if state.is_unsuccessful() {
        if let Some(reason) = job.state_reason() {
            line.push_str(&format!("\n      {}", reason.dimmed()));
        }
    }
    line
}

/// Messages collected on the root job; errors and warnings always, info
/// only when verbose
fn print_messages(root: &Job, verbose: bool) {
    let shown: Vec<_> = root
        .messages()
        .iter()
        .filter(|m| verbose || m.level != MessageLevel::Info)
        .collect();
    if shown.is_empty() {
        return;
    }

    print_section("Messages");
    for message in shown {
        match message.level {
            MessageLevel::Error => print_error(&message.text),
            MessageLevel::Warn => print_warning(&message.text),
            MessageLevel::Info => println!("  {} {}", "→".blue(), message.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Configuration;

    #[test]
    fn test_job_line_shows_reason_of_failed_job() {
        let mut job = Job::new("sort", Configuration::new(), PathBuf::from("/tmp"));
        job.set_state(JobState::Running, None);
        job.set_state(JobState::Failed, Some("exit code 2".into()));

        let line = job_line(&job);
        assert!(line.contains("sort"));
        assert!(line.contains("FAILED"));
        assert!(line.contains("exit code 2"));
    }

    #[test]
    fn test_job_line_of_done_job() {
        let mut job = Job::new("echo", Configuration::new(), PathBuf::from("/tmp"));
        job.set_state(JobState::Done, None);

        let line = job_line(&job);
        assert!(line.contains("DONE"));
        assert!(!line.contains('\n'));
    }
}
