use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;
use tracing::info;

use super::commands::RunArgs;
use super::progress::ReviewProgress;
use crate::audit::AuditLog;
use crate::config::{self, ConfigOverrides};
use crate::errors::ReviewError;
use crate::pipeline::review::{ReviewOutcome, ReviewSession};
use crate::pipeline::run::RunOutcome;
use crate::reporting::ReportWriter;
use crate::utils::formatting::{format_duration, format_percent};

pub async fn handle_run(args: RunArgs, quiet: bool) -> Result<(), ReviewError> {
    let mut config = config::parse_config(&PathBuf::from(&args.config)).await?;
    ConfigOverrides {
        scope: args.scope.clone(),
        sources: args.sources.clone(),
        arbitrator: args.arbitrator.clone(),
        output: args.output.clone(),
    }
    .apply(&mut config);

    let writer = ReportWriter::new(config.output_dir());
    let mut session = ReviewSession::from_config(&config)?;
    let audit = AuditLog::open(&writer.session_dir(session.session_id())).await?;
    session = session.with_audit(Arc::new(audit));
    info!(
        session_id = session.session_id(),
        scope = config.scope(),
        sources = ?config.sources,
        "Starting review"
    );

    let show_progress = !quiet && !args.json;
    let progress_task = if show_progress {
        let (tx, mut rx) = mpsc::unbounded_channel();
        session = session.with_event_channel(tx);
        Some(tokio::spawn(async move {
            let mut progress = ReviewProgress::new();
            while let Some(event) = rx.recv().await {
                progress.handle_event(&event);
            }
            progress.finish();
        }))
    } else {
        None
    };

    let result = session.execute().await;
    let teardown = session.teardown();
    // Dropping the session closes the event channel.
    drop(session);
    if let Some(task) = progress_task {
        let _ = task.await;
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            teardown.wait().await;
            return Err(e);
        }
    };
    let dir = writer.write_session(&outcome).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !quiet {
        print_summary(&outcome);
        println!("\nReports: {}", dir.display());
    }
    teardown.wait().await;
    Ok(())
}

fn print_summary(outcome: &ReviewOutcome) {
    println!("\n{}", style("Runs").bold());
    for (label, run) in outcome.runs.iter() {
        match run {
            RunOutcome::Completed(report) => println!(
                "  {} {:<16} {:>3} findings  {:?}  {}",
                style("✓").green(),
                label.as_str(),
                report.total_findings(),
                report.status,
                format_duration(report.duration_ms()),
            ),
            RunOutcome::Failed(failure) => println!(
                "  {} {:<16} failed during {} ({}): {}",
                style("✗").red(),
                label.as_str(),
                failure.phase,
                failure.error_type,
                failure.message,
            ),
        }
    }

    let comparison = &outcome.comparison;
    println!("\n{}", style("Comparison").bold());
    println!("  overlapping      {}", comparison.overlapping.len());
    for (label, findings) in &comparison.unique_to {
        println!("  only {:<11} {}", label.as_str(), findings.len());
    }
    println!("  agreement        {}", format_percent(comparison.agreement_ratio()));
    println!("  disagreements    {}", comparison.severity_disagreements.len());
    let unresolved = comparison.unresolved().count();
    if unresolved > 0 {
        println!("  {} {} disagreement(s) need review", style("!").yellow(), unresolved);
    }
}
