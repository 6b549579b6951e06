use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::commands::CompareArgs;
use crate::compare::{Arbitrator, Comparator, EngineArbitrator};
use crate::config::{self, ReviewConfig};
use crate::engine::create_engine;
use crate::errors::ReviewError;
use crate::isolation::create_provider;
use crate::models::finding::SourceId;
use crate::reporting::{read_run_report, write_comparison};

/// Compare reports from earlier sessions without re-running any engine.
pub async fn handle_compare(args: CompareArgs, quiet: bool) -> Result<(), ReviewError> {
    let mut reports = Vec::with_capacity(args.reports.len());
    for path in &args.reports {
        reports.push(read_run_report(&PathBuf::from(path)).await?);
    }

    let config = match &args.config {
        Some(path) => Some(config::parse_config(&PathBuf::from(path)).await?),
        None => None,
    };
    let arbitrator_id = args
        .arbitrator
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.arbitrator.clone()));
    let arbitrator = match (arbitrator_id, &config) {
        (Some(id), Some(config)) => Some(build_arbitrator(&id, config)?),
        (Some(id), None) => {
            return Err(ReviewError::Config(format!(
                "Arbitrator '{}' needs --config to locate its engine",
                id
            )))
        }
        (None, _) => None,
    };

    let tolerance = config
        .as_ref()
        .map(|c| c.run_limits().position_tolerance)
        .unwrap_or(crate::merge::DEFAULT_POSITION_TOLERANCE);
    let result = Comparator::new(arbitrator).with_tolerance(tolerance).compare(&reports).await?;

    let output = args
        .output
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./reviews").join(format!("compare-{}", uuid::Uuid::new_v4().simple())));
    write_comparison(&output, &result).await?;
    info!(dir = %output.display(), reports = reports.len(), "Comparison written");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !quiet {
        println!(
            "{} overlapping, {} unique, {} disagreements ({} need review)",
            result.overlapping.len(),
            result.unique_count(),
            result.severity_disagreements.len(),
            result.unresolved().count()
        );
        println!("Comparison: {}", output.display());
    }
    Ok(())
}

fn build_arbitrator(id: &str, config: &ReviewConfig) -> Result<Arc<dyn Arbitrator>, ReviewError> {
    let engine_config = config
        .engine(id)
        .ok_or_else(|| ReviewError::Config(format!("Arbitrator '{}' names no configured engine", id)))?;
    let limits = config.run_limits();
    let engine = create_engine(engine_config, limits.engine_timeout)?;
    let arbitrator: Arc<dyn Arbitrator> = Arc::new(EngineArbitrator::new(
        SourceId::new(id),
        engine,
        create_provider(&config.isolation()),
        config.scope(),
        limits.engine_timeout,
    ));
    Ok(arbitrator)
}
