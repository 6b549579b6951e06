use std::path::PathBuf;

use console::style;

use super::commands::ValidateArgs;
use crate::config::{self, validate_conflicts};
use crate::dimensions::registry::{select, DIMENSIONS};
use crate::errors::ReviewError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), ReviewError> {
    let config = config::parse_config(&PathBuf::from(&args.config)).await?;
    validate_conflicts(&config)?;

    let dimensions = select(&config.dimension_names()?);
    println!("Configuration is valid: {}", args.config);
    println!("  sources:    {}", config.sources.join(", "));
    println!("  arbitrator: {}", config.arbitrator.as_deref().unwrap_or("(none)"));
    println!("  dimensions: {}", dimensions.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", "));
    println!("  isolation:  {:?}", config.isolation().kind);
    Ok(())
}

pub fn handle_dimensions() {
    for dimension in DIMENSIONS.iter() {
        println!(
            "{:<18} {}  (breadth {})",
            style(dimension.name.as_str()).bold(),
            dimension.display_name,
            dimension.breadth
        );
    }
}
