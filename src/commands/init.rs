//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Written to `[database] url` instead of the default
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub config_path: String,
    pub database_url: String,
    pub overwritten: bool,
}

/// Write a default configuration file
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        database_url,
    } = options;

    let existed = config_path.exists();
    if existed && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path.clone();
    if let Some(url) = database_url {
        config.database.url = url;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.save()?;
    info!("Initialized querywright at {:?}", config.paths.base_dir);

    Ok(InitReport {
        config_path: config_path.display().to_string(),
        database_url: config.database.url,
        overwritten: existed,
    })
}

/// Print init result to console
pub fn print_init(report: &InitReport) {
    println!("✓ querywright initialized successfully");
    println!("  Config: {}", report.config_path);
    println!("  Database: {}", report.database_url);
    println!("\nNext steps:");
    println!("  1. Edit the config file to point [database] url at your SQLite file");
    println!("  2. Export your provider key (GROQ_API_KEY by default)");
    println!("  3. Build the schema index: querywright index");
    println!("  4. Ask away: querywright ask \"How many customers are there?\"");
}
