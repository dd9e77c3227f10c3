//! Index command: build or refresh the schema embedding index

use crate::app::{open_schema, IndexOrigin};
use crate::config::Config;
use crate::error::Result;
use crate::index::IndexVersion;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub origin: IndexOrigin,
    pub version: IndexVersion,
    pub entries: usize,
    pub tables: usize,
    pub path: String,
    pub elapsed_secs: f64,
}

/// Introspect the database and make sure the index snapshot is current
pub async fn cmd_index(config: &Config, force: bool) -> Result<IndexReport> {
    let started = Instant::now();
    let stack = open_schema(config, force).await?;
    let index = stack.retriever.index();

    info!(
        "Index {} with {} entries",
        match stack.index_origin {
            IndexOrigin::Snapshot => "reused",
            IndexOrigin::Built => "built",
        },
        index.len()
    );

    Ok(IndexReport {
        origin: stack.index_origin,
        version: index.version().clone(),
        entries: index.len(),
        tables: stack.corpus.stats().table_count,
        path: config.paths.index_file.display().to_string(),
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

/// Print index report to console
pub fn print_index_report(report: &IndexReport) {
    match report.origin {
        IndexOrigin::Built => println!("\n✓ Index built"),
        IndexOrigin::Snapshot => println!("\n✓ Index already up to date"),
    }
    println!("  Version: {}", report.version.describe());
    println!("  Fingerprint: {}", report.version.corpus_fingerprint);
    println!("  Entries: {} ({} tables)", report.entries, report.tables);
    println!("  Snapshot: {}", report.path);
    println!("  Time: {:.2}s", report.elapsed_secs);
}
