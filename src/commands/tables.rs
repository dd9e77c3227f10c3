//! Schema browsing commands: tables, describe, retrieve

use crate::error::{Error, Result};
use crate::retrieve::Retriever;
use crate::schema::SchemaCorpus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One indexed table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    /// None for tables known only from curated fragments
    pub row_count: Option<i64>,
    pub column_count: Option<usize>,
    pub fragment_count: usize,
}

/// List tables covered by the corpus
pub fn cmd_tables(corpus: &SchemaCorpus) -> Vec<TableSummary> {
    corpus
        .table_names()
        .into_iter()
        .map(|name| {
            let info = corpus.tables().iter().find(|t| t.name == name);
            TableSummary {
                row_count: info.map(|t| t.row_count),
                column_count: info.map(|t| t.columns.len()),
                fragment_count: corpus.fragments_for_table(&name).len(),
                name,
            }
        })
        .collect()
}

/// A table's schema documentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub table: String,
    pub fragments: Vec<DescribedFragment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribedFragment {
    pub id: String,
    pub text: String,
}

/// Describe one table
pub fn cmd_describe(corpus: &SchemaCorpus, table: &str) -> Result<TableDescription> {
    let fragments = corpus.fragments_for_table(table);
    let Some(first) = fragments.first() else {
        return Err(Error::TableNotFound(table.to_string()));
    };

    Ok(TableDescription {
        table: first.source_table.clone(),
        fragments: fragments
            .iter()
            .map(|f| DescribedFragment {
                id: f.id.clone(),
                text: f.text.clone(),
            })
            .collect(),
    })
}

/// A retrieved fragment with its score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedFragment {
    pub id: String,
    pub table: String,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub question: String,
    pub k: usize,
    pub results: Vec<RetrievedFragment>,
}

/// Show which schema fragments a question would be given
pub async fn cmd_retrieve(retriever: &Retriever, question: &str, k: usize) -> Result<RetrievalResult> {
    info!("Retrieving schema for: {}", question);
    let scored = retriever.retrieve_scored(question, k).await?;

    Ok(RetrievalResult {
        question: question.to_string(),
        k,
        results: scored
            .into_iter()
            .map(|s| RetrievedFragment {
                id: s.fragment.id,
                table: s.fragment.source_table,
                score: s.score,
                text: s.fragment.text,
            })
            .collect(),
    })
}

/// Print table list to console
pub fn print_tables(tables: &[TableSummary]) {
    println!("\n🗂  Indexed Tables\n");

    if tables.is_empty() {
        println!("No tables found. Check [database] url and [schema] exclude_tables.");
        return;
    }

    for table in tables {
        match (table.row_count, table.column_count) {
            (Some(rows), Some(columns)) => {
                println!("• {} ({} rows, {} columns)", table.name, rows, columns)
            }
            _ => println!("• {} (curated)", table.name),
        }
    }
}

/// Print table description to console
pub fn print_description(description: &TableDescription) {
    println!("\n📋 {}\n", description.table);
    for fragment in &description.fragments {
        println!("[{}]", fragment.id);
        println!("{}\n", fragment.text);
    }
}

/// Print retrieval results to console
pub fn print_retrieval(result: &RetrievalResult) {
    println!("\n🔍 Question: {}\n", result.question);
    println!("Top {} fragments:\n", result.results.len());

    for (i, r) in result.results.iter().enumerate() {
        println!("{}. [score: {:.3}] {}", i + 1, r.score, r.id);
        let first_line = r.text.lines().next().unwrap_or_default();
        println!("   {}\n", first_line);
    }
}
