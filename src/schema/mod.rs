//! Schema corpus
//!
//! Turns table metadata into the immutable [`SchemaFragment`]s that are
//! embedded into the index and handed to the prompt as retrieved context.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::path::Path;
use tracing::{debug, info};

/// An immutable unit of schema documentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFragment {
    pub id: String,
    pub text: String,
    pub source_table: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A column as reported by introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A foreign key edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Introspected description of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub sample_rows: Vec<Map<String, Value>>,
}

/// Sample rows shown in a fragment
const FRAGMENT_SAMPLE_ROWS: usize = 3;

impl SchemaFragment {
    /// Fragment id for a table
    pub fn table_id(table: &str) -> String {
        format!("table_{}", table)
    }

    /// Render a table description into a fragment
    pub fn from_table(table: &TableInfo) -> Self {
        let mut text = String::new();
        let _ = writeln!(text, "Table: {}", table.name);
        let _ = writeln!(text, "Row count: {}", table.row_count);
        let _ = writeln!(text, "Columns:");
        for col in &table.columns {
            let nullable = if col.nullable { "nullable" } else { "not null" };
            let key = if col.primary_key { " (PRIMARY KEY)" } else { "" };
            let data_type = if col.data_type.is_empty() {
                "ANY"
            } else {
                col.data_type.as_str()
            };
            let _ = writeln!(text, "  - {}: {}, {}{}", col.name, data_type, nullable, key);
        }

        if !table.foreign_keys.is_empty() {
            let _ = writeln!(text, "Foreign Keys:");
            for fk in &table.foreign_keys {
                let _ = writeln!(
                    text,
                    "  - {} → {}.{}",
                    fk.column, fk.referenced_table, fk.referenced_column
                );
            }
        }

        if !table.sample_rows.is_empty() {
            let _ = writeln!(text, "Sample Data:");
            for (i, row) in table.sample_rows.iter().take(FRAGMENT_SAMPLE_ROWS).enumerate() {
                let clean: Map<String, Value> = row
                    .iter()
                    .filter(|(_, v)| !v.is_null() && v.as_str() != Some(BINARY_PLACEHOLDER))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let _ = writeln!(text, "  Row {}: {}", i + 1, Value::Object(clean));
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("table_name".to_string(), table.name.clone());
        metadata.insert("row_count".to_string(), table.row_count.to_string());
        metadata.insert("column_count".to_string(), table.columns.len().to_string());

        Self {
            id: Self::table_id(&table.name),
            text,
            source_table: table.name.clone(),
            metadata,
        }
    }
}

/// Placeholder used for binary column values
pub const BINARY_PLACEHOLDER: &str = "<binary data>";

/// The full, read-only set of fragments prepared at startup
#[derive(Debug, Clone, Default)]
pub struct SchemaCorpus {
    fragments: Vec<SchemaFragment>,
    tables: Vec<TableInfo>,
}

/// Aggregate counts over the introspected tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusStats {
    pub table_count: usize,
    pub total_rows: i64,
    pub total_columns: usize,
    pub fragment_count: usize,
}

impl SchemaCorpus {
    /// Build a corpus from introspected tables, skipping excluded ones
    pub fn from_tables(tables: Vec<TableInfo>, exclude: &[String]) -> Self {
        let tables: Vec<TableInfo> = tables
            .into_iter()
            .filter(|t| !exclude.iter().any(|e| e.eq_ignore_ascii_case(&t.name)))
            .collect();
        let fragments = tables.iter().map(SchemaFragment::from_table).collect();
        Self { fragments, tables }
    }

    /// Build a corpus from pre-written fragments only
    pub fn from_fragments(fragments: Vec<SchemaFragment>) -> Result<Self> {
        let mut corpus = Self::default();
        corpus.extend(fragments)?;
        Ok(corpus)
    }

    /// Add curated fragments; ids must stay unique
    pub fn extend(&mut self, fragments: Vec<SchemaFragment>) -> Result<()> {
        let mut seen: HashSet<String> = self.fragments.iter().map(|f| f.id.clone()).collect();
        for fragment in fragments {
            if !seen.insert(fragment.id.clone()) {
                return Err(Error::DuplicateFragment(fragment.id));
            }
            self.fragments.push(fragment);
        }
        Ok(())
    }

    /// Merge curated fragments from a JSON file
    pub fn load_curated(&mut self, path: &Path) -> Result<usize> {
        debug!("Loading curated schema fragments from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let fragments: Vec<SchemaFragment> = serde_json::from_str(&content)?;
        let count = fragments.len();
        self.extend(fragments)?;
        info!("Loaded {} curated schema fragments", count);
        Ok(count)
    }

    pub fn fragments(&self) -> &[SchemaFragment] {
        &self.fragments
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Distinct table names covered by the corpus, in corpus order
    pub fn table_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.fragments
            .iter()
            .filter(|f| seen.insert(f.source_table.clone()))
            .map(|f| f.source_table.clone())
            .collect()
    }

    /// All fragments documenting a table (case-insensitive)
    pub fn fragments_for_table(&self, table: &str) -> Vec<&SchemaFragment> {
        self.fragments
            .iter()
            .filter(|f| f.source_table.eq_ignore_ascii_case(table))
            .collect()
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            table_count: self.table_names().len(),
            total_rows: self.tables.iter().map(|t| t.row_count).sum(),
            total_columns: self.tables.iter().map(|t| t.columns.len()).sum(),
            fragment_count: self.fragments.len(),
        }
    }
}
