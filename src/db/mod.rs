//! Read-only database access
//!
//! The engine only sees the [`Database`] trait. [`SqliteDatabase`] opens its
//! pool read-only with `query_only` set, so writes fail even if a statement
//! slips past the guard.

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::guard::contains_top_level_keyword;
use crate::schema::{ColumnInfo, ForeignKey, TableInfo, BINARY_PLACEHOLDER};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Rows returned by a successful query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

/// Read-only execution boundary
#[async_trait]
pub trait Database: Send + Sync {
    /// Run one statement. Errors carry the database's own message.
    async fn execute(&self, sql: &str) -> Result<QueryOutput>;

    /// Check the connection
    async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ())
    }
}

/// Append `LIMIT n` unless the outer statement already has a LIMIT
pub fn apply_row_limit(sql: &str, limit: usize) -> String {
    let cleaned = sql
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if contains_top_level_keyword(cleaned, "LIMIT") {
        cleaned.to_string()
    } else {
        format!("{} LIMIT {}", cleaned, limit)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn execution_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => Error::Execution(db.message().to_string()),
        other => Error::Execution(other.to_string()),
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Convert one column of a row to JSON. Blobs become a placeholder.
fn column_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "BLOB" => return Value::String(BINARY_PLACEHOLDER.to_string()),
        "INTEGER" | "BOOLEAN" => {
            if let Ok(v) = row.try_get::<i64, _>(index) {
                return Value::from(v);
            }
        }
        "REAL" | "NUMERIC" => {
            if let Ok(v) = row.try_get::<f64, _>(index) {
                return float_value(v);
            }
        }
        _ => {}
    }

    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return float_value(v);
    }
    Value::String(BINARY_PLACEHOLDER.to_string())
}

fn row_to_map(row: &SqliteRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect()
}

/// SQLite database opened read-only
pub struct SqliteDatabase {
    pool: SqlitePool,
    url: String,
    query_timeout: Duration,
    row_limit: usize,
}

impl SqliteDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .read_only(true)
            .pragma("query_only", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await?;

        info!("Connected to {} (read-only)", config.url);

        Ok(Self {
            pool,
            url: config.url.clone(),
            query_timeout: config.query_timeout(),
            row_limit: config.row_limit,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Describe every user table: columns, foreign keys, row count and samples
    pub async fn introspect(&self, sample_rows: usize) -> Result<Vec<TableInfo>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            tables.push(self.describe_table(&name, sample_rows).await?);
        }

        info!("Introspected {} tables", tables.len());
        Ok(tables)
    }

    async fn describe_table(&self, name: &str, sample_rows: usize) -> Result<TableInfo> {
        let quoted = quote_ident(name);

        let columns = sqlx::query("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1)")
            .bind(name)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<ColumnInfo> {
                let data_type: String = row.try_get("type")?;
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: if data_type.is_empty() {
                        "ANY".to_string()
                    } else {
                        data_type
                    },
                    nullable: row.try_get::<i64, _>("notnull")? == 0,
                    primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let foreign_keys = sqlx::query(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<ForeignKey> {
            Ok(ForeignKey {
                column: row.try_get("from")?,
                referenced_table: row.try_get("table")?,
                // NULL when the key targets the parent's primary key implicitly
                referenced_column: row
                    .try_get::<Option<String>, _>("to")?
                    .unwrap_or_else(|| "rowid".to_string()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quoted))
            .fetch_one(&self.pool)
            .await?;

        let sample_rows = if sample_rows == 0 {
            Vec::new()
        } else {
            sqlx::query(&format!("SELECT * FROM {} LIMIT {}", quoted, sample_rows))
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(row_to_map)
                .collect()
        };

        debug!(
            "Table {}: {} columns, {} rows",
            name,
            columns.len(),
            row_count
        );

        Ok(TableInfo {
            name: name.to_string(),
            row_count,
            columns,
            foreign_keys,
            sample_rows,
        })
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let sql = apply_row_limit(sql, self.row_limit);
        debug!("Executing: {}", sql);

        let run = async {
            let rows = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(execution_error)?;

            let columns = match rows.first() {
                Some(first) => first
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
                None => self
                    .pool
                    .describe(&sql)
                    .await
                    .map_err(execution_error)?
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            };

            let rows: Vec<Map<String, Value>> = rows.iter().map(row_to_map).collect();
            Ok::<_, Error>(QueryOutput {
                columns,
                row_count: rows.len(),
                rows,
            })
        };

        match tokio::time::timeout(self.query_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(Error::Execution(format!(
                "query timed out after {}s",
                self.query_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteJournalMode;
    use tempfile::TempDir;

    async fn fixture(dir: &TempDir) -> DatabaseConfig {
        let path = dir.path().join("shop.db");
        let url = format!("sqlite://{}", path.display());

        let writable = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::from_str(&url)
                    .unwrap()
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete),
            )
            .await
            .unwrap();
        for statement in [
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, company TEXT NOT NULL, city TEXT, logo BLOB)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers(id), shipping_fee REAL)",
            "INSERT INTO customers (company, city, logo) VALUES ('Company A', 'Seattle', x'00ff'), ('Company B', NULL, NULL), ('Company C', 'Boston', NULL), ('Company D', 'Denver', NULL)",
            "INSERT INTO orders (customer_id, shipping_fee) VALUES (1, 12.5), (1, 0.0), (3, 7.25)",
        ] {
            sqlx::query(statement).execute(&writable).await.unwrap();
        }
        writable.close().await;

        DatabaseConfig {
            url,
            row_limit: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_row_limit() {
        assert_eq!(apply_row_limit("SELECT 1;", 50), "SELECT 1 LIMIT 50");
        assert_eq!(
            apply_row_limit("select * from t limit 5;", 50),
            "select * from t limit 5"
        );
        assert_eq!(
            apply_row_limit("SELECT 'limit' FROM t", 10),
            "SELECT 'limit' FROM t LIMIT 10"
        );
    }

    #[test]
    fn test_row_limit_ignores_nested_limits() {
        assert_eq!(
            apply_row_limit("SELECT * FROM orders WHERE customer_id IN (SELECT id FROM customers LIMIT 2);", 50),
            "SELECT * FROM orders WHERE customer_id IN (SELECT id FROM customers LIMIT 2) LIMIT 50"
        );
        assert_eq!(
            apply_row_limit("WITH top AS (SELECT id FROM customers LIMIT 2) SELECT * FROM top", 10),
            "WITH top AS (SELECT id FROM customers LIMIT 2) SELECT * FROM top LIMIT 10"
        );
    }

    #[tokio::test]
    async fn test_execute_converts_values_and_applies_limit() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();

        let output = db
            .execute("SELECT id, company, city, logo FROM customers ORDER BY id;")
            .await
            .unwrap();
        assert_eq!(output.columns, vec!["id", "company", "city", "logo"]);
        assert_eq!(output.row_count, 3);
        assert_eq!(output.rows[0]["id"], Value::from(1));
        assert_eq!(output.rows[0]["logo"], Value::from(BINARY_PLACEHOLDER));
        assert_eq!(output.rows[1]["city"], Value::Null);

        let fees = db
            .execute("SELECT shipping_fee FROM orders ORDER BY id")
            .await
            .unwrap();
        assert_eq!(fees.rows[0]["shipping_fee"], Value::from(12.5));
    }

    #[tokio::test]
    async fn test_aggregate_count() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();
        let output = db
            .execute("SELECT COUNT(*) AS count FROM customers;")
            .await
            .unwrap();
        assert_eq!(output.row_count, 1);
        assert_eq!(output.rows[0]["count"], Value::from(4));
    }

    #[tokio::test]
    async fn test_empty_result_keeps_columns() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();
        let output = db
            .execute("SELECT id, company FROM customers WHERE city = 'Nowhere'")
            .await
            .unwrap();
        assert_eq!(output.row_count, 0);
        assert_eq!(output.columns, vec!["id", "company"]);
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();
        let err = db.execute("DELETE FROM customers").await.unwrap_err();
        assert!(matches!(err, Error::Execution(_)));

        let still_there = db.execute("SELECT COUNT(*) AS n FROM customers").await.unwrap();
        assert_eq!(still_there.rows[0]["n"], Value::from(4));
    }

    #[tokio::test]
    async fn test_database_error_text_is_kept() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();
        let err = db.execute("SELECT company_name FROM customers").await.unwrap_err();
        assert!(matches!(err, Error::Execution(msg) if msg.contains("no such column: company_name")));
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_introspect() {
        let dir = TempDir::new().unwrap();
        let db = SqliteDatabase::connect(&fixture(&dir).await).await.unwrap();
        let tables = db.introspect(2).await.unwrap();

        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);

        let customers = &tables[0];
        assert_eq!(customers.row_count, 4);
        assert_eq!(customers.sample_rows.len(), 2);
        assert!(customers.columns[0].primary_key);
        assert!(!customers.columns[1].nullable);
        assert_eq!(customers.columns[1].data_type, "TEXT");

        let orders = &tables[1];
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].column, "customer_id");
        assert_eq!(orders.foreign_keys[0].referenced_table, "customers");
        assert_eq!(orders.foreign_keys[0].referenced_column, "id");
    }
}
