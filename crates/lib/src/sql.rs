//! Natural-language to SQL: describe the schema to the completion backend, run the SQL it
//! writes, and return the rows as JSON records.
//!
//! [`SqlTranslator::translate_and_execute`] never fails; every internal error becomes
//! [`QueryOutcome::Failed`].

use crate::catalog::fenced_block;
use crate::config::DatabaseConfig;
use crate::llm::{ChatMessage, CompletionBackend, LlmError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const SQL_SYSTEM_PROMPT: &str = "You translate questions into a single PostgreSQL SELECT statement for the tables described. Reply with the SQL only, without explanations.";

/// Result of one data query, rendered with `Display` for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows { query: String, records: Vec<Value> },
    Failed { error: String },
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Rows { query, records } => {
                let json = serde_json::to_string(records).map_err(|_| fmt::Error)?;
                write!(f, "Query: {}\nResult: {}", query, json)
            }
            QueryOutcome::Failed { error } => write!(f, "Query failed: {}", error),
        }
    }
}

/// Answers a natural-language question from the database.
#[async_trait]
pub trait SqlTranslator: Send + Sync {
    async fn translate_and_execute(&self, question: &str) -> QueryOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Completion(#[from] LlmError),
    #[error("model returned no query")]
    EmptyQuery,
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// One row of `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub character_maximum_length: Option<i32>,
    pub is_nullable: bool,
}

/// `### postgres SQL tables...` header plus one `# table(col type(len) NOT NULL, ...)` line per
/// table, in first-seen order.
pub fn table_definitions(columns: &[ColumnInfo]) -> String {
    let mut tables: Vec<(&str, Vec<&ColumnInfo>)> = Vec::new();
    for col in columns {
        match tables.iter_mut().find(|(name, _)| *name == col.table_name) {
            Some((_, cols)) => cols.push(col),
            None => tables.push((&col.table_name, vec![col])),
        }
    }
    let mut out = String::from("### postgres SQL tables, with their properties:\n");
    for (name, cols) in tables {
        let defs: Vec<String> = cols
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", c.column_name, c.data_type);
                if let Some(len) = c.character_maximum_length {
                    def.push_str(&format!("({})", len));
                }
                if !c.is_nullable {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();
        out.push_str(&format!("# {}({})\n", name, defs.join(", ")));
    }
    out
}

/// Prompt seeded with `SELECT` so the model continues the statement.
pub fn build_prompt(definitions: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new("system", SQL_SYSTEM_PROMPT),
        ChatMessage::new(
            "user",
            format!("{}### A query to Answer: {}\nSELECT", definitions, question),
        ),
    ]
}

/// Turn a model reply into one executable statement: unwrap a fenced block, restore the seeded
/// `SELECT` when the reply only continues it, and cut at the first `;`.
pub fn normalize_query(reply: &str) -> Option<String> {
    let sql = fenced_block(reply).unwrap_or(reply);
    let sql = sql.split(';').next().unwrap_or("").trim();
    if sql.is_empty() {
        return None;
    }
    let first = sql.split_whitespace().next().unwrap_or("");
    if first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with") {
        Some(sql.to_string())
    } else {
        Some(format!("SELECT {}", sql))
    }
}

/// Postgres-backed translator.
pub struct PostgresTranslator {
    pool: PgPool,
    llm: Arc<dyn CompletionBackend>,
    schema: String,
    catalog: Option<String>,
    timeout: Duration,
}

impl PostgresTranslator {
    /// Build with a lazily connecting pool; connection errors surface per query.
    pub fn connect_lazy(
        url: &str,
        config: &DatabaseConfig,
        llm: Arc<dyn CompletionBackend>,
    ) -> Result<Self, sqlx::Error> {
        let timeout = Duration::from_secs(config.query_timeout_secs);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(timeout)
            .connect_lazy(url)?;
        Ok(Self {
            pool,
            llm,
            schema: config.schema.clone(),
            catalog: crate::config::non_empty(&config.catalog),
            timeout,
        })
    }

    async fn columns(&self) -> Result<Vec<ColumnInfo>, SqlError> {
        let rows: Vec<(String, String, String, Option<i32>, String)> = sqlx::query_as(
            "SELECT table_name::text, column_name::text, data_type::text, \
                    character_maximum_length::int4, is_nullable::text \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND ($2::text IS NULL OR table_catalog = $2) \
             ORDER BY table_name, ordinal_position",
        )
        .bind(&self.schema)
        .bind(self.catalog.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(table_name, column_name, data_type, len, nullable)| ColumnInfo {
                table_name,
                column_name,
                data_type,
                character_maximum_length: len,
                is_nullable: nullable != "NO",
            })
            .collect())
    }

    /// Run `query` in a read-only transaction, one JSON object per row.
    async fn execute(&self, query: &str) -> Result<Vec<Value>, SqlError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let wrapped = format!("SELECT to_jsonb(t) FROM ({}) AS t", query);
        let records: Vec<Value> = sqlx::query_scalar(&wrapped).fetch_all(&mut *tx).await?;
        tx.rollback().await?;
        Ok(records)
    }

    async fn run(&self, question: &str) -> Result<(String, Vec<Value>), SqlError> {
        let definitions = table_definitions(&self.columns().await?);
        let reply = self.llm.complete(&build_prompt(&definitions, question)).await?;
        let query = normalize_query(&reply).ok_or(SqlError::EmptyQuery)?;
        log::debug!("data query: generated sql: {}", query);
        let records = tokio::time::timeout(self.timeout, self.execute(&query))
            .await
            .map_err(|_| SqlError::Timeout(self.timeout))??;
        Ok((query, records))
    }
}

#[async_trait]
impl SqlTranslator for PostgresTranslator {
    async fn translate_and_execute(&self, question: &str) -> QueryOutcome {
        match self.run(question).await {
            Ok((query, records)) => QueryOutcome::Rows { query, records },
            Err(e) => {
                log::warn!("data query failed: {}", e);
                QueryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
