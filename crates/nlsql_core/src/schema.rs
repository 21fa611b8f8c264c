use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{NlSqlError, Result};

/// Bound on one introspection pass when none is configured.
pub const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of table and column metadata, usually the live database.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` as (name, type string) pairs in ordinal order.
    async fn list_columns(&self, table: &str) -> Result<Vec<(String, String)>>;

    /// Every table with its columns.
    ///
    /// Walks `list_tables` and `list_columns` by default. Sources that can
    /// read the whole schema in one go should override this.
    async fn list_all(&self) -> Result<Vec<TableDescription>> {
        let mut tables = Vec::new();
        for name in self.list_tables().await? {
            let columns = self
                .list_columns(&name)
                .await?
                .into_iter()
                .map(|(name, data_type)| ColumnDescription { name, data_type })
                .collect();
            tables.push(TableDescription { name, columns });
        }
        Ok(tables)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
}

/// Ordered tables with their ordered columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescription {
    pub tables: Vec<TableDescription>,
}

impl SchemaDescription {
    pub fn new(tables: Vec<TableDescription>) -> Self {
        SchemaDescription { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableDescription> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Renders the schema the way prompts embed it:
///
/// ```text
/// TABLE products
///   - id: integer
///   - name: text
/// ```
impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for table in &self.tables {
            writeln!(f, "TABLE {}", table.name)?;
            for col in &table.columns {
                writeln!(f, "  - {}: {}", col.name, col.data_type)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Holds the schema description read from a [`SchemaSource`].
///
/// The description is built once and shared as an `Arc`. A refresh builds a
/// new description and swaps it in, readers holding the old one are not
/// affected.
pub struct SchemaIntrospector {
    source: Arc<dyn SchemaSource>,
    timeout: Duration,
    current: RwLock<Arc<SchemaDescription>>,
}

impl SchemaIntrospector {
    /// Introspect `source` and keep the result. Every pass, this one and each
    /// refresh, fails with an introspection error once `timeout` elapses.
    pub async fn load(source: Arc<dyn SchemaSource>, timeout: Duration) -> Result<Self> {
        let schema = introspect_within(source.as_ref(), timeout).await?;
        Ok(SchemaIntrospector {
            source,
            timeout,
            current: RwLock::new(Arc::new(schema)),
        })
    }

    /// Introspector over a fixed description. Refreshing returns the same
    /// description.
    pub fn fixed(schema: SchemaDescription) -> Self {
        SchemaIntrospector {
            current: RwLock::new(Arc::new(schema.clone())),
            timeout: DEFAULT_INTROSPECTION_TIMEOUT,
            source: Arc::new(schema),
        }
    }

    pub fn current(&self) -> Arc<SchemaDescription> {
        self.current.read().clone()
    }

    /// Re-read the schema from the source and replace the held description.
    pub async fn refresh(&self) -> Result<Arc<SchemaDescription>> {
        let schema = Arc::new(introspect_within(self.source.as_ref(), self.timeout).await?);
        *self.current.write() = schema.clone();
        info!(tables = schema.tables.len(), "schema refreshed");
        Ok(schema)
    }
}

impl fmt::Debug for SchemaIntrospector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaIntrospector")
            .field("tables", &self.current.read().tables.len())
            .finish_non_exhaustive()
    }
}

/// A description can serve as its own source, for tests and for callers that
/// supply the schema explicitly.
#[async_trait]
impl SchemaSource for SchemaDescription {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .table(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data_type.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Build a schema description from every table of the source.
pub async fn introspect(source: &dyn SchemaSource) -> Result<SchemaDescription> {
    let tables = source.list_all().await?;
    for table in &tables {
        debug!(table = %table.name, columns = table.columns.len(), "introspected table");
    }
    Ok(SchemaDescription { tables })
}

/// Like [`introspect`], failing with [`NlSqlError::Introspection`] when the
/// source doesn't answer within `timeout`.
pub async fn introspect_within(
    source: &dyn SchemaSource,
    timeout: Duration,
) -> Result<SchemaDescription> {
    match tokio::time::timeout(timeout, introspect(source)).await {
        Ok(result) => result,
        Err(_) => Err(NlSqlError::Introspection(format!(
            "schema source did not answer within {timeout:?}"
        ))),
    }
}
