use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use nlsql_core::errors::NlSqlError;
use nlsql_core::schema::{ColumnDescription, SchemaSource, TableDescription};

use crate::connect;
use crate::errors::{PostgresError, Result};

const LIST_TABLES: &str = "
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
    ORDER BY table_name;
";

const LIST_COLUMNS: &str = "
    SELECT column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_schema = 'public' AND table_name::text = $1
    ORDER BY ordinal_position;
";

const LIST_ALL_COLUMNS: &str = "
    SELECT table_name::text, column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_schema = 'public'
    ORDER BY table_name, ordinal_position;
";

/// Reads base tables of the `public` schema from `information_schema`.
#[derive(Clone)]
pub struct PostgresSchemaSource {
    conn_str: String,
}

impl PostgresSchemaSource {
    pub fn new(conn_str: impl Into<String>) -> Self {
        PostgresSchemaSource {
            conn_str: conn_str.into(),
        }
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let client = connect(&self.conn_str).await?;
        list_tables(&client).await
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let client = connect(&self.conn_str).await?;
        let rows = client
            .query(LIST_COLUMNS, &[&table])
            .await
            .map_err(PostgresError::query)?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0).map_err(PostgresError::query)?;
            let data_type: String = row.try_get(1).map_err(PostgresError::query)?;
            columns.push((name, data_type));
        }
        Ok(columns)
    }

    /// Whole schema over a single connection.
    async fn all_tables(&self) -> Result<Vec<TableDescription>> {
        let client = connect(&self.conn_str).await?;
        let tables = list_tables(&client).await?;

        let rows = client
            .query(LIST_ALL_COLUMNS, &[])
            .await
            .map_err(PostgresError::query)?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.try_get(0).map_err(PostgresError::query)?;
            let name: String = row.try_get(1).map_err(PostgresError::query)?;
            let data_type: String = row.try_get(2).map_err(PostgresError::query)?;
            columns.push((table, name, data_type));
        }

        Ok(group_columns(tables, columns))
    }
}

async fn list_tables(client: &tokio_postgres::Client) -> Result<Vec<String>> {
    let rows = client
        .query(LIST_TABLES, &[])
        .await
        .map_err(PostgresError::query)?;
    rows.iter()
        .map(|row| row.try_get(0).map_err(PostgresError::query))
        .collect()
}

/// Attach (table, column, type) rows to their tables, keeping table order.
/// Columns of views and other non-base tables are dropped.
fn group_columns(
    tables: Vec<String>,
    columns: Vec<(String, String, String)>,
) -> Vec<TableDescription> {
    let mut described: Vec<_> = tables
        .into_iter()
        .map(|name| TableDescription {
            name,
            columns: Vec::new(),
        })
        .collect();
    let positions: HashMap<String, usize> = described
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.name.clone(), idx))
        .collect();

    for (table, name, data_type) in columns {
        if let Some(&idx) = positions.get(&table) {
            described[idx]
                .columns
                .push(ColumnDescription { name, data_type });
        }
    }
    described
}

#[async_trait]
impl SchemaSource for PostgresSchemaSource {
    async fn list_tables(&self) -> nlsql_core::errors::Result<Vec<String>> {
        self.tables()
            .await
            .map_err(|e| NlSqlError::Introspection(e.to_string()))
    }

    async fn list_columns(&self, table: &str) -> nlsql_core::errors::Result<Vec<(String, String)>> {
        self.columns(table)
            .await
            .map_err(|e| NlSqlError::Introspection(e.to_string()))
    }

    async fn list_all(&self) -> nlsql_core::errors::Result<Vec<TableDescription>> {
        self.all_tables()
            .await
            .map_err(|e| NlSqlError::Introspection(e.to_string()))
    }
}

impl fmt::Debug for PostgresSchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSchemaSource").finish_non_exhaustive()
    }
}
