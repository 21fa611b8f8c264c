use std::fmt;

use async_trait::async_trait;
use nlsql_core::errors::NlSqlError;
use nlsql_core::executor::{ResultRow, SqlExecutor};
use serde_json::{Number, Value};
use tokio_postgres::SimpleQueryMessage;
use tokio_postgres::types::Type as PostgresType;
use tracing::debug;

use crate::connect;
use crate::errors::{PostgresError, Result};

/// Runs statements against Postgres, one connection per statement.
///
/// The statement is prepared first, which rejects input holding more than one
/// statement and gives the column types. It then runs through the simple
/// query protocol and every value is converted from its text form according to
/// the column type.
#[derive(Clone)]
pub struct PostgresExecutor {
    conn_str: String,
}

impl PostgresExecutor {
    pub fn new(conn_str: impl Into<String>) -> Self {
        PostgresExecutor {
            conn_str: conn_str.into(),
        }
    }

    pub async fn query(&self, sql: &str) -> Result<Vec<ResultRow>> {
        let client = connect(&self.conn_str).await?;

        let stmt = client.prepare(sql).await.map_err(PostgresError::query)?;
        let columns = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_().clone()))
            .collect::<Vec<_>>();

        let messages = client.simple_query(sql).await.map_err(PostgresError::query)?;

        let mut rows = Vec::new();
        for msg in messages {
            if let SimpleQueryMessage::Row(row) = msg {
                let mut out = ResultRow::with_capacity(columns.len());
                for (idx, (name, typ)) in columns.iter().enumerate() {
                    out.insert(name.clone(), text_to_json(typ, row.get(idx)));
                }
                rows.push(out);
            }
        }

        debug!(rows = rows.len(), columns = columns.len(), "statement executed");
        Ok(rows)
    }
}

#[async_trait]
impl SqlExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> nlsql_core::errors::Result<Vec<ResultRow>> {
        self.query(sql)
            .await
            .map_err(|e| NlSqlError::Execution(e.to_string()))
    }
}

impl fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresExecutor").finish_non_exhaustive()
    }
}

/// Convert a value in Postgres text format to json.
///
/// Integers, floats and numerics become numbers, booleans become bools and
/// json columns are parsed. Everything else, and anything that fails to parse,
/// is kept as a string. Numerics outside of f64 precision lose precision.
pub fn text_to_json(typ: &PostgresType, text: Option<&str>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };

    let parsed = match typ {
        &PostgresType::BOOL => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        &PostgresType::INT2 | &PostgresType::INT4 | &PostgresType::INT8 | &PostgresType::OID => {
            text.parse::<i64>().ok().map(Value::from)
        }
        &PostgresType::FLOAT4 | &PostgresType::FLOAT8 | &PostgresType::NUMERIC => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        &PostgresType::JSON | &PostgresType::JSONB => serde_json::from_str(text).ok(),
        _ => None,
    };

    parsed.unwrap_or_else(|| Value::String(text.to_string()))
}
