use async_trait::async_trait;

use crate::errors::Result;

/// Column name to scalar value, in result column order.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

/// Runs vetted statements.
///
/// Every call acquires its own connection and releases it before returning,
/// on success and on failure. All rows are materialized. Database level
/// failures are reported as
/// [`NlSqlError::Execution`](crate::errors::NlSqlError::Execution) carrying the
/// database diagnostic.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>>;
}

/// Append `LIMIT n` to a statement that doesn't mention a limit.
pub fn apply_row_limit(sql: &str, limit: u64) -> String {
    let sql = sql.trim();
    if sql.to_lowercase().contains("limit") {
        return sql.to_string();
    }
    let body = sql.strip_suffix(';').unwrap_or(sql).trim_end();
    format!("{body}\nLIMIT {limit};")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_appended() {
        assert_eq!(
            "SELECT * FROM products\nLIMIT 100;",
            apply_row_limit("SELECT * FROM products;", 100)
        );
        assert_eq!(
            "SELECT * FROM products\nLIMIT 5;",
            apply_row_limit("  SELECT * FROM products  ", 5)
        );
    }

    #[test]
    fn existing_limit_kept() {
        assert_eq!(
            "SELECT * FROM products LIMIT 3;",
            apply_row_limit("SELECT * FROM products LIMIT 3;", 100)
        );
    }
}
