use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::errors::{NlSqlError, Result};

const SQL_FENCE: &str = "```sql";
const FENCE: &str = "```";

/// A single SQL statement isolated from a backend response. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SqlCandidate(String);

impl SqlCandidate {
    pub fn new(sql: impl Into<String>) -> Option<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            None
        } else {
            Some(SqlCandidate(sql))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for SqlCandidate {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Isolate one statement from a free text model response.
///
/// If the response has a block fenced with ```sql, the block body is used.
/// An unterminated block runs to the end of the response. Without a sql
/// fence the whole trimmed response is the statement.
pub fn extract_statement(response: &str) -> Result<SqlCandidate> {
    let sql = match response.find(SQL_FENCE) {
        Some(start) => {
            let after_tag = &response[start + SQL_FENCE.len()..];
            let body = match after_tag.find('\n') {
                Some(nl) => &after_tag[nl + 1..],
                None => after_tag,
            };
            match body.find(FENCE) {
                Some(end) => body[..end].trim(),
                None => body.trim(),
            }
        }
        None => response.trim(),
    };

    SqlCandidate::new(sql).ok_or_else(|| NlSqlError::Extraction {
        response: response.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block() {
        let resp = "Here you go:\n```sql\nSELECT name FROM products;\n```\nEnjoy.";
        let sql = extract_statement(resp).unwrap();
        assert_eq!("SELECT name FROM products;", sql.as_str());
    }

    #[test]
    fn fence_tag_with_trailing_text_on_same_line() {
        let resp = "```sql  -- postgres\nSELECT 1\n```";
        assert_eq!("SELECT 1", extract_statement(resp).unwrap().as_str());
    }

    #[test]
    fn multiline_statement() {
        let resp = "```sql\nSELECT c.name, count(*)\nFROM customers c\nGROUP BY c.name;\n```";
        assert_eq!(
            "SELECT c.name, count(*)\nFROM customers c\nGROUP BY c.name;",
            extract_statement(resp).unwrap().as_str()
        );
    }

    #[test]
    fn unterminated_fence() {
        let resp = "```sql\nDROP TABLE products;";
        assert_eq!(
            "DROP TABLE products;",
            extract_statement(resp).unwrap().as_str()
        );
    }

    #[test]
    fn bare_response() {
        let resp = "  SELECT * FROM orders;\n";
        assert_eq!(
            "SELECT * FROM orders;",
            extract_statement(resp).unwrap().as_str()
        );
    }

    #[test]
    fn first_block_wins() {
        let resp = "```sql\nSELECT 1;\n```\n```sql\nSELECT 2;\n```";
        assert_eq!("SELECT 1;", extract_statement(resp).unwrap().as_str());
    }

    #[test]
    fn empty_response_is_error() {
        let err = extract_statement("   \n ").unwrap_err();
        assert!(matches!(err, NlSqlError::Extraction { .. }));
    }

    #[test]
    fn empty_block_is_error() {
        let err = extract_statement("```sql\n\n```").unwrap_err();
        assert!(matches!(err, NlSqlError::Extraction { .. }));
    }
}
