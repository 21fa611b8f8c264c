//! Lexical classification of statements as destructive or not.
//!
//! This is a keyword filter, not a parser. Known limitations:
//!
//! - A keyword anywhere in the text blocks the statement, including inside
//!   string literals and identifiers (`WHERE name = 'update'`,
//!   `SELECT created_at ...`).
//! - Only `--` line comments are stripped. Block comments, stacked statements
//!   and keywords assembled at runtime are not understood.
//!
//! Both are accepted behavior of the default classifier. A parser based
//! classifier can be plugged in through [`StatementClassifier`].

use serde::Serialize;

/// Keywords that mark a statement as destructive.
pub const DESTRUCTIVE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "truncate", "create", "replace", "rename",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Safety {
    Safe,
    Unsafe { keyword: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    /// The statement that was evaluated, unmodified.
    pub statement: String,
    pub safety: Safety,
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self.safety, Safety::Safe)
    }
}

pub trait StatementClassifier: Send + Sync {
    fn classify(&self, sql: &str) -> SafetyVerdict;
}

/// The default classifier, see module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl StatementClassifier for KeywordClassifier {
    fn classify(&self, sql: &str) -> SafetyVerdict {
        classify(sql)
    }
}

pub fn classify(sql: &str) -> SafetyVerdict {
    let cleaned = strip_comments(sql).to_lowercase();
    let safety = match DESTRUCTIVE_KEYWORDS
        .iter()
        .copied()
        .find(|kw| cleaned.contains(kw))
    {
        Some(keyword) => Safety::Unsafe { keyword },
        None => Safety::Safe,
    };

    SafetyVerdict {
        statement: sql.to_string(),
        safety,
    }
}

/// Drop everything after `--` on each line, trim each line and join them with
/// a single space.
pub fn strip_comments(sql: &str) -> String {
    sql.split('\n')
        .map(|line| match line.find("--") {
            Some(idx) => line[..idx].trim(),
            None => line.trim(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
