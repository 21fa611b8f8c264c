#[derive(Debug, thiserror::Error)]
pub enum NlSqlError {
    #[error("Language backend failed: {0}")]
    Backend(String),

    #[error("No SQL statement could be extracted from the backend response")]
    Extraction { response: String },

    #[error("Failed to execute statement: {0}")]
    Execution(String),

    #[error(
        "Repaired statement failed: {repair_error} (original error: {original_error})"
    )]
    RepairFailed {
        original_sql: String,
        original_error: String,
        repaired_sql: String,
        repair_error: String,
    },

    #[error("Failed to introspect schema: {0}")]
    Introspection(String),

    #[error("Invalid alias table: {0}")]
    AliasTable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = NlSqlError> = std::result::Result<T, E>;
