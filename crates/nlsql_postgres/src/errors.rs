#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Failed to connect to Postgres: {0}")]
    Connect(String),

    #[error("{0}")]
    Query(String),

    #[error("Invalid connection parameters: {0}")]
    InvalidConnection(String),
}

impl PostgresError {
    /// Query error carrying the database diagnostic when there is one.
    pub(crate) fn query(err: tokio_postgres::Error) -> Self {
        PostgresError::Query(diagnostic(&err))
    }

    pub(crate) fn connect(err: tokio_postgres::Error) -> Self {
        PostgresError::Connect(diagnostic(&err))
    }
}

fn diagnostic(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.to_string(),
        None => err.to_string(),
    }
}

pub type Result<T, E = PostgresError> = std::result::Result<T, E>;
