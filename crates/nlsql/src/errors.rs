use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nlsql_core::errors::NlSqlError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] NlSqlError),
}

pub type ServerResult<T, E = ServerError> = std::result::Result<T, E>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(e) => match e {
                NlSqlError::Backend(_) | NlSqlError::Extraction { .. } => StatusCode::BAD_GATEWAY,
                NlSqlError::Execution(_) | NlSqlError::RepairFailed { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                NlSqlError::Introspection(_)
                | NlSqlError::AliasTable(_)
                | NlSqlError::Io(_)
                | NlSqlError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = match &self {
            ServerError::Pipeline(NlSqlError::RepairFailed {
                original_sql,
                original_error,
                repaired_sql,
                repair_error,
            }) => json!({
                "error": self.to_string(),
                "original_sql": original_sql,
                "original_error": original_error,
                "repaired_sql": repaired_sql,
                "repair_error": repair_error,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
