use nlsql_core::errors::NlSqlError;

#[derive(Debug, thiserror::Error)]
pub enum GptError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid api key: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid api base url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Completion request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Completion response has no choices")]
    NoChoices,
}

impl From<GptError> for NlSqlError {
    fn from(value: GptError) -> Self {
        NlSqlError::Backend(value.to_string())
    }
}

pub type Result<T, E = GptError> = std::result::Result<T, E>;
