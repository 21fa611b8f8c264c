use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::alias::QuestionNormalizer;
use crate::backend::LanguageBackend;
use crate::errors::{NlSqlError, Result};
use crate::extract::{SqlCandidate, extract_statement};
use crate::memory::ContextBlock;
use crate::prompt::{self, Language};
use crate::schema::SchemaDescription;

pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns questions into statements, and failed statements into repaired ones,
/// through the language backend.
pub struct QuerySynthesizer {
    backend: Arc<dyn LanguageBackend>,
    normalizer: Arc<dyn QuestionNormalizer>,
    timeout: Duration,
}

impl QuerySynthesizer {
    pub fn new(backend: Arc<dyn LanguageBackend>, normalizer: Arc<dyn QuestionNormalizer>) -> Self {
        QuerySynthesizer {
            backend,
            normalizer,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Bound every backend call. Hitting the bound is a backend error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn synthesize(
        &self,
        question: &str,
        schema: &SchemaDescription,
        context: Option<&ContextBlock>,
        language: Language,
    ) -> Result<SqlCandidate> {
        let normalized = self.normalizer.normalize(question);
        debug!(%normalized, has_context = context.is_some(), "synthesizing");

        let system = prompt::system_prompt(schema, language);
        let user = prompt::user_message(context, &normalized, language);

        let response = self.complete(&system, &user).await?;
        extract_statement(&response)
    }

    /// Ask for a corrected SELECT given the statement that failed and the
    /// database diagnostic.
    pub async fn repair(
        &self,
        failed_sql: &str,
        error_message: &str,
        question: &str,
        language: Language,
    ) -> Result<SqlCandidate> {
        debug!(%failed_sql, %error_message, "requesting repair");

        let system = prompt::repair_prompt(question, failed_sql, error_message, language);
        let response = self
            .complete(&system, prompt::repair_user_message(language))
            .await?;
        extract_statement(&response)
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.backend.complete(system, user))
            .await
            .map_err(|_| {
                NlSqlError::Backend(format!(
                    "no response within {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;
        debug!(response_len = response.len(), "backend responded");
        Ok(response)
    }
}

impl fmt::Debug for QuerySynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySynthesizer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
