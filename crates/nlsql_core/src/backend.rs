use async_trait::async_trait;

use crate::errors::Result;

/// Text completion service used to synthesize statements.
///
/// Implementations report transport and response problems as
/// [`NlSqlError::Backend`](crate::errors::NlSqlError::Backend). Retries and rate
/// limiting are the implementation's concern.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}
