//! Per-question sequencing of synthesis, safety check, execution and repair.
//!
//! ```text
//! START -> SYNTHESIZE -> SAFETY_CHECK -> REJECTED | EXECUTE
//! EXECUTE -> SUCCESS | REPAIR
//! REPAIR -> SAFETY_CHECK_2 -> REJECTED | EXECUTE_2
//! EXECUTE_2 -> SUCCESS | FAILURE
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{NlSqlError, Result};
use crate::executor::{ResultRow, SqlExecutor, apply_row_limit};
use crate::extract::SqlCandidate;
use crate::memory::{ContextBlock, ConversationMemory};
use crate::prompt::Language;
use crate::safety::{KeywordClassifier, Safety, StatementClassifier};
use crate::schema::{SchemaDescription, SchemaIntrospector};
use crate::synthesizer::QuerySynthesizer;

/// Words in a question that ask for the result to be charted.
pub const VISUALIZATION_TRIGGERS: &[&str] = &["grafik", "çiz", "chart", "görselleştir", "plot"];

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PREVIEW_ROWS: usize = 3;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Language used when a request doesn't specify one.
    pub language: Language,
    /// Bound on every database call. Hitting it counts as an execution error.
    pub execution_timeout: Duration,
    /// Append `LIMIT n` to statements without a limit before executing.
    pub row_limit: Option<u64>,
    /// Rows of the previous result shown in the context block.
    pub preview_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            language: Language::default(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            row_limit: None,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

/// One incoming question and its options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub question: String,
    #[serde(default)]
    pub language: Option<Language>,
    /// Use this schema instead of the introspected one. Ignored when empty.
    #[serde(default)]
    pub schema: Option<SchemaDescription>,
    /// Use this context instead of the session memory.
    #[serde(default)]
    pub context: Option<ContextBlock>,
}

impl TurnRequest {
    pub fn new(question: impl Into<String>) -> Self {
        TurnRequest {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_context(mut self, context: ContextBlock) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_schema(mut self, schema: SchemaDescription) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Which safety check blocked a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStage {
    Synthesized,
    Repaired,
}

/// A statement the safety filter refused to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub warning: String,
    /// The rejected statement, as generated.
    pub sql: String,
    pub keyword: &'static str,
    pub stage: CheckStage,
    /// Execution error that led to the repair, for rejections of repaired
    /// statements.
    pub original_error: Option<String>,
}

/// Axes for presenting a result as a chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartHint {
    pub category_axis: String,
    pub value_axis: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// The statement that ran.
    pub sql: String,
    pub rows: Vec<ResultRow>,
    pub repaired: bool,
    pub chart: Option<ChartHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Rows(TurnResult),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Sql(SqlCandidate),
    Rejected(Rejection),
}

pub struct Pipeline {
    synthesizer: QuerySynthesizer,
    classifier: Arc<dyn StatementClassifier>,
    executor: Arc<dyn SqlExecutor>,
    schema: Arc<SchemaIntrospector>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        synthesizer: QuerySynthesizer,
        executor: Arc<dyn SqlExecutor>,
        schema: Arc<SchemaIntrospector>,
    ) -> Self {
        Pipeline {
            synthesizer,
            classifier: Arc::new(KeywordClassifier),
            executor,
            schema,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn StatementClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> Arc<SchemaDescription> {
        self.schema.current()
    }

    pub async fn refresh_schema(&self) -> Result<Arc<SchemaDescription>> {
        self.schema.refresh().await
    }

    /// Synthesize and check a statement without running it. Memory is read
    /// for context but never written.
    pub async fn generate(
        &self,
        request: &TurnRequest,
        memory: &ConversationMemory,
    ) -> Result<GenerateOutcome> {
        let language = request.language.unwrap_or(self.config.language);
        let candidate = self.synthesize(request, memory, language).await?;

        match self.check(&candidate, CheckStage::Synthesized, language, None) {
            Some(rejection) => Ok(GenerateOutcome::Rejected(rejection)),
            None => Ok(GenerateOutcome::Sql(candidate)),
        }
    }

    /// Run one turn: synthesize, check, execute with at most one repair, and
    /// remember the turn on success.
    pub async fn ask(
        &self,
        request: &TurnRequest,
        memory: &ConversationMemory,
    ) -> Result<TurnOutcome> {
        let language = request.language.unwrap_or(self.config.language);
        let candidate = self.synthesize(request, memory, language).await?;

        if let Some(rejection) = self.check(&candidate, CheckStage::Synthesized, language, None) {
            return Ok(TurnOutcome::Rejected(rejection));
        }

        let sql = self.limited(&candidate);
        let (sql, rows, repaired) = match self.execute(&sql).await {
            Ok(rows) => (sql, rows, false),
            Err(NlSqlError::Execution(original_error)) => {
                warn!(%sql, error = %original_error, "statement failed, attempting repair");

                let repaired = self
                    .synthesizer
                    .repair(&sql, &original_error, &request.question, language)
                    .await
                    .map_err(|e| {
                        warn!(%sql, %original_error, error = %e, "repair attempt failed");
                        match e {
                            NlSqlError::Backend(msg) => NlSqlError::Backend(format!(
                                "{msg} (repairing after: {original_error})"
                            )),
                            other => other,
                        }
                    })?;
                info!(sql = %repaired, "repaired statement");

                if let Some(rejection) = self.check(
                    &repaired,
                    CheckStage::Repaired,
                    language,
                    Some(&original_error),
                ) {
                    return Ok(TurnOutcome::Rejected(rejection));
                }

                let repaired_sql = self.limited(&repaired);
                match self.execute(&repaired_sql).await {
                    Ok(rows) => (repaired_sql, rows, true),
                    Err(NlSqlError::Execution(repair_error)) => {
                        warn!(sql = %repaired_sql, error = %repair_error, "repaired statement failed");
                        return Err(NlSqlError::RepairFailed {
                            original_sql: sql,
                            original_error,
                            repaired_sql,
                            repair_error,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        info!(%sql, rows = rows.len(), repaired, "turn succeeded");
        memory.save(request.question.as_str(), sql.as_str(), rows.clone());

        let chart = chart_hint(&request.question, &rows);
        if let Some(chart) = &chart {
            debug!(x = %chart.category_axis, y = %chart.value_axis, "chart requested");
        }

        Ok(TurnOutcome::Rows(TurnResult {
            sql,
            rows,
            repaired,
            chart,
        }))
    }

    async fn synthesize(
        &self,
        request: &TurnRequest,
        memory: &ConversationMemory,
        language: Language,
    ) -> Result<SqlCandidate> {
        // An empty override means the caller had no schema at hand.
        let schema = match &request.schema {
            Some(schema) if !schema.is_empty() => Arc::new(schema.clone()),
            _ => self.schema.current(),
        };
        let context = match &request.context {
            Some(context) => Some(context.clone()),
            None => memory
                .context()
                .map(|state| ContextBlock::from_memory(&state, self.config.preview_rows)),
        };

        let candidate = self
            .synthesizer
            .synthesize(&request.question, &schema, context.as_ref(), language)
            .await?;
        info!(sql = %candidate, "synthesized statement");
        Ok(candidate)
    }

    fn check(
        &self,
        sql: &str,
        stage: CheckStage,
        language: Language,
        original_error: Option<&str>,
    ) -> Option<Rejection> {
        let verdict = self.classifier.classify(sql);
        match verdict.safety {
            Safety::Safe => None,
            Safety::Unsafe { keyword } => {
                warn!(sql = %verdict.statement, keyword, ?stage, "blocked destructive statement");
                let warning = match stage {
                    CheckStage::Synthesized => language.blocked_warning(),
                    CheckStage::Repaired => language.repair_blocked_warning(),
                };
                Some(Rejection {
                    warning: warning.to_string(),
                    sql: verdict.statement,
                    keyword,
                    stage,
                    original_error: original_error.map(str::to_string),
                })
            }
        }
    }

    fn limited(&self, sql: &str) -> String {
        match self.config.row_limit {
            Some(limit) => apply_row_limit(sql, limit),
            None => sql.to_string(),
        }
    }

    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>> {
        let timeout = self.config.execution_timeout;
        tokio::time::timeout(timeout, self.executor.execute(sql))
            .await
            .map_err(|_| {
                NlSqlError::Execution(format!(
                    "statement timed out after {}s",
                    timeout.as_secs_f64()
                ))
            })?
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("synthesizer", &self.synthesizer)
            .field("schema", &self.schema)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First column as category axis, last as value axis, if the question asks for
/// a chart and there is a result to chart.
pub fn chart_hint(question: &str, rows: &[ResultRow]) -> Option<ChartHint> {
    let question = question.to_lowercase();
    if !VISUALIZATION_TRIGGERS.iter().any(|w| question.contains(w)) {
        return None;
    }
    let first = rows.first()?;
    let (category, _) = first.iter().next()?;
    let (value, _) = first.iter().next_back()?;
    Some(ChartHint {
        category_axis: category.clone(),
        value_axis: value.clone(),
    })
}
