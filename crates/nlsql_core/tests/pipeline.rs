use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nlsql_core::alias::AliasTable;
use nlsql_core::backend::LanguageBackend;
use nlsql_core::errors::{NlSqlError, Result};
use nlsql_core::executor::{ResultRow, SqlExecutor};
use nlsql_core::memory::{ContextBlock, ConversationMemory};
use nlsql_core::orchestrator::{
    CheckStage, GenerateOutcome, Pipeline, PipelineConfig, TurnOutcome, TurnRequest,
};
use nlsql_core::prompt::Language;
use nlsql_core::schema::{ColumnDescription, SchemaDescription, SchemaIntrospector, TableDescription};
use nlsql_core::synthesizer::QuerySynthesizer;
use parking_lot::Mutex;
use serde_json::json;

/// Replies with queued responses in order and records every prompt pair.
#[derive(Default)]
struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(ScriptedBackend {
            responses: Mutex::new(responses.iter().map(|r| format!("```sql\n{r}\n```")).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    fn user_message(&self, idx: usize) -> String {
        self.prompts.lock()[idx].1.clone()
    }

    fn system_prompt(&self, idx: usize) -> String {
        self.prompts.lock()[idx].0.clone()
    }
}

#[async_trait]
impl LanguageBackend for ScriptedBackend {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        self.prompts
            .lock()
            .push((system_prompt.to_string(), user_message.to_string()));
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| NlSqlError::Backend("no scripted response left".to_string()))
    }
}

/// Fails statements containing a marker, returns fixed rows otherwise.
struct FakeExecutor {
    failing_marker: Option<&'static str>,
    delay: Option<Duration>,
    rows: Vec<ResultRow>,
    executed: Mutex<Vec<String>>,
}

impl FakeExecutor {
    fn new(rows: Vec<ResultRow>) -> Self {
        FakeExecutor {
            failing_marker: None,
            delay: None,
            rows,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, marker: &'static str) -> Self {
        self.failing_marker = Some(marker);
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>> {
        self.executed.lock().push(sql.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failing_marker {
            Some(marker) if sql.contains(marker) => Err(NlSqlError::Execution(format!(
                "syntax error at or near \"{marker}\""
            ))),
            _ => Ok(self.rows.clone()),
        }
    }
}

fn product_rows() -> Vec<ResultRow> {
    ["Kalem", "Defter", "Silgi", "Cetvel"]
        .iter()
        .map(|name| {
            let mut row = ResultRow::new();
            row.insert("name".to_string(), json!(name));
            row
        })
        .collect()
}

fn schema() -> SchemaDescription {
    SchemaDescription::new(vec![TableDescription {
        name: "products".to_string(),
        columns: vec![
            ColumnDescription {
                name: "id".to_string(),
                data_type: "integer".to_string(),
            },
            ColumnDescription {
                name: "name".to_string(),
                data_type: "text".to_string(),
            },
        ],
    }])
}

fn pipeline(backend: Arc<ScriptedBackend>, executor: Arc<FakeExecutor>) -> Pipeline {
    logutil::init_test();
    let synthesizer = QuerySynthesizer::new(backend, Arc::new(AliasTable::ecommerce()));
    Pipeline::new(
        synthesizer,
        executor,
        Arc::new(SchemaIntrospector::fixed(schema())),
    )
}

#[tokio::test]
async fn select_question_runs_and_is_remembered() {
    let backend = ScriptedBackend::new(&["SELECT name FROM products;"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()));
    let pipeline = pipeline(backend.clone(), executor.clone());
    let memory = ConversationMemory::new();

    let outcome = pipeline
        .ask(&TurnRequest::new("ürünlerin isimlerini göster"), &memory)
        .await
        .unwrap();

    let TurnOutcome::Rows(result) = outcome else {
        panic!("expected rows, got {outcome:?}");
    };
    assert_eq!("SELECT name FROM products;", result.sql);
    assert_eq!(product_rows(), result.rows);
    assert!(!result.repaired);
    assert!(result.chart.is_none());

    assert!(backend.system_prompt(0).contains("TABLE products\n  - id: integer"));
    assert_eq!(
        "ŞİMDİKİ SORU: ürünlerin isimlerini göster",
        backend.user_message(0)
    );

    let state = memory.context().unwrap();
    assert_eq!("ürünlerin isimlerini göster", state.question);
    assert_eq!("SELECT name FROM products;", state.sql);
    assert_eq!(product_rows(), state.rows);
}

#[tokio::test]
async fn destructive_statement_is_never_executed() {
    let backend = ScriptedBackend::new(&["DROP TABLE products;"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()));
    let pipeline = pipeline(backend, executor.clone());
    let memory = ConversationMemory::new();
    memory.save("önceki", "SELECT 1", vec![]);

    let outcome = pipeline
        .ask(&TurnRequest::new("products tablosunu sil"), &memory)
        .await
        .unwrap();

    let TurnOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!("DROP TABLE products;", rejection.sql);
    assert_eq!("drop", rejection.keyword);
    assert_eq!(CheckStage::Synthesized, rejection.stage);
    assert_eq!(
        "Bu sorgu güvenlik nedeniyle engellendi (destructive SQL tespit edildi).",
        rejection.warning
    );
    assert!(rejection.original_error.is_none());

    assert!(executor.executed().is_empty());
    // Memory still holds the previous turn.
    assert_eq!("önceki", memory.context().unwrap().question);
}

#[tokio::test]
async fn failed_statement_is_repaired_once() {
    let backend = ScriptedBackend::new(&["SELEC name FROM products", "SELECT name FROM products;"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()).failing_on("SELEC "));
    let pipeline = pipeline(backend.clone(), executor.clone());
    let memory = ConversationMemory::new();

    let outcome = pipeline
        .ask(&TurnRequest::new("ürünlerin isimlerini göster"), &memory)
        .await
        .unwrap();

    let TurnOutcome::Rows(result) = outcome else {
        panic!("expected rows, got {outcome:?}");
    };
    assert!(result.repaired);
    assert_eq!("SELECT name FROM products;", result.sql);
    assert_eq!(2, executor.executed().len());

    let repair_prompt = backend.system_prompt(1);
    assert!(repair_prompt.contains("SELEC name FROM products"));
    assert!(repair_prompt.contains("syntax error at or near \"SELEC \""));
    assert!(repair_prompt.contains("ürünlerin isimlerini göster"));

    assert_eq!("SELECT name FROM products;", memory.context().unwrap().sql);
}

#[tokio::test]
async fn second_failure_reports_both_errors() {
    let backend = ScriptedBackend::new(&["SELECT nme FROM products", "SELECT nme FROM products"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()).failing_on("nme"));
    let pipeline = pipeline(backend.clone(), executor.clone());
    let memory = ConversationMemory::new();

    let err = pipeline
        .ask(&TurnRequest::new("ürünler"), &memory)
        .await
        .unwrap_err();

    match err {
        NlSqlError::RepairFailed {
            original_sql,
            original_error,
            repaired_sql,
            repair_error,
        } => {
            assert_eq!("SELECT nme FROM products", original_sql);
            assert_eq!("SELECT nme FROM products", repaired_sql);
            assert!(original_error.contains("nme"));
            assert!(repair_error.contains("nme"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // One synthesis, one repair, no more.
    assert_eq!(2, backend.calls());
    assert_eq!(2, executor.executed().len());
    assert!(!memory.has_context());
}

#[tokio::test]
async fn repair_backend_failure_keeps_execution_error() {
    // Only the first statement is scripted, the repair call finds the backend empty.
    let backend = ScriptedBackend::new(&["SELECT bogus FROM products"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()).failing_on("bogus"));
    let pipeline = pipeline(backend.clone(), executor.clone());
    let memory = ConversationMemory::new();

    let err = pipeline
        .ask(&TurnRequest::new("ürünler"), &memory)
        .await
        .unwrap_err();

    match err {
        NlSqlError::Backend(msg) => {
            assert!(msg.contains("no scripted response left"), "{msg}");
            assert!(msg.contains("syntax error at or near \"bogus\""), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(2, backend.calls());
    assert_eq!(1, executor.executed().len());
    assert!(!memory.has_context());
}

#[tokio::test]
async fn unextractable_repair_is_extraction_error() {
    let backend = Arc::new(ScriptedBackend::default());
    backend
        .responses
        .lock()
        .extend(["```sql\nSELECT bogus FROM products\n```".to_string(), String::new()]);
    let executor = Arc::new(FakeExecutor::new(product_rows()).failing_on("bogus"));
    let pipeline = pipeline(backend, executor.clone());

    let err = pipeline
        .ask(&TurnRequest::new("ürünler"), &ConversationMemory::new())
        .await
        .unwrap_err();

    assert!(matches!(err, NlSqlError::Extraction { .. }), "{err}");
    assert_eq!(1, executor.executed().len());
}

#[tokio::test]
async fn empty_schema_override_falls_back_to_introspected() {
    let backend = ScriptedBackend::new(&["SELECT name FROM products;"]);
    let pipeline = pipeline(backend.clone(), Arc::new(FakeExecutor::new(product_rows())));

    let request: TurnRequest =
        serde_json::from_value(json!({"question": "ürünler", "schema": []})).unwrap();
    assert_eq!(Some(SchemaDescription::default()), request.schema);
    pipeline
        .generate(&request, &ConversationMemory::new())
        .await
        .unwrap();

    assert!(
        backend
            .system_prompt(0)
            .contains("TABLE products\n  - id: integer\n  - name: text")
    );
}

#[tokio::test]
async fn schema_override_replaces_introspected() {
    let backend = ScriptedBackend::new(&["SELECT title FROM books;"]);
    let pipeline = pipeline(backend.clone(), Arc::new(FakeExecutor::new(vec![])));

    let override_schema = SchemaDescription::new(vec![TableDescription {
        name: "books".to_string(),
        columns: vec![ColumnDescription {
            name: "title".to_string(),
            data_type: "text".to_string(),
        }],
    }]);
    let request = TurnRequest::new("kitaplar").with_schema(override_schema);
    pipeline
        .generate(&request, &ConversationMemory::new())
        .await
        .unwrap();

    let prompt = backend.system_prompt(0);
    assert!(prompt.contains("TABLE books\n  - title: text"));
    assert!(!prompt.contains("TABLE products"));
}

#[tokio::test]
async fn destructive_repair_is_rejected() {
    let backend = ScriptedBackend::new(&["SELECT bogus FROM products", "DELETE FROM products;"]);
    let executor = Arc::new(FakeExecutor::new(vec![]).failing_on("bogus"));
    let pipeline = pipeline(backend, executor.clone());
    let memory = ConversationMemory::new();

    let outcome = pipeline
        .ask(&TurnRequest::new("ürünler"), &memory)
        .await
        .unwrap();

    let TurnOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(CheckStage::Repaired, rejection.stage);
    assert_eq!("delete", rejection.keyword);
    assert_eq!(
        "Düzeltilen SQL destructive olduğu için engellendi.",
        rejection.warning
    );
    assert!(rejection.original_error.unwrap().contains("bogus"));
    assert_eq!(vec!["SELECT bogus FROM products".to_string()], executor.executed());
}

#[tokio::test]
async fn previous_turn_is_offered_as_context() {
    let backend = ScriptedBackend::new(&[
        "SELECT name FROM products;",
        "SELECT name FROM products LIMIT 5;",
    ]);
    let executor = Arc::new(FakeExecutor::new(product_rows()));
    let pipeline = pipeline(backend.clone(), executor);
    let memory = ConversationMemory::new();

    pipeline
        .ask(&TurnRequest::new("Ürünlerin isimlerini göster"), &memory)
        .await
        .unwrap();
    pipeline
        .ask(&TurnRequest::new("sadece 5 tanesi"), &memory)
        .await
        .unwrap();

    let expected = concat!(
        "ÖNCEKİ SORU: Ürünlerin isimlerini göster\n",
        "ÖNCEKİ ÜRETİLEN SQL: SELECT name FROM products;\n",
        "ÖNCEKİ SONUÇ: columns: [name]\nfirst_rows:\n",
        "  - {\"name\":\"Kalem\"}\n  - {\"name\":\"Defter\"}\n  - {\"name\":\"Silgi\"}\n",
        "\n\n",
        "ŞİMDİKİ SORU: sadece 5 tanesi",
    );
    assert_eq!(expected, backend.user_message(1));
    assert_eq!("sadece 5 tanesi", memory.context().unwrap().question);
}

#[tokio::test]
async fn explicit_context_wins_over_memory() {
    let backend = ScriptedBackend::new(&["SELECT 1;"]);
    let pipeline = pipeline(backend.clone(), Arc::new(FakeExecutor::new(vec![])));
    let memory = ConversationMemory::new();
    memory.save("hafızadaki soru", "SELECT 2", vec![]);

    let request = TurnRequest::new("devam").with_context(ContextBlock {
        error: Some("column \"x\" does not exist".to_string()),
        ..Default::default()
    });
    pipeline.ask(&request, &memory).await.unwrap();

    assert_eq!(
        "ÖNCEKİ HATA: column \"x\" does not exist\n\nŞİMDİKİ SORU: devam",
        backend.user_message(0)
    );
}

#[tokio::test]
async fn generate_checks_without_running() {
    let backend = ScriptedBackend::new(&["SELECT name FROM products;", "TRUNCATE TABLE products;"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()));
    let pipeline = pipeline(backend, executor.clone());
    let memory = ConversationMemory::new();

    let outcome = pipeline
        .generate(&TurnRequest::new("ürünler"), &memory)
        .await
        .unwrap();
    let GenerateOutcome::Sql(sql) = outcome else {
        panic!("expected sql, got {outcome:?}");
    };
    assert_eq!("SELECT name FROM products;", sql.as_str());

    let request = TurnRequest::new("truncate products").with_language(Language::English);
    let outcome = pipeline.generate(&request, &memory).await.unwrap();
    let GenerateOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!("truncate", rejection.keyword);
    assert_eq!(
        "This query was blocked for safety (destructive SQL detected).",
        rejection.warning
    );

    assert!(executor.executed().is_empty());
    assert!(!memory.has_context());
}

#[tokio::test]
async fn row_limit_is_appended() {
    let backend = ScriptedBackend::new(&["SELECT name FROM products;"]);
    let executor = Arc::new(FakeExecutor::new(product_rows()));
    let pipeline = pipeline(backend, executor.clone()).with_config(PipelineConfig {
        row_limit: Some(100),
        ..Default::default()
    });

    let outcome = pipeline
        .ask(&TurnRequest::new("ürünler"), &ConversationMemory::new())
        .await
        .unwrap();

    assert_eq!(vec!["SELECT name FROM products\nLIMIT 100;".to_string()], executor.executed());
    let TurnOutcome::Rows(result) = outcome else {
        panic!("expected rows");
    };
    assert_eq!("SELECT name FROM products\nLIMIT 100;", result.sql);
}

#[tokio::test(start_paused = true)]
async fn execution_timeout_triggers_repair() {
    let backend = ScriptedBackend::new(&["SELECT pg_sleep(600)", "SELECT name FROM products;"]);
    let executor = Arc::new(FakeExecutor {
        delay: Some(Duration::from_secs(600)),
        ..FakeExecutor::new(product_rows())
    });
    let pipeline = pipeline(backend, executor).with_config(PipelineConfig {
        execution_timeout: Duration::from_secs(10),
        ..Default::default()
    });

    // Both attempts hit the bound.
    let err = pipeline
        .ask(&TurnRequest::new("yavaş sorgu"), &ConversationMemory::new())
        .await
        .unwrap_err();
    match err {
        NlSqlError::RepairFailed { original_error, .. } => {
            assert!(original_error.contains("timed out"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn chart_hint_for_visualization_requests() {
    let mut row = ResultRow::new();
    row.insert("category".to_string(), json!("Kırtasiye"));
    row.insert("total".to_string(), json!(42));
    let backend = ScriptedBackend::new(&["SELECT category, total FROM sales;"]);
    let pipeline = pipeline(backend, Arc::new(FakeExecutor::new(vec![row])));

    let outcome = pipeline
        .ask(
            &TurnRequest::new("Kategori bazında satış grafiği çiz"),
            &ConversationMemory::new(),
        )
        .await
        .unwrap();
    let TurnOutcome::Rows(result) = outcome else {
        panic!("expected rows");
    };
    let chart = result.chart.unwrap();
    assert_eq!("category", chart.category_axis);
    assert_eq!("total", chart.value_axis);
}
