use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use nlsql_core::alias::AliasTable;
use nlsql_core::memory::ConversationMemory;
use nlsql_core::orchestrator::{GenerateOutcome, Pipeline, Rejection, TurnOutcome, TurnRequest};
use nlsql_core::schema::{DEFAULT_INTROSPECTION_TIMEOUT, SchemaIntrospector, introspect_within};
use nlsql_core::synthesizer::QuerySynthesizer;
use nlsql_gpt::client::GptClient;
use nlsql_postgres::executor::PostgresExecutor;
use nlsql_postgres::schema::PostgresSchemaSource;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::args::{AskArgs, BackendArgs, DatabaseArgs, PipelineArgs, SchemaArgs, ServeArgs};
use crate::server::{self, ServerState};

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the http api.
    Serve(ServeArgs),
    /// Answer questions from the command line.
    Ask(AskArgs),
    /// Print the schema description given to the model.
    Schema(SchemaArgs),
}

impl Commands {
    pub fn run(self) -> Result<()> {
        match self {
            Commands::Serve(serve) => serve.run(),
            Commands::Ask(ask) => ask.run(),
            Commands::Schema(schema) => schema.run(),
        }
    }
}

trait RunCommand {
    fn run(self) -> Result<()>;
}

impl RunCommand for ServeArgs {
    fn run(self) -> Result<()> {
        let runtime = build_runtime("serve")?;
        runtime.block_on(async move {
            let pipeline = build_pipeline(&self.database, &self.backend, &self.pipeline).await?;

            let listener = TcpListener::bind(&self.bind)
                .await
                .with_context(|| format!("failed to bind to {}", self.bind))?;
            let addr = listener.local_addr()?;
            info!(%addr, "http api listening");
            println!("Listening on http://{addr}");

            let state = Arc::new(ServerState::new(pipeline));
            server::serve(listener, state, Duration::from_secs(self.session_ttl_secs)).await
        })
    }
}

impl RunCommand for AskArgs {
    fn run(self) -> Result<()> {
        let runtime = build_runtime("ask")?;
        runtime.block_on(async move {
            let pipeline = build_pipeline(&self.database, &self.backend, &self.pipeline).await?;
            let memory = ConversationMemory::new();

            if !self.question.is_empty() {
                let question = self.question.join(" ");
                return answer(&pipeline, &memory, &question, self.generate_only).await;
            }

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();
                match question {
                    "" => continue,
                    "exit" | "quit" => break,
                    _ => (),
                }

                // Failed turns are reported and the conversation continues.
                if let Err(e) = answer(&pipeline, &memory, question, self.generate_only).await {
                    eprintln!("error: {e}");
                }
            }
            Ok(())
        })
    }
}

impl RunCommand for SchemaArgs {
    fn run(self) -> Result<()> {
        let runtime = build_runtime("schema")?;
        runtime.block_on(async move {
            let conn_str = self.database.connection_string()?;
            let source = PostgresSchemaSource::new(conn_str);
            let schema = introspect_within(&source, DEFAULT_INTROSPECTION_TIMEOUT).await?;
            if self.json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                print!("{schema}");
            }
            Ok(())
        })
    }
}

async fn answer(
    pipeline: &Pipeline,
    memory: &ConversationMemory,
    question: &str,
    generate_only: bool,
) -> Result<()> {
    let request = TurnRequest::new(question);

    if generate_only {
        match pipeline.generate(&request, memory).await? {
            GenerateOutcome::Sql(sql) => println!("{sql}"),
            GenerateOutcome::Rejected(rejection) => print_rejection(&rejection),
        }
        return Ok(());
    }

    match pipeline.ask(&request, memory).await? {
        TurnOutcome::Rows(result) => {
            if result.repaired {
                println!("-- repaired");
            }
            println!("{}\n", result.sql);
            for row in &result.rows {
                println!("{}", serde_json::Value::Object(row.clone()));
            }
            println!("({} rows)", result.rows.len());
            if let Some(chart) = result.chart {
                println!(
                    "chart: x = {}, y = {}",
                    chart.category_axis, chart.value_axis
                );
            }
        }
        TurnOutcome::Rejected(rejection) => print_rejection(&rejection),
    }
    Ok(())
}

fn print_rejection(rejection: &Rejection) {
    println!("{}", rejection.warning);
    println!("{}", rejection.sql);
}

/// Wire up the pipeline with the Postgres and chat completions adapters.
///
/// Configuration that doesn't need the network is checked first.
async fn build_pipeline(
    database: &DatabaseArgs,
    backend: &BackendArgs,
    pipeline: &PipelineArgs,
) -> Result<Pipeline> {
    let api_key = backend.api_key()?;
    let aliases = match &pipeline.aliases {
        Some(path) => AliasTable::from_json_file(path)
            .with_context(|| format!("failed to load aliases from {}", path.display()))?,
        None => AliasTable::ecommerce(),
    };
    let conn_str = database.connection_string()?;
    let config = pipeline.config();

    let client = GptClient::with_api_base(api_key, &backend.api_base)?.with_model(&backend.model);
    info!(model = %client.model(), aliases = aliases.len(), "configured backend");

    let schema = SchemaIntrospector::load(
        Arc::new(PostgresSchemaSource::new(conn_str.clone())),
        config.execution_timeout,
    )
    .await?;
    info!(tables = schema.current().tables.len(), "loaded schema");

    let synthesizer =
        QuerySynthesizer::new(Arc::new(client), Arc::new(aliases)).with_timeout(backend.timeout());

    Ok(Pipeline::new(
        synthesizer,
        Arc::new(PostgresExecutor::new(conn_str)),
        Arc::new(schema),
    )
    .with_config(config))
}

fn build_runtime(thread_label: &'static str) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name_fn(move || {
            static THREAD_ID: AtomicU64 = AtomicU64::new(0);
            let id = THREAD_ID.fetch_add(1, Ordering::Relaxed);
            format!("{thread_label}-thread-{id}")
        })
        .enable_all()
        .build()?;

    Ok(runtime)
}
