use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Args, Parser};
use logutil::LogFormat;
use nlsql_core::orchestrator::{DEFAULT_PREVIEW_ROWS, PipelineConfig};
use nlsql_core::prompt::Language;
use nlsql_gpt::client::{DEFAULT_MODEL, OPENAI_API_ROOT};
use nlsql_postgres::config::{ConnectionParams, DEFAULT_PORT};
use tracing::Level;

use crate::commands::Commands;

#[derive(Parser)]
#[clap(name = "nlsql")]
#[clap(version)]
#[clap(about = "Ask a Postgres database questions in natural language", long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub logging: LoggingArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct LoggingArgs {
    /// Log verbosity. `RUST_LOG` takes precedence when set.
    #[arg(long, global = true, env = "NLSQL_LOG_LEVEL", default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Format of log lines written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::HumanReadable)]
    pub log_format: LogFormat,
}

#[derive(Args, Debug)]
pub struct DatabaseArgs {
    /// Postgres connection url. Takes precedence over the individual parts.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = DEFAULT_PORT)]
    pub db_port: u16,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,
}

impl DatabaseArgs {
    pub fn connection_string(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }

        match (&self.db_user, &self.db_name) {
            (Some(user), Some(dbname)) => {
                let params = ConnectionParams {
                    user: user.clone(),
                    password: self.db_password.clone(),
                    host: self.db_host.clone(),
                    port: self.db_port,
                    dbname: dbname.clone(),
                };
                Ok(params.to_url()?)
            }
            _ => Err(anyhow!(
                "no database configured, set DATABASE_URL or DB_USER and DB_NAME"
            )),
        }
    }
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Api key for the chat completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for synthesis and repair.
    #[arg(long, env = "NLSQL_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Root of an OpenAI compatible api.
    #[arg(long, env = "OPENAI_API_BASE", default_value = OPENAI_API_ROOT)]
    pub api_base: String,

    /// Seconds to wait for a completion before giving up.
    #[arg(long, default_value_t = 60)]
    pub backend_timeout_secs: u64,
}

impl BackendArgs {
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Language of prompts and warnings (tr or en).
    #[arg(long, env = "NLSQL_LANGUAGE", default_value = "tr")]
    pub language: Language,

    /// Json object file mapping phrases to column names. Defaults to the
    /// built-in e-commerce vocabulary.
    #[arg(long, env = "NLSQL_ALIASES")]
    pub aliases: Option<PathBuf>,

    /// Seconds a statement may run before it counts as failed.
    #[arg(long, default_value_t = 30)]
    pub db_timeout_secs: u64,

    /// Append `LIMIT n` to statements that don't have a limit.
    #[arg(long, env = "NLSQL_ROW_LIMIT")]
    pub row_limit: Option<u64>,

    /// Rows of the previous result shown to the model as context.
    #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
    pub preview_rows: usize,
}

impl PipelineArgs {
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            language: self.language,
            execution_timeout: Duration::from_secs(self.db_timeout_secs),
            row_limit: self.row_limit,
            preview_rows: self.preview_rows,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TCP address to bind the http api to.
    #[arg(short, long, env = "NLSQL_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Seconds a session may stay unused before its memory is dropped.
    #[arg(long, default_value_t = 1800)]
    pub session_ttl_secs: u64,

    #[clap(flatten)]
    pub database: DatabaseArgs,

    #[clap(flatten)]
    pub backend: BackendArgs,

    #[clap(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Question to answer. If omitted, questions are read from stdin one per
    /// line and answered within one conversation.
    #[clap(trailing_var_arg = true)]
    pub question: Vec<String>,

    /// Only print the generated statement, don't run it.
    #[arg(long)]
    pub generate_only: bool,

    #[clap(flatten)]
    pub database: DatabaseArgs,

    #[clap(flatten)]
    pub backend: BackendArgs,

    #[clap(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Print the schema as json instead of prompt text.
    #[arg(long)]
    pub json: bool,

    #[clap(flatten)]
    pub database: DatabaseArgs,
}
