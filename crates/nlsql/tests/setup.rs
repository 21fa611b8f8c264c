use assert_cmd::cmd::Command;

#[allow(dead_code)]
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// The binary with configuration from the environment cleared.
pub fn make_cli() -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).expect("Failed to find binary");
    for var in [
        "DATABASE_URL",
        "DB_USER",
        "DB_PASSWORD",
        "DB_HOST",
        "DB_PORT",
        "DB_NAME",
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "NLSQL_MODEL",
        "NLSQL_LANGUAGE",
        "NLSQL_ALIASES",
        "NLSQL_ROW_LIMIT",
        "NLSQL_BIND",
        "NLSQL_LOG_LEVEL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}
