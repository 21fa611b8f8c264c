//! Postgres implementations of the executor and schema source.

pub mod config;
pub mod errors;
pub mod executor;
pub mod schema;

use tokio_postgres::{Client, NoTls};
use tracing::debug;

use crate::errors::{PostgresError, Result};

/// Open a connection and drive it on the runtime. The connection closes when
/// the returned client is dropped.
async fn connect(conn_str: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
        .await
        .map_err(PostgresError::connect)?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(%e, "postgres connection errored");
        }
    });

    Ok(client)
}
