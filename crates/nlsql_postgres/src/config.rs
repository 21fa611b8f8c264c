use std::fmt;

use url::Url;

use crate::errors::{PostgresError, Result};

pub const DEFAULT_PORT: u16 = 5432;

/// Connection parameters given as separate parts rather than a url.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub user: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
}

impl ConnectionParams {
    /// Connection url with user and password percent encoded.
    pub fn to_url(&self) -> Result<String> {
        let invalid = |what: &str| PostgresError::InvalidConnection(format!("invalid {what}"));

        let mut url = Url::parse("postgresql://localhost")
            .map_err(|e| PostgresError::InvalidConnection(e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| PostgresError::InvalidConnection(format!("invalid host: {e}")))?;
        url.set_port(Some(self.port)).map_err(|_| invalid("port"))?;
        url.set_username(&self.user).map_err(|_| invalid("user"))?;
        url.set_password(self.password.as_deref())
            .map_err(|_| invalid("password"))?;
        url.set_path(&self.dbname);

        Ok(url.to_string())
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}
