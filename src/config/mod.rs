use std::fmt;

use clap::Parser;

use crate::storage::{ConfigError, Credentials, Identifier, QueryTemplate};

/// Helper configuration.
///
/// Read once at startup. Table and column names end up in SQL text, so they
/// are validated before the first line is read.
#[derive(Clone, Parser)]
#[command(name = "domain-acl")]
#[command(about = "External ACL helper: checks whether an authenticated user may access a domain")]
pub struct Config {
    /// Host of the database as DNS name or IP address
    #[arg(long, default_value = "localhost", env = "DOMAIN_ACL_DB_HOST")]
    pub db_host: String,

    /// Port of the database server
    #[arg(long, default_value = "5432", env = "DOMAIN_ACL_DB_PORT")]
    pub db_port: u16,

    /// Name of the database to connect to
    #[arg(long, default_value = "squid", env = "DOMAIN_ACL_DB_NAME")]
    pub db_name: String,

    /// User for database access
    #[arg(long, default_value = "squid", env = "DOMAIN_ACL_DB_USER")]
    pub db_user: String,

    /// Clear text password for database access
    #[arg(
        long,
        default_value = "squidpostgresqlpw",
        env = "DOMAIN_ACL_DB_PASSWORD",
        hide_env_values = true
    )]
    pub db_password: String,

    /// Table (optionally schema-qualified) holding the per-user domain blacklist
    #[arg(
        long,
        default_value = "incrementalproxy.vw_domains_per_user",
        env = "DOMAIN_ACL_DB_TABLE"
    )]
    pub db_table: String,

    /// Column with the domain patterns (SQL LIKE syntax)
    #[arg(long, default_value = "domain", env = "DOMAIN_ACL_COL_DOMAIN")]
    pub col_domain: String,

    /// Column with the usernames
    #[arg(long, default_value = "username", env = "DOMAIN_ACL_COL_USERNAME")]
    pub col_username: String,

    /// Log level (trace, debug, info, warn, error). Logs go to stderr.
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    pub log_level: String,
}

impl Config {
    /// Connection credentials for the policy store.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.db_host.clone(),
            port: self.db_port,
            database: self.db_name.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
        }
    }

    /// Validate the configured identifiers and build the blacklist query.
    pub fn query_template(&self) -> Result<QueryTemplate, ConfigError> {
        let table = Identifier::qualified(&self.db_table)?;
        let username_col = Identifier::column(&self.col_username)?;
        let domain_col = Identifier::column(&self.col_domain)?;

        Ok(QueryTemplate::new(&table, &username_col, &domain_col))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("db_table", &self.db_table)
            .field("col_domain", &self.col_domain)
            .field("col_username", &self.col_username)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_name: "squid".to_string(),
            db_user: "squid".to_string(),
            db_password: "squidpostgresqlpw".to_string(),
            db_table: "incrementalproxy.vw_domains_per_user".to_string(),
            col_domain: "domain".to_string(),
            col_username: "username".to_string(),
            log_level: "warn".to_string(),
        }
    }
}
