use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;

use domain_acl::config::Config;
use domain_acl::observability::init_tracing;
use domain_acl::protocol::ProtocolLoop;
use domain_acl::session::Session;
use domain_acl::storage::PostgresStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing (stderr only)
    init_tracing(&config.log_level);

    // Table and column names are spliced into SQL, validate before anything else
    let template = config
        .query_template()
        .context("Invalid table or column name")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.db_host,
        database = %config.db_name,
        table = %config.db_table,
        "Starting domain ACL helper"
    );

    // Connection is opened lazily by the first request
    let session = Session::new(PostgresStore::new(), config.credentials(), template);

    let mut helper = ProtocolLoop::new(session);
    let served = helper
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;

    helper.metrics().log_summary();
    served.context("Helper protocol I/O failed")?;

    info!("Shutdown complete");
    Ok(())
}
