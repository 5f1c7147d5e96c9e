use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;

use qubesdb_config::cache::CacheStore;
use qubesdb_config::cli::ReadCli;
use qubesdb_config::error::ConfigError;
use qubesdb_config::logging;
use qubesdb_config::receiver::{self, ReceiveOptions, ReceiveOutcome};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = ReadCli::parse();
    logging::init(cli.verbose);

    let store = CacheStore::new(&cli.cache_dir);

    // Query modes hit the cache only; no transport involved.
    if let Some(key) = cli.get.as_deref() {
        let value = store.get(key)?;
        println!("{value}");
        return Ok(());
    }
    if cli.list {
        for (key, value) in store.list()? {
            println!("{key} = {value}");
        }
        return Ok(());
    }
    if cli.json {
        let entries = store.load()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).into_diagnostic()?
        );
        return Ok(());
    }

    let opts = ReceiveOptions {
        wait_timeout: Duration::from_secs(cli.wait_timeout),
        read_timeout: Duration::from_secs(cli.read_timeout),
        ..Default::default()
    };

    match receiver::run(&cli.port, &store, opts).await? {
        ReceiveOutcome::Fresh(entries) => {
            tracing::info!(count = entries.len(), "entries loaded");
            for (key, value) in &entries {
                tracing::info!("  {key} = {value}");
            }
            Ok(())
        }
        ReceiveOutcome::Cached(_) => Ok(()),
        ReceiveOutcome::Unavailable => Err(ConfigError::CacheUnavailable.into()),
    }
}
