use std::io::{BufRead, IsTerminal};
use std::time::Duration;

use clap::Parser;

use qubesdb_config::cli::InjectCli;
use qubesdb_config::error::ConfigError;
use qubesdb_config::logging;
use qubesdb_config::sender::{self, SendOptions, SendOutcome};
use qubesdb_config::wire::ConfigSet;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = InjectCli::parse();
    logging::init(cli.verbose);

    let entries = gather_entries(&cli.entries);
    let opts = SendOptions {
        connect_timeout: Duration::from_secs(cli.timeout),
        ..Default::default()
    };

    let path = cli.socket.display().to_string();
    match sender::send(&cli.socket, &entries, opts).await {
        SendOutcome::Delivered(count) => {
            println!("Injected {count} entries via {path}");
            Ok(())
        }
        SendOutcome::Refused => Err(ConfigError::TransportRefused { path }.into()),
        SendOutcome::Timeout => Err(ConfigError::TransportTimeout {
            path,
            seconds: cli.timeout,
        }
        .into()),
        SendOutcome::NotFound => Err(ConfigError::TransportUnavailable { path }.into()),
    }
}

/// Merge entry sources: positional arguments override stdin lines; the
/// sender substitutes the built-in defaults if the merge comes up empty.
fn gather_entries(args: &[String]) -> ConfigSet {
    let mut entries = ConfigSet::new();

    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        for line in stdin.lock().lines().map_while(Result::ok) {
            let line = line.trim();
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.to_string(), value.to_string());
            }
        }
    }

    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    entries
}
