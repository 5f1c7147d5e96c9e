use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the stderr tracing layer.
///
/// Operational chatter goes to stderr so query output on stdout stays
/// machine-consumable. `--verbose` raises everything to debug; otherwise
/// `RUST_LOG` applies on top of an info default for this crate.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("qubesdb_config=info".parse().expect("valid log directive"))
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).init();
}
