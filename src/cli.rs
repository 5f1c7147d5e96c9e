use clap::Parser;
use std::path::PathBuf;

use crate::paths;

#[derive(Parser, Debug)]
#[command(
    name = "qubesdb-config-inject",
    about = "Send QubesDB config entries to a KVM guest over virtio-serial"
)]
pub struct InjectCli {
    /// Unix socket path of the guest's virtio-serial config port
    pub socket: PathBuf,

    /// KEY=VALUE entries (override stdin and the built-in defaults)
    pub entries: Vec<String>,

    /// Seconds to wait for the guest to accept the connection
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "qubesdb-config-read",
    about = "Read QubesDB config from the virtio-serial port and cache it"
)]
pub struct ReadCli {
    /// Print the cached value for one key
    #[arg(long, value_name = "KEY", conflicts_with_all = ["list", "json"])]
    pub get: Option<String>,

    /// List all cached entries, sorted by key
    #[arg(long, conflicts_with = "json")]
    pub list: bool,

    /// Dump the cached entries as JSON
    #[arg(long)]
    pub json: bool,

    /// Virtio-serial port (or socket) to read from
    #[arg(long, default_value = paths::DEFAULT_PORT)]
    pub port: PathBuf,

    /// Cache directory
    #[arg(long, default_value = paths::DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Seconds to wait for the port to appear
    #[arg(long, default_value_t = 30)]
    pub wait_timeout: u64,

    /// Seconds to wait for a complete frame once the port exists
    #[arg(long, default_value_t = 30)]
    pub read_timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
