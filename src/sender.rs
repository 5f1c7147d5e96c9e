//! Host-side delivery of a config frame over a Unix socket.
//!
//! The guest may not be listening yet when the host injects config during
//! boot, so "connection refused" is the expected steady-state race here,
//! not a fault. Connects are retried against a bounded deadline and the
//! outcome is classified for a retrying supervisor.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::Instant;

use crate::wire::{self, ConfigSet};

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame written in full; carries the entry count.
    Delivered(usize),
    /// Endpoint exists but the guest rejected every connect before the
    /// deadline. Retryable.
    Refused,
    /// No completed exchange within the deadline. Retryable.
    Timeout,
    /// Endpoint path does not exist at all.
    NotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Overall deadline for the guest to accept the connection and drain
    /// the frame.
    pub connect_timeout: Duration,
    /// Pause between connect attempts while the guest is still booting.
    pub retry_interval: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            retry_interval: Duration::from_millis(500),
        }
    }
}

/// Send `entries` as one frame to the socket at `path`.
///
/// An empty set is never framed: the built-in default set is substituted
/// instead, matching the documented sender contract.
pub async fn send(path: &Path, entries: &ConfigSet, opts: SendOptions) -> SendOutcome {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "socket path does not exist");
        return SendOutcome::NotFound;
    }

    let defaults;
    let entries = if entries.is_empty() {
        tracing::info!("no entries supplied, using built-in defaults");
        defaults = default_entries();
        &defaults
    } else {
        entries
    };

    let frame = wire::render(entries);
    let deadline = Instant::now() + opts.connect_timeout;
    let mut refused = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, UnixStream::connect(path)).await {
            Ok(Ok(mut stream)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let write = async {
                    stream.write_all(&frame).await?;
                    stream.flush().await?;
                    stream.shutdown().await
                };
                return match tokio::time::timeout(remaining, write).await {
                    Ok(Ok(())) => {
                        tracing::info!(
                            count = entries.len(),
                            path = %path.display(),
                            "injected entries"
                        );
                        SendOutcome::Delivered(entries.len())
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(path = %path.display(), "write failed: {e}");
                        SendOutcome::Timeout
                    }
                    Err(_) => SendOutcome::Timeout,
                };
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                refused = true;
                tracing::debug!("connection refused, guest may not be reading yet");
                tokio::time::sleep(opts.retry_interval.min(remaining)).await;
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return SendOutcome::NotFound;
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), "connect error: {e}");
                tokio::time::sleep(opts.retry_interval.min(remaining)).await;
            }
            Err(_) => break,
        }
    }

    if refused {
        SendOutcome::Refused
    } else {
        SendOutcome::Timeout
    }
}

/// Built-in entry set used when neither arguments nor stdin supplied any.
///
/// Mirrors what dom0 would publish for a freshly provisioned AppVM; the
/// identity fields honor `VM_NAME`, `VM_MEM`, and `VM_CPUS` from the host
/// environment.
pub fn default_entries() -> ConfigSet {
    let env_or = |var: &str, fallback: &str| {
        std::env::var(var).unwrap_or_else(|_| fallback.to_string())
    };

    let mut entries = ConfigSet::new();
    let mut put = |k: &str, v: String| entries.insert(k.to_string(), v);

    put("/name", env_or("VM_NAME", "qubes-kvm-node1"));
    put("/type", "AppVM".to_string());
    put("/label", "green".to_string());
    put("/netvm", "sys-firewall".to_string());
    put("/memory", env_or("VM_MEM", "4096"));
    put("/vcpus", env_or("VM_CPUS", "2"));
    put("/qubes-vm-updateable", "False".to_string());
    put("/qubes-base-template", "fedora-41".to_string());
    put("/qubes-vm-persistence", "full".to_string());
    put("/qubes-ip", "10.137.0.100".to_string());
    put("/qubes-netmask", "255.255.255.255".to_string());
    put("/qubes-gateway", "10.137.0.1".to_string());
    put("/qubes-primary-dns", "10.139.1.1".to_string());
    put("/qubes-secondary-dns", "10.139.1.2".to_string());
    entries
}
