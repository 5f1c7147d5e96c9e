//! Guest-side read of a config frame, with cache fallback.
//!
//! The reader runs early in guest boot: the virtio port may not exist yet,
//! and the host may inject the frame seconds later. Every wait here is
//! bounded by its own deadline, and every transport failure degrades to
//! serving the existing cache instead of failing boot.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::cache::CacheStore;
use crate::error::ConfigError;
use crate::wire::{self, ConfigSet, FrameScanner};

#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    /// Deadline for the endpoint path to appear.
    pub wait_timeout: Duration,
    /// Deadline for a complete frame once the endpoint exists. Independent
    /// of `wait_timeout`.
    pub read_timeout: Duration,
    /// Poll interval while waiting for the endpoint path.
    pub poll_interval: Duration,
    /// Backoff after a read that returned no data. The port stays open
    /// while the host side is idle; zero bytes is not end-of-stream.
    pub read_backoff: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            read_backoff: Duration::from_millis(100),
        }
    }
}

/// Result of one read-or-fallback cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Fresh frame received and cached.
    Fresh(ConfigSet),
    /// Nothing fresh arrived; served the prior cache, which was left
    /// untouched.
    Cached(ConfigSet),
    /// No fresh data and no prior cache either.
    Unavailable,
}

/// Wait for the endpoint, read one frame, and either persist it or fall
/// back to the existing cache.
///
/// Transport and framing failures are absorbed into the fallback path; the
/// only errors surfaced are cache I/O problems.
pub async fn run(
    port: &Path,
    store: &CacheStore,
    opts: ReceiveOptions,
) -> Result<ReceiveOutcome, ConfigError> {
    let fresh = read_from_port(port, opts).await;
    if !fresh.is_empty() {
        store.save(&fresh)?;
        return Ok(ReceiveOutcome::Fresh(fresh));
    }

    let cached = store.load()?;
    if cached.is_empty() {
        tracing::warn!("no configuration available from transport or cache");
        Ok(ReceiveOutcome::Unavailable)
    } else {
        tracing::info!(count = cached.len(), "no new data, serving cached entries");
        Ok(ReceiveOutcome::Cached(cached))
    }
}

/// Read one frame from the endpoint.
///
/// Returns an empty set when the endpoint never appears, the read deadline
/// passes with nothing parseable, or the frame holds no valid lines. The
/// buffer accumulated by the deadline is still parsed even if the footer
/// was never observed.
pub async fn read_from_port(port: &Path, opts: ReceiveOptions) -> ConfigSet {
    if !wait_for_endpoint(port, opts).await {
        return ConfigSet::new();
    }

    let mut reader = match open_endpoint(port).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(port = %port.display(), "failed to open endpoint: {e}");
            return ConfigSet::new();
        }
    };

    tracing::info!(port = %port.display(), "reading config frame");
    let mut scanner = FrameScanner::new();
    let mut chunk = [0u8; 4096];
    let deadline = Instant::now() + opts.read_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                // Nothing available right now; poll again shortly.
                tokio::time::sleep(opts.read_backoff.min(remaining)).await;
            }
            Ok(Ok(n)) => {
                if scanner.push(&chunk[..n]) {
                    break;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(port = %port.display(), "read error: {e}");
                break;
            }
            Err(_) => break,
        }
    }

    if !scanner.is_complete() {
        tracing::debug!(port = %port.display(), "footer not observed, parsing partial buffer");
    }
    wire::parse(scanner.frame())
}

/// Poll for the endpoint path at a fixed interval, bounded by `wait_timeout`.
async fn wait_for_endpoint(port: &Path, opts: ReceiveOptions) -> bool {
    if port.exists() {
        return true;
    }
    tracing::info!(port = %port.display(), "waiting for endpoint");
    let deadline = Instant::now() + opts.wait_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::warn!(port = %port.display(), "endpoint did not appear, falling back to cache");
            return false;
        }
        tokio::time::sleep(opts.poll_interval.min(remaining)).await;
        if port.exists() {
            return true;
        }
    }
}

/// Open the endpoint for reading. A socket path gets a stream connection;
/// anything else (character device, regular file) is opened directly. The
/// framing above this point is identical either way.
async fn open_endpoint(port: &Path) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    use std::os::unix::fs::FileTypeExt;

    let is_socket = std::fs::metadata(port)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false);

    if is_socket {
        let stream = tokio::net::UnixStream::connect(port).await?;
        Ok(Box::new(stream))
    } else {
        let file = tokio::fs::File::open(port).await?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn sample() -> ConfigSet {
        [("/name", "work"), ("/memory", "4096")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fast_opts() -> ReceiveOptions {
        ReceiveOptions {
            wait_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
            read_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn reads_frame_from_file_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("port");
        std::fs::write(&port, wire::render(&sample())).unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let outcome = run(&port, &store, fast_opts()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Fresh(sample()));
        assert_eq!(store.load().unwrap(), sample());
        assert_eq!(store.get("/name").unwrap(), "work");
    }

    #[tokio::test]
    async fn reads_frame_from_socket_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("port.sock");
        let listener = tokio::net::UnixListener::bind(&port).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&wire::render(&sample())).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        let store = CacheStore::new(dir.path().join("cache"));

        let outcome = run(&port, &store, fast_opts()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Fresh(sample()));
    }

    #[tokio::test]
    async fn missing_endpoint_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        store.save(&sample()).unwrap();
        let before = store.load().unwrap();

        let outcome = run(&dir.path().join("never"), &store, fast_opts())
            .await
            .unwrap();
        assert_eq!(outcome, ReceiveOutcome::Cached(before.clone()));
        assert_eq!(store.load().unwrap(), before);
    }

    #[tokio::test]
    async fn missing_endpoint_and_empty_cache_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let outcome = run(&dir.path().join("never"), &store, fast_opts())
            .await
            .unwrap();
        assert_eq!(outcome, ReceiveOutcome::Unavailable);
    }

    #[tokio::test]
    async fn wait_deadline_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let started = std::time::Instant::now();
        let _ = run(&dir.path().join("never"), &store, fast_opts())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn garbage_only_frame_does_not_clobber_cache() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("port");
        // Header plus a line with no `=` and no footer: parses to nothing.
        std::fs::write(&port, b"QUBESDB-KVM-CONFIG\ngarbage\n").unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        store.save(&sample()).unwrap();

        let outcome = run(&port, &store, fast_opts()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Cached(sample()));
        assert_eq!(store.load().unwrap(), sample());
    }

    #[tokio::test]
    async fn truncated_frame_still_yields_valid_lines() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("port");
        // Valid lines but no footer: parsed once the read deadline passes.
        std::fs::write(&port, b"QUBESDB-KVM-CONFIG\n/name=work\n").unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let outcome = run(&port, &store, fast_opts()).await.unwrap();
        match outcome {
            ReceiveOutcome::Fresh(entries) => {
                assert_eq!(entries.get("/name").map(String::as_str), Some("work"));
            }
            other => panic!("expected fresh entries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_line_between_valid_lines_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let port = dir.path().join("port");
        let mut frame = b"QUBESDB-KVM-CONFIG\n/a=1\ngarbage-no-equals\n/b=2\n".to_vec();
        frame.extend_from_slice(wire::FOOTER.as_bytes());
        std::fs::write(&port, frame).unwrap();
        let store = CacheStore::new(dir.path().join("cache"));

        let outcome = run(&port, &store, fast_opts()).await.unwrap();
        let expected: ConfigSet = [("/a", "1"), ("/b", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(outcome, ReceiveOutcome::Fresh(expected));
    }
}
