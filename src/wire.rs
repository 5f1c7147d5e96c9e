//! QubesDB KVM config wire format.
//!
//! A frame is the header marker, newline-delimited `key=value` lines, and
//! the footer marker. There is no length field and no checksum; the receiver
//! detects frame completion by finding the footer byte sequence inside the
//! accumulated stream.

use std::collections::BTreeMap;

/// Marker opening every config frame.
pub const HEADER: &str = "QUBESDB-KVM-CONFIG\n";

/// Marker terminating every config frame.
pub const FOOTER: &str = "\nQUBESDB-END\n";

/// One delivery's key/value mapping.
///
/// A `BTreeMap` gives sorted iteration for `list` output and last-write-wins
/// semantics for duplicate keys within a frame.
pub type ConfigSet = BTreeMap<String, String>;

/// Render a config set into a complete frame.
pub fn render(entries: &ConfigSet) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER.len() + FOOTER.len() + entries.len() * 32);
    out.extend_from_slice(HEADER.as_bytes());
    for (key, value) in entries {
        out.extend_from_slice(format!("{key}={value}\n").as_bytes());
    }
    out.extend_from_slice(FOOTER.as_bytes());
    out
}

/// Parse frame bytes into a config set.
///
/// Undecodable bytes are substituted rather than rejected. Blank lines, the
/// marker text itself, and lines without `=` are skipped; every other line
/// splits on the first `=`, so values may themselves contain `=`.
pub fn parse(data: &[u8]) -> ConfigSet {
    let text = String::from_utf8_lossy(data);
    let mut entries = ConfigSet::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line == HEADER.trim_end() || line == FOOTER.trim() {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.to_string(), value.to_string());
        }
    }
    entries
}

/// Streaming footer detector.
///
/// Chunks are appended to an internal buffer and only the window that could
/// newly contain the footer (the previous `FOOTER.len() - 1` tail bytes plus
/// the chunk) is searched, so each byte is scanned a bounded number of times
/// regardless of how the stream is chunked.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: Vec<u8>,
    frame_end: Option<usize>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns true once a complete frame has been observed.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.frame_end.is_some() {
            return true;
        }
        let window = self.buf.len().saturating_sub(FOOTER.len() - 1);
        self.buf.extend_from_slice(chunk);
        if let Some(pos) = find(&self.buf[window..], FOOTER.as_bytes()) {
            self.frame_end = Some(window + pos + FOOTER.len());
        }
        self.frame_end.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.frame_end.is_some()
    }

    /// Bytes up to and including the footer, or the whole buffer if the
    /// footer was never observed.
    pub fn frame(&self) -> &[u8] {
        match self.frame_end {
            Some(end) => &self.buf[..end],
            None => &self.buf,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
