//! Response header reassembly.
//!
//! The native header callback hands over raw bytes in arbitrary pieces.
//! `HeaderLineDecoder` buffers them and emits one `String` per CRLF-terminated
//! line, blank separator lines included. Splitting happens on bytes before
//! decoding, so a multi-byte character cut across two callback invocations is
//! reassembled intact.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

/// Incremental CRLF line splitter for raw header bytes.
#[derive(Debug, Default)]
pub struct HeaderLineDecoder {
    pending: Vec<u8>,
    scanned: usize,
}

impl HeaderLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and push every completed line onto `out`.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        self.pending.extend_from_slice(bytes);
        loop {
            // Resume one byte early so a CR at the end of the last chunk pairs
            // with an LF at the start of this one.
            let from = self.scanned.saturating_sub(1);
            let found = self.pending[from..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .map(|i| i + from);
            match found {
                Some(end) => {
                    let line = String::from_utf8_lossy(&self.pending[..end]).into_owned();
                    self.pending.drain(..end + 2);
                    self.scanned = 0;
                    out.push(line);
                }
                None => {
                    self.scanned = self.pending.len();
                    break;
                }
            }
        }
    }

    /// Emit an unterminated trailing line, if any bytes remain.
    pub fn flush(&mut self, out: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let mut line = String::from_utf8_lossy(&self.pending).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        self.pending.clear();
        self.scanned = 0;
        out.push(line);
    }
}

/// True for a response status line such as `HTTP/2 200`.
pub fn is_status_line(line: &str) -> bool {
    line.starts_with("HTTP/")
}

/// Lines belonging to the last response head.
///
/// With native-followed redirects (and `100 Continue`) the header callback
/// observes several heads in a row; only the last one describes the
/// response the caller receives.
pub fn final_block(lines: &[String]) -> &[String] {
    match lines.iter().rposition(|l| is_status_line(l)) {
        Some(start) => &lines[start + 1..],
        None => lines,
    }
}

/// Build a header collection from raw lines, keeping duplicates.
///
/// Status lines and blank separators are skipped, obsolete folded
/// continuation lines are joined onto the previous value, and lines that do
/// not form a valid header are dropped.
pub fn parse_header_lines(lines: &[String]) -> HeaderMap {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in final_block(lines) {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = pairs.last_mut() {
                let folded = line.trim();
                if !folded.is_empty() {
                    value.push(' ');
                    value.push_str(folded);
                }
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            tracing::debug!(line = %line, "skipping malformed header line");
            continue;
        };
        pairs.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut map = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => tracing::debug!(name = %name, "skipping invalid header"),
        }
    }
    map
}
