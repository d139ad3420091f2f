//! Header-Block Scanning
//!
//! This module implements the two lookups the mirror needs over a raw HTTP
//! header block: finding where the headers end (and the body begins), and
//! extracting the value of a named header.
//!
//! ## Design Philosophy
//!
//! 1. **Bytes in, bytes out**: The mirror echoes the request verbatim, so the
//!    block is never decoded into UTF-8. Header names are ASCII and the
//!    lookups only need ASCII case folding, which works on raw bytes.
//! 2. **Idempotent**: The accumulator grows with every socket read and the
//!    terminator may straddle two reads, so [`body_start`] is re-run on the
//!    whole block after each read. It keeps no state between calls.
//! 3. **Explicit line splitting**: Header lookup walks the block line by line
//!    with a simple case-insensitive substring match. This keeps the
//!    "first match wins" contract easy to reason about.
//!
//! ## How the Scan Works
//!
//! Lines are delimited by `\n` with an optional trailing `\r` stripped, so
//! both `\r\n\r\n` and bare `\n\n` terminate a header block. The terminator
//! is the first *complete* empty line; a trailing `\r` still waiting for its
//! `\n` does not count, which is what makes the chunk-boundary case work.

/// Returns the offset of the first body byte in `block`, i.e. the byte just
/// past the first empty line, or `None` if no terminator has arrived yet.
///
/// # Example
///
/// ```
/// use httpmirror::protocol::body_start;
///
/// let block = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nhello";
/// assert_eq!(body_start(block), Some(27));
/// assert_eq!(body_start(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
/// ```
pub fn body_start(block: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (i, &byte) in block.iter().enumerate() {
        if byte != b'\n' {
            continue;
        }
        let line = &block[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Some(i + 1);
        }
        line_start = i + 1;
    }
    None
}

/// Looks up the value of `name` in a raw header block.
///
/// The search is case-insensitive and tolerates the header name appearing
/// anywhere within a line, not only at the start. The value is the remainder
/// of the matching line after the colon, with surrounding ASCII whitespace
/// trimmed. The first matching line wins; later occurrences are ignored.
pub fn header_value<'a>(block: &'a [u8], name: &str) -> Option<&'a [u8]> {
    let needle = format!("{name}:");
    let needle = needle.as_bytes();

    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if let Some(pos) = find_ignore_ascii_case(line, needle) {
            return Some(line[pos + needle.len()..].trim_ascii());
        }
    }
    None
}

/// Finds the first case-insensitive occurrence of `needle` in `haystack`.
fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
