//! Bounded input samples for fast previews.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// First `max_lines` lines of the file at `path`, newline-terminated.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so Latin-1 input still previews.
pub async fn read_head(path: &Path, max_lines: usize) -> io::Result<String> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut out = String::new();
    for _ in 0..max_lines {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        out.push_str(&String::from_utf8_lossy(&buf));
        out.push('\n');
    }
    Ok(out)
}

/// Prefix of pasted text limited to `max_lines` lines and `max_bytes` bytes.
pub fn bound_text(text: &str, max_lines: usize, max_bytes: usize) -> &str {
    let by_lines = match text.match_indices('\n').nth(max_lines.saturating_sub(1)) {
        Some((idx, _)) if max_lines > 0 => &text[..=idx],
        _ if max_lines == 0 => "",
        _ => text,
    };
    if by_lines.len() <= max_bytes {
        return by_lines;
    }
    let mut cut = max_bytes;
    while !by_lines.is_char_boundary(cut) {
        cut -= 1;
    }
    &by_lines[..cut]
}
