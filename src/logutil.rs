//! Logging helpers for raw device text.
//!
//! The node-listing tool prints multi-line tables and stderr chatter; anything that
//! ends up in a log line goes through [`single_line`] so one event stays one line.

use std::fmt::Write;

/// Default preview length for device output in log lines.
pub const DEVICE_PREVIEW: usize = 240;

/// Flatten `s` onto a single line for logging.
///
/// Newlines become `⏎`, tabs become a space, other control characters are shown
/// as `\xNN`. Output is capped at `max_chars` characters followed by `…` and the
/// number of characters dropped.
pub fn single_line(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    let total = trimmed.chars().count();
    let mut out = String::with_capacity(trimmed.len().min(max_chars) + 16);
    for ch in trimmed.chars().take(max_chars) {
        match ch {
            '\r' => {}
            '\n' => out.push('⏎'),
            '\t' => out.push(' '),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    if total > max_chars {
        let _ = write!(&mut out, "…(+{} chars)", total - max_chars);
    }
    out
}
