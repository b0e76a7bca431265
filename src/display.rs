//! Terminal dashboard.
//!
//! [`render`] is a pure function of the store, our position, the terminal size
//! and the current time; [`Dashboard`] only clears the screen and prints what it
//! returns. Three layouts are chosen by width (full ≥ 100, medium ≥ 60, compact)
//! and the node list is cut to what fits vertically.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use crossterm::{cursor, execute, terminal};

use crate::meshtastic::clean_value;
use crate::position::Position;
use crate::storage::{NodeStore, SeenNodeRecord, Timestamp};

const MAX_RULE: usize = 110;
/// Size used when the terminal cannot be queried (e.g. output is piped).
pub const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// Inputs of one frame.
pub struct Frame<'a> {
    pub store: &'a NodeStore,
    pub ours: &'a Position,
    pub history_file: &'a Path,
    pub width: u16,
    pub height: u16,
    pub now: Timestamp,
}

pub fn render(frame: &Frame<'_>) -> String {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let tracked = frame.store.tracked_count();
    let clock = frame.now.format("%H:%M:%S");
    let rule = "=".repeat(width.min(MAX_RULE));
    let mut out = String::new();

    let _ = writeln!(out, "📡 Live Meshtastic Node Logger");
    let _ = writeln!(out, "{rule}");
    if width < 80 {
        let _ = writeln!(out, "Nodes: {tracked} | {clock}");
    } else {
        let _ = writeln!(out, "CSV Log: {}", frame.history_file.display());
        let _ = writeln!(out, "Unique Nodes Seen: {tracked}");
        let _ = writeln!(out, "Last Update: {clock}");
    }
    let _ = writeln!(out, "{}", position_line(frame.ours, width));
    if width >= 50 {
        let _ = writeln!(out, "\nPress Ctrl+C to stop");
    }
    let _ = writeln!(out, "{rule}");

    if tracked == 0 {
        let _ = writeln!(out, "\nNo nodes detected yet...");
        return out;
    }

    // Title and rule, status lines, position, Ctrl+C hint, rule, "showing" line,
    // column header and its rule.
    let status_lines = if width >= 80 { 3 } else { 1 };
    let hint_lines = if width >= 50 { 1 } else { 0 };
    let header_lines = 2 + status_lines + 1 + hint_lines + 1 + 1 + 2;
    let max_rows = height.saturating_sub(header_lines + 1).max(1);

    let rows: Vec<&SeenNodeRecord> = frame.store.iter_recent().take(max_rows).collect();
    if tracked > rows.len() {
        if width >= 60 {
            let _ = writeln!(
                out,
                "\nShowing {} of {} nodes (most recent)",
                rows.len(),
                tracked
            );
        } else {
            let _ = writeln!(out, "\n{}/{} nodes", rows.len(), tracked);
        }
    }

    let layout = Layout::for_width(width);
    let _ = writeln!(out, "\n{}", layout.header());
    let _ = writeln!(out, "{}", "-".repeat(layout.rule_width().min(width)));
    for rec in rows {
        let _ = writeln!(out, "{}", layout.row(rec, frame.ours, &frame.now));
    }
    out
}

fn position_line(ours: &Position, width: usize) -> String {
    match (ours.latitude, ours.longitude) {
        (Some(lat), Some(lon)) if width < 80 => format!("📍 {lat:.4},{lon:.4}"),
        (Some(lat), Some(lon)) => match ours.altitude {
            Some(alt) => format!("📍 Our Location: {lat:.6}, {lon:.6}, Alt: {alt:.1}m"),
            None => format!("📍 Our Location: {lat:.6}, {lon:.6}"),
        },
        _ => "📍 GPS not available".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Full,
    Medium,
    Compact,
}

impl Layout {
    fn for_width(width: usize) -> Self {
        if width >= 100 {
            Layout::Full
        } else if width >= 60 {
            Layout::Medium
        } else {
            Layout::Compact
        }
    }

    fn rule_width(self) -> usize {
        match self {
            Layout::Full => MAX_RULE,
            Layout::Medium => 60,
            Layout::Compact => 30,
        }
    }

    fn header(self) -> String {
        match self {
            Layout::Full => format!(
                "{:<12} {:<20} {:<18} {:<8} {:<12} {:<20} {:<20}",
                "ID", "Name", "Hardware", "SNR", "Last Seen", "Node Location", "Our Location"
            ),
            Layout::Medium => format!(
                "{:<10} {:<16} {:<12} {:<6} {:<8}",
                "ID", "Name", "Hardware", "SNR", "Time"
            ),
            Layout::Compact => format!("{:<8} {:<12} {:<4}", "ID", "Name", "SNR"),
        }
    }

    fn row(self, rec: &SeenNodeRecord, ours: &Position, now: &Timestamp) -> String {
        let id = rec.id.as_str();
        let name = rec.long_name.as_deref().unwrap_or("Unknown");
        let hw = rec.hw_model.as_deref().unwrap_or("");
        let snr = rec
            .snr
            .as_deref()
            .map(clean_value)
            .unwrap_or_else(|| "N/A".to_string());
        let age = format_age(now, &rec.last_seen);
        match self {
            Layout::Full => {
                let node_loc = match (&rec.latitude, &rec.longitude) {
                    (Some(lat), Some(lon)) => format!("{},{}", cut(lat, 8), cut(lon, 8)),
                    _ => String::new(),
                };
                let our_loc = match (ours.latitude, ours.longitude) {
                    (Some(lat), Some(lon)) => format!("{lat:.4},{lon:.4}"),
                    _ => String::new(),
                };
                format!(
                    "{:<12} {:<20} {:<18} {:<8} {:<12} {:<20} {:<20}",
                    cut(id, 12),
                    cut(name, 19),
                    cut(hw, 17),
                    snr,
                    age,
                    node_loc,
                    our_loc
                )
            }
            Layout::Medium => format!(
                "{:<10} {:<16} {:<12} {:<6} {:<8}",
                cut(id, 10),
                cut(name, 15),
                cut(hw, 11),
                snr,
                age
            ),
            Layout::Compact => format!("{:<8} {:<12} {:<4}", cut(id, 8), cut(name, 12), snr),
        }
    }
}

/// `42s`, `7m`, `3h`.
pub fn format_age(now: &Timestamp, then: &Timestamp) -> String {
    let secs = now.signed_duration_since(*then).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}

fn cut(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Clears the terminal and draws frames on stdout.
pub struct Dashboard {
    out: io::Stdout,
}

impl Dashboard {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    /// Current terminal size, or [`FALLBACK_SIZE`].
    pub fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or(FALLBACK_SIZE)
    }

    pub fn present(&mut self, text: &str) -> io::Result<()> {
        execute!(
            self.out,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}
