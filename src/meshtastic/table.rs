//! Parser for the box-drawn node table printed by `meshtastic --nodes`.
//!
//! The tool prints something like:
//!
//! ```text
//! ╒═════╤═════════╤═══════════╤═════╤══════════╤ ... ╕
//! │   N │ User    │ ID        │ AKA │ Hardware │ ... │
//! ╞═════╪═════════╪═══════════╪═════╪══════════╪ ... ╡
//! │   1 │ Alice   │ !abcd1234 │ ALC │ TBEAM    │ ... │
//! ╘═════╧═════════╧═══════════╧═════╧══════════╧ ... ╛
//! ```
//!
//! Only rows whose first cell is a row number are data. Everything else (borders,
//! the header, wrapped continuation lines, warnings the tool prints around the
//! table) is skipped without error.

use std::fmt;

/// Cell delimiter used by data rows.
pub const DELIMITER: char = '│';
/// Placeholder the tool prints for missing values.
pub const NOT_AVAILABLE: &str = "N/A";

/// Identifier of a mesh node as printed in the ID column (e.g. `!abcd1234`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// One node row from a single poll. Values keep the tool's text (`42.36°`,
/// `-5 dB`, `15m`); see [`clean_value`] for the persisted form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeObservation {
    pub id: NodeId,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub hw_model: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub altitude: Option<String>,
    pub snr: Option<String>,
    /// Not reported by the node table; kept so rows carry the full column set.
    pub rssi: Option<String>,
    pub last_heard: Option<String>,
    pub since: Option<String>,
}

/// Fixed zero-based column offsets of the node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub seq: usize,
    pub long_name: usize,
    pub id: usize,
    pub short_name: usize,
    pub hw_model: usize,
    pub latitude: usize,
    pub longitude: usize,
    pub altitude: usize,
    pub snr: usize,
    pub last_heard: usize,
    /// Optional trailing column; rows may stop before it.
    pub since: usize,
    /// Rows with fewer cells are not data rows.
    pub min_columns: usize,
}

/// Layout printed by the Meshtastic Python CLI.
pub const NODE_TABLE: TableSchema = TableSchema {
    seq: 0,
    long_name: 1,
    id: 2,
    short_name: 3,
    hw_model: 4,
    latitude: 7,
    longitude: 8,
    altitude: 9,
    snr: 13,
    last_heard: 16,
    since: 17,
    min_columns: 17,
};

/// Result of comparing an observed header row against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    /// No header row in the text.
    Missing,
    /// Header is wide enough for every required column.
    Fits { columns: usize },
    /// Header has fewer columns than the schema requires.
    TooNarrow { columns: usize, required: usize },
}

impl TableSchema {
    /// Parse every data row in `text`. Never fails; bad rows are dropped.
    pub fn parse(&self, text: &str) -> Vec<NodeObservation> {
        text.lines()
            .filter_map(split_cells)
            .filter_map(|cells| self.observation_from_cells(&cells))
            .collect()
    }

    /// Locate the header row (first table row that is not a data row) and check
    /// its width.
    pub fn check_header(&self, text: &str) -> HeaderCheck {
        let header = text
            .lines()
            .filter_map(split_cells)
            .find(|cells| cells.first().map_or(false, |c| !is_row_number(c)));
        match header {
            None => HeaderCheck::Missing,
            Some(cells) if cells.len() < self.min_columns => HeaderCheck::TooNarrow {
                columns: cells.len(),
                required: self.min_columns,
            },
            Some(cells) => HeaderCheck::Fits {
                columns: cells.len(),
            },
        }
    }

    fn observation_from_cells(&self, cells: &[&str]) -> Option<NodeObservation> {
        if cells.len() < self.min_columns || !is_row_number(cells[self.seq]) {
            return None;
        }
        let field = |idx: usize| cells.get(idx).and_then(|c| available(c));
        let id = field(self.id)?;
        Some(NodeObservation {
            id: NodeId(id),
            long_name: field(self.long_name),
            short_name: field(self.short_name),
            hw_model: field(self.hw_model),
            latitude: field(self.latitude),
            longitude: field(self.longitude),
            altitude: field(self.altitude),
            snr: field(self.snr),
            rssi: None,
            last_heard: field(self.last_heard),
            since: field(self.since),
        })
    }
}

/// Parse the node table with the default [`NODE_TABLE`] layout.
pub fn parse_node_table(text: &str) -> Vec<NodeObservation> {
    NODE_TABLE.parse(text)
}

/// Split a table row into trimmed cells, or `None` for non-row lines. Border rows
/// lead with `╒`, `╞` or `╘` and never match.
fn split_cells(line: &str) -> Option<Vec<&str>> {
    let line = line.trim_end_matches('\r');
    if !line.starts_with(DELIMITER) {
        return None;
    }
    let mut cells: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    // Segment before the leading delimiter and after the trailing one.
    cells.remove(0);
    cells.pop();
    Some(cells)
}

fn is_row_number(cell: &str) -> bool {
    !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit())
}

fn available(cell: &str) -> Option<String> {
    if cell.is_empty() || cell == NOT_AVAILABLE {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Strip display units from a numeric cell: `42.36°` -> `42.36`, `-5 dB` -> `-5`,
/// `15m` -> `15`.
pub fn clean_value(raw: &str) -> String {
    let s = raw.replace('°', "");
    let s = s.trim();
    let s = s
        .strip_suffix("dB")
        .or_else(|| s.strip_suffix('m'))
        .unwrap_or(s);
    s.trim().to_string()
}
