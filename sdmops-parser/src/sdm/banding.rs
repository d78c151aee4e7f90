//! Row and column reconstruction from token coordinates.
//!
//! The conversion step discards all table structure, so rows and columns are
//! recovered geometrically. Two modes exist:
//!
//! - `make_rows` bands tokens into visual rows by vertical proximity. Used
//!   by the legacy-layout extractors, where each record starts on a row whose
//!   first cell looks like an opcode.
//! - `make_table` partitions tokens into columns against the header's left
//!   anchors and groups them into logical rows around a key column, so a
//!   record whose opcode, instruction, and description wrap over several
//!   visual lines still comes back as one row.
//!
//! Both sort their input before grouping; the caller may hand tokens in any
//! order. End-of-table tokens must be trimmed off beforehand (see
//! [`crate::sdm::boundary`]), otherwise banding produces garbage rows.

use crate::sdm::token::{sort_by_top_then_left, PositionedToken};

/// Vertical distance within which tokens belong to the same visual row.
pub const ROW_BAND_TOLERANCE: f64 = 7.0;

/// Negative horizontal tolerance when assigning a token to a column anchor;
/// absorbs cells indented slightly left of their nominal boundary.
pub const COLUMN_JITTER: f64 = 5.0;

/// How far above its key token a logical row's content may start.
pub const KEY_ROW_LOOKBACK: f64 = 10.0;

/// One visual row: tokens sharing a vertical band, left-to-right.
#[derive(Debug, Clone)]
pub struct Row {
    pub top: f64,
    pub tokens: Vec<PositionedToken>,
}

/// Band tokens into visual rows, top-to-bottom.
pub fn make_rows(tokens: &[PositionedToken]) -> Vec<Row> {
    let mut sorted = tokens.to_vec();
    sort_by_top_then_left(&mut sorted);

    let mut rows: Vec<Row> = Vec::new();
    for token in sorted {
        match rows.last_mut() {
            Some(row) if token.top - row.top <= ROW_BAND_TOLERANCE => row.tokens.push(token),
            _ => rows.push(Row {
                top: token.top,
                tokens: vec![token],
            }),
        }
    }
    for row in &mut rows {
        row.tokens
            .sort_by(|a, b| a.left.total_cmp(&b.left).then(a.top.total_cmp(&b.top)));
    }
    rows
}

/// One logical table row: a token cell per column.
#[derive(Debug, Clone)]
pub struct TableRow {
    pub cells: Vec<Vec<PositionedToken>>,
}

impl TableRow {
    /// Flattened text of one cell; empty string for an empty cell.
    pub fn cell_text(&self, column: usize) -> String {
        self.cells.get(column).map(|c| cell_text(c)).unwrap_or_default()
    }
}

/// Index of the column anchor a token belongs to: the nearest anchor at or
/// left of `left + COLUMN_JITTER`. Tokens left of every anchor land in the
/// first column.
pub fn column_of(anchors: &[f64], left: f64) -> usize {
    let mut column = 0;
    for (i, anchor) in anchors.iter().enumerate() {
        if *anchor <= left + COLUMN_JITTER {
            column = i;
        }
    }
    column
}

/// Reconstruct logical rows around a key column.
///
/// Every token in the key column starts a new logical row; the row claims
/// all tokens from `KEY_ROW_LOOKBACK` above its key token down to the same
/// margin above the next key token. The last row extends to the end of the
/// stream.
pub fn make_table(
    tokens: &[PositionedToken],
    anchors: &[f64],
    key_column: usize,
) -> Vec<TableRow> {
    let mut sorted = tokens.to_vec();
    sort_by_top_then_left(&mut sorted);

    let key_tops: Vec<f64> = sorted
        .iter()
        .filter(|t| column_of(anchors, t.left) == key_column)
        .map(|t| t.top)
        .collect();
    if key_tops.is_empty() {
        return Vec::new();
    }

    let mut rows: Vec<TableRow> = key_tops
        .iter()
        .map(|_| TableRow {
            cells: vec![Vec::new(); anchors.len()],
        })
        .collect();

    for token in sorted {
        let row = match key_tops
            .iter()
            .rposition(|kt| kt - KEY_ROW_LOOKBACK <= token.top)
        {
            Some(row) => row,
            // Above the first logical row; nothing to attach it to.
            None => continue,
        };
        let column = column_of(anchors, token.left);
        rows[row].cells[column].push(token);
    }
    rows
}

/// Flatten a cell's tokens into text: reading order, one space per token
/// boundary and per line break, no doubled or trailing whitespace.
pub fn cell_text(cell: &[PositionedToken]) -> String {
    let mut pieces = Vec::new();
    for row in make_rows(cell) {
        for token in &row.tokens {
            pieces.push(token.flat_text());
        }
    }
    pieces
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str, top: f64, left: f64) -> PositionedToken {
        PositionedToken {
            text: text.to_string(),
            top,
            left,
            page: 0,
            emphasized: false,
        }
    }

    #[test]
    fn test_make_rows_bands_by_vertical_proximity() {
        let tokens = vec![
            tok("b", 100.0, 150.0),
            tok("a", 102.0, 72.0),
            tok("c", 114.0, 72.0),
        ];
        let rows = make_rows(&tokens);
        assert_eq!(rows.len(), 2);
        let first: Vec<_> = rows[0].tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(first, ["a", "b"]);
        assert_eq!(rows[1].tokens[0].text, "c");
    }

    #[test]
    fn test_make_rows_sorts_before_grouping() {
        // Same tokens, reversed input order, must band identically.
        let tokens = vec![
            tok("c", 114.0, 72.0),
            tok("a", 102.0, 72.0),
            tok("b", 100.0, 150.0),
        ];
        let rows = make_rows(&tokens);
        assert_eq!(rows.len(), 2);
        let first: Vec<_> = rows[0].tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(first, ["a", "b"]);
    }

    #[test]
    fn test_column_of_uses_negative_tolerance() {
        let anchors = [72.0, 190.0, 260.0];
        assert_eq!(column_of(&anchors, 72.0), 0);
        // Indented 4 units left of the nominal boundary still belongs there.
        assert_eq!(column_of(&anchors, 186.5), 1);
        assert_eq!(column_of(&anchors, 184.0), 0);
        assert_eq!(column_of(&anchors, 300.0), 2);
        assert_eq!(column_of(&anchors, 10.0), 0);
    }

    #[test]
    fn test_make_table_groups_multi_line_records() {
        let anchors = [72.0, 190.0, 260.0];
        // Two records keyed on column 1; the second record's opcode line
        // sits a few units above its key token.
        let tokens = vec![
            tok("66 0F 38 F6 /r", 170.0, 72.0),
            tok("ADCX r32, r/m32", 182.0, 72.0),
            tok("RM", 176.0, 190.0),
            tok("first.", 176.0, 260.0),
            tok("66 REX.W 0F 38 F6 /r", 200.0, 72.0),
            tok("ADCX r64, r/m64", 212.0, 72.0),
            tok("RM", 204.0, 190.0),
            tok("second.", 204.0, 260.0),
            tok("continued.", 216.0, 260.0),
        ];
        let rows = make_table(&tokens, &anchors, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cell_text(0), "66 0F 38 F6 /r ADCX r32, r/m32");
        assert_eq!(rows[0].cell_text(2), "first.");
        assert_eq!(rows[1].cell_text(0), "66 REX.W 0F 38 F6 /r ADCX r64, r/m64");
        // Last row is unbounded below and keeps the wrapped description.
        assert_eq!(rows[1].cell_text(2), "second. continued.");
    }

    #[test]
    fn test_make_table_empty_without_key_tokens() {
        let anchors = [72.0, 190.0];
        let tokens = vec![tok("stray", 100.0, 72.0)];
        assert!(make_table(&tokens, &anchors, 1).is_empty());
    }

    #[test]
    fn test_cell_text_single_space_at_line_breaks() {
        let cell = vec![
            tok("Call near, relative, displacement relative to next ", 100.0, 260.0),
            tok("instruction.", 112.0, 260.0),
        ];
        assert_eq!(
            cell_text(&cell),
            "Call near, relative, displacement relative to next instruction."
        );
    }

    #[test]
    fn test_cell_text_emphasized_keeps_boundaries() {
        let mut placeholder = tok("r/m16", 100.0, 140.0);
        placeholder.emphasized = true;
        let cell = vec![tok("CALL", 100.0, 100.0), placeholder];
        assert_eq!(cell_text(&cell), "CALL r/m16");
    }
}
