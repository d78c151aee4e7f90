//! Header classification.
//!
//! A table page opens with banner text (chapter strip, section title) and a
//! header row whose labels may be stacked over two visual lines ("Op/" above
//! "En"). Classification walks the page's tokens in reading order, skipping
//! everything outside the closed header vocabulary as banner text, then
//! collects the contiguous run of vocabulary tokens as the header row. The
//! re-sorted, merged, normalized labels form the schema key that selects an
//! extractor.

use crate::sdm::banding::COLUMN_JITTER;
use crate::sdm::token::{sort_by_left_then_top, PositionedToken};

/// Closed header vocabulary, in normalized form (see [`normalize_label`]).
///
/// Covers every label spelling observed across the reference chapters,
/// including merged-cell spellings like `Opcode/Instruction` and the split
/// `64/32` + `bit` tokens some chapters produce.
const HEADER_VOCABULARY: [&str; 23] = [
    "opcode",
    "opcodeinstruction",
    "instruction",
    "op",
    "en",
    "open",
    "64bit",
    "64bitmode",
    "6432",
    "6432bit",
    "6432bitmode",
    "bit",
    "mode",
    "modesupport",
    "compat",
    "compatleg",
    "compatlegmode",
    "legmode",
    "cpuid",
    "feature",
    "flag",
    "featureflag",
    "support",
];

/// `Description` is vocabulary too, but it doubles as an end-of-table marker
/// when it reappears below the header band, so it is kept separate.
const DESCRIPTION_LABEL: &str = "description";

/// Lower-case a label and strip everything but letters and digits.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_vocabulary(label: &str) -> bool {
    let normalized = normalize_label(label);
    normalized == DESCRIPTION_LABEL || HEADER_VOCABULARY.contains(&normalized.as_str())
}

/// One merged header column: its combined label and left anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderColumn {
    pub label: String,
    pub left: f64,
}

/// Result of classifying a page's leading tokens.
#[derive(Debug, Clone)]
pub struct PageHeader {
    /// Banner tokens preceding the header row, in reading order.
    pub banner: Vec<PositionedToken>,
    /// Merged columns in left-to-right order.
    pub columns: Vec<HeaderColumn>,
    /// Lowest vertical position occupied by a header token.
    pub band_bottom: f64,
    /// Index of the first body token in the reading-order token slice.
    pub body_start: usize,
}

impl PageHeader {
    /// Normalized `#`-joined schema key in left-to-right column order.
    pub fn schema_key(&self) -> String {
        self.columns
            .iter()
            .map(|c| normalize_label(&c.label))
            .collect::<Vec<_>>()
            .join("#")
    }

    /// Left anchors of the columns, for table reconstruction.
    pub fn column_anchors(&self) -> Vec<f64> {
        self.columns.iter().map(|c| c.left).collect()
    }
}

/// Split a page's reading-order tokens into banner and header row.
///
/// Returns `None` when the page carries no header vocabulary at all, which
/// signals "no more instruction tables here" rather than an error.
pub fn classify_header(tokens: &[PositionedToken]) -> Option<PageHeader> {
    let header_start = tokens.iter().position(|t| is_vocabulary(&t.text))?;
    let header_len = tokens[header_start..]
        .iter()
        .take_while(|t| is_vocabulary(&t.text))
        .count();
    let banner = tokens[..header_start].to_vec();
    let row = &tokens[header_start..header_start + header_len];

    let band_bottom = row
        .iter()
        .map(|t| t.top)
        .fold(f64::NEG_INFINITY, f64::max);
    let columns = merge_stacked_labels(row);

    Some(PageHeader {
        banner,
        columns,
        band_bottom,
        body_start: header_start + header_len,
    })
}

/// Re-sort header tokens left-to-right and merge tokens sharing a left
/// anchor (within jitter tolerance) into one column, top label first.
fn merge_stacked_labels(row: &[PositionedToken]) -> Vec<HeaderColumn> {
    let mut sorted = row.to_vec();
    sort_by_left_then_top(&mut sorted);

    let mut columns: Vec<(f64, Vec<PositionedToken>)> = Vec::new();
    for token in sorted {
        match columns.last_mut() {
            Some((anchor, members)) if (token.left - *anchor).abs() <= COLUMN_JITTER => {
                members.push(token);
            }
            _ => columns.push((token.left, vec![token])),
        }
    }

    columns
        .into_iter()
        .map(|(anchor, mut members)| {
            members.sort_by(|a, b| a.top.total_cmp(&b.top));
            let label = members
                .iter()
                .map(|t| t.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            HeaderColumn {
                label,
                left: anchor,
            }
        })
        .collect()
}
