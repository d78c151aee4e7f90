//! End-of-table and page-continuation detection.
//!
//! The encoding tables are followed on the same page by operand-encoding
//! tables, notes, and the next section's banner; none of that may reach the
//! reconstructor. The pipeline trims each page's body at the first marker
//! token before banding.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sdm::banding::ROW_BAND_TOLERANCE;
use crate::sdm::header::PageHeader;
use crate::sdm::token::PositionedToken;

/// Page footers look like `3-42` (chapter-page).
static PAGE_FOOTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d-\d+").unwrap());

/// Literal marker texts that terminate the encoding table.
const END_MARKERS: [&str; 4] = ["Instruction Operand Encoding", "NOTES:", "NOTE:", "NOTE"];

/// Whether a body token marks the end of the encoding table.
///
/// `Description` is special: as a header label it is vocabulary, but a
/// second `Description` below the header band is the operand-encoding
/// table's own header and terminates the stream.
pub fn is_end_of_table(token: &PositionedToken, header_band_bottom: f64) -> bool {
    let text = token.text.trim();
    END_MARKERS.contains(&text)
        || PAGE_FOOTER.is_match(text)
        || text.contains('—')
        || (text == "Description" && token.top > header_band_bottom + ROW_BAND_TOLERANCE)
}

/// Truncate a reading-order body stream at the first end-of-table marker.
pub fn trim_at_table_end(
    body: &[PositionedToken],
    header_band_bottom: f64,
) -> Vec<PositionedToken> {
    body.iter()
        .take_while(|t| !is_end_of_table(t, header_band_bottom))
        .cloned()
        .collect()
}

/// Whether a follow-on page continues the previous page's table: same
/// schema key and at most one banner token (a new section title in the
/// banner means a different instruction's tables have started).
pub fn continues_table(previous_key: &str, header: &PageHeader) -> bool {
    header.schema_key() == previous_key && header.banner.len() <= 1
}
