//! Positioned-token document model.
//!
//! The upstream ingestion step (out of scope here) converts the SDM reference
//! from `pdftohtml -xml` output into this model: one entry per physical page,
//! each carrying position-tagged text tokens plus the page's hyperlink
//! anchors. Everything downstream treats the model as read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sdm::error::{ParseError, ParseResult};

/// Physical page number, as printed by the converter.
pub type PageId = u32;

/// One text span with its position on a page.
///
/// `emphasized` marks operand-placeholder spans (italic in the source). When
/// such a span is flattened into surrounding text it is wrapped in single
/// spaces so token boundaries survive, see [`PositionedToken::flat_text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedToken {
    pub text: String,
    pub top: f64,
    pub left: f64,
    #[serde(default)]
    pub page: PageId,
    #[serde(default)]
    pub emphasized: bool,
}

impl PositionedToken {
    /// Text as it should appear inside concatenated cell content.
    pub fn flat_text(&self) -> String {
        if self.emphasized {
            format!(" {} ", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// A front-matter hyperlink: display text plus the page it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorToken {
    pub text: String,
    pub target_page: PageId,
}

/// All tokens and anchors of one physical page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdmPage {
    pub page: PageId,
    #[serde(default)]
    pub tokens: Vec<PositionedToken>,
    #[serde(default)]
    pub anchors: Vec<AnchorToken>,
}

impl SdmPage {
    /// Tokens in reading order: top-to-bottom, then left-to-right.
    pub fn tokens_by_position(&self) -> Vec<PositionedToken> {
        let mut sorted = self.tokens.clone();
        sort_by_top_then_left(&mut sorted);
        sorted
    }
}

/// Sort tokens top-to-bottom, ties broken left-to-right.
pub fn sort_by_top_then_left(tokens: &mut [PositionedToken]) {
    tokens.sort_by(|a, b| {
        a.top
            .total_cmp(&b.top)
            .then_with(|| a.left.total_cmp(&b.left))
    });
}

/// Sort tokens left-to-right, ties broken top-to-bottom.
pub fn sort_by_left_then_top(tokens: &mut [PositionedToken]) {
    tokens.sort_by(|a, b| {
        a.left
            .total_cmp(&b.left)
            .then_with(|| a.top.total_cmp(&b.top))
    });
}

/// Identification fields printed on the SDM's first page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentAttributes {
    pub source_file: String,
    pub document_id: Option<String>,
    pub document_version: Option<String>,
}

/// The whole source document, pages keyed by physical page number.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawDocument")]
pub struct SdmDocument {
    source_file: String,
    pages: BTreeMap<PageId, SdmPage>,
}

/// Wire shape of the ingestion JSON. Duplicate page numbers keep the first
/// occurrence, matching the converter's behavior for repeated anchors.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    source_file: String,
    pages: Vec<SdmPage>,
}

impl From<RawDocument> for SdmDocument {
    fn from(raw: RawDocument) -> Self {
        let mut pages = BTreeMap::new();
        for mut page in raw.pages {
            for token in &mut page.tokens {
                token.page = page.page;
            }
            pages.entry(page.page).or_insert(page);
        }
        SdmDocument {
            source_file: raw.source_file,
            pages,
        }
    }
}

impl SdmDocument {
    /// Deserialize the ingestion JSON.
    pub fn from_json_str(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Look up one page; referencing an absent page is a hard error.
    pub fn page(&self, id: PageId) -> ParseResult<&SdmPage> {
        self.pages.get(&id).ok_or(ParseError::PageNotFound(id))
    }

    pub fn contains_page(&self, id: PageId) -> bool {
        self.pages.contains_key(&id)
    }

    /// Pages in ascending page-number order.
    pub fn pages(&self) -> impl Iterator<Item = &SdmPage> {
        self.pages.values()
    }

    /// Scan the first page for the `Order Number:` line and the version
    /// token that follows it.
    pub fn attributes(&self) -> DocumentAttributes {
        let mut attrs = DocumentAttributes {
            source_file: self.source_file.clone(),
            ..DocumentAttributes::default()
        };
        let first = match self.pages.values().next() {
            Some(page) => page,
            None => return attrs,
        };
        let tokens = first.tokens_by_position();
        for (i, token) in tokens.iter().enumerate() {
            let text = token.text.trim();
            if let Some(rest) = text.strip_prefix("Order Number:") {
                attrs.document_id = Some(rest.trim().to_string());
                attrs.document_version = tokens.get(i + 1).map(|t| t.text.trim().to_string());
                break;
            }
        }
        attrs
    }
}
