//! Instruction record types.
//!
//! [`RawInstructionRecord`] is what a schema extractor emits: cell texts plus
//! typed validity flags, before the opcode and instruction strings have been
//! canonicalized. [`SdmInstr`] is the published record written to the result
//! artifact.

use serde::Serialize;

use crate::sdm::error::{ParseError, ParseResult};
use crate::sdm::token::{DocumentAttributes, PageId};

/// Closed mode-validity vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Validity {
    Valid,
    Invalid,
    /// `N.E.`: not encodable in this mode.
    NotEncodable,
    /// `N.S.`: not supported in this mode.
    NotSupported,
}

impl Validity {
    /// Parse one validity cell. Decorative asterisks (footnote markers) and
    /// the `N. E.` spacing variant are accepted; anything else is a
    /// malformed-token error.
    pub fn parse(text: &str) -> ParseResult<Validity> {
        match text.trim().trim_end_matches('*').trim() {
            "Valid" => Ok(Validity::Valid),
            "Invalid" => Ok(Validity::Invalid),
            "N.E." | "N. E." => Ok(Validity::NotEncodable),
            "N.S." | "N. S." => Ok(Validity::NotSupported),
            _ => Err(ParseError::UnknownValidity(text.to_string())),
        }
    }

    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }
}

/// Parse a `V/V`-style 64/32-bit mode-support cell into
/// (64-bit validity, 32-bit validity).
pub fn parse_mode_support(text: &str) -> ParseResult<(Validity, Validity)> {
    let trimmed = text.trim();
    let (left, right) = trimmed
        .split_once('/')
        .ok_or_else(|| ParseError::UnknownModeSupport(text.to_string()))?;
    Ok((
        parse_mode_support_half(left, text)?,
        parse_mode_support_half(right, text)?,
    ))
}

fn parse_mode_support_half(half: &str, whole: &str) -> ParseResult<Validity> {
    match half.trim().trim_end_matches('*').trim() {
        "V" => Ok(Validity::Valid),
        "I" | "Inv." => Ok(Validity::Invalid),
        "N.E." | "NE" => Ok(Validity::NotEncodable),
        "N.S." | "NS" => Ok(Validity::NotSupported),
        _ => Err(ParseError::UnknownModeSupport(whole.to_string())),
    }
}

/// One extracted table row, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstructionRecord {
    pub opcode: String,
    pub instr: String,
    pub op_en: Option<String>,
    pub valid_64: Option<Validity>,
    pub valid_compat: Option<Validity>,
    pub valid_legacy: Option<Validity>,
    pub cpuid_feature: Option<String>,
    pub description: String,
    pub page: PageId,
}

/// One published instruction record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SdmInstr {
    pub opcode: String,
    pub opcode_parsed: Vec<String>,
    pub instr: String,
    pub instr_parsed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_in_64bit_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_in_compatibility_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_in_legacy_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuid_feature_flag: Option<String>,
    pub description: String,
    pub page: PageId,
}

/// The result artifact: document identification plus every record, in
/// document order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultArtifact {
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_version: Option<String>,
    pub ops: Vec<SdmInstr>,
}

impl ResultArtifact {
    pub fn new(attributes: DocumentAttributes, ops: Vec<SdmInstr>) -> Self {
        ResultArtifact {
            source_file: attributes.source_file,
            document_id: attributes.document_id,
            document_version: attributes.document_version,
            ops,
        }
    }
}
