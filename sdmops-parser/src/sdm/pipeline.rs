//! Parse orchestration.
//!
//! Drives index construction, per-entry page parsing with multi-page
//! continuation, canonicalization, and aggregation. Every error below this
//! layer is caught at the entry boundary and recorded against the entry's
//! mnemonic group; the run itself only fails on the degenerate-input and
//! coverage conditions described in [`crate::sdm::error::RunError`].

use std::collections::{BTreeMap, BTreeSet};

use crate::sdm::boundary::{continues_table, trim_at_table_end};
use crate::sdm::error::{ParseError, ParseResult, RunError};
use crate::sdm::extraction::extract;
use crate::sdm::header::classify_header;
use crate::sdm::indexing::{build_index, MnemonicIndexEntry};
use crate::sdm::opcode::canonicalize_opcode;
use crate::sdm::operands::canonicalize_instr;
use crate::sdm::record::{RawInstructionRecord, SdmInstr, Validity};
use crate::sdm::schema::Schema;
use crate::sdm::token::SdmDocument;

/// Caller-facing knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Restrict processing to entries mentioning these mnemonics. Arms the
    /// coverage assertion: every listed mnemonic must end up in a
    /// successfully parsed entry.
    pub allow_list: Option<Vec<String>>,
}

/// Pass/fail accounting over mnemonic groups.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub parsed_groups: usize,
    pub failed_groups: usize,
}

impl RunReport {
    pub fn total_groups(&self) -> usize {
        self.parsed_groups + self.failed_groups
    }

    pub fn percent_parsed(&self) -> f64 {
        if self.total_groups() == 0 {
            return 0.0;
        }
        self.parsed_groups as f64 * 100.0 / self.total_groups() as f64
    }
}

/// Aggregate result of a run: records in document order, the failure map
/// keyed by mnemonic group, and the report.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub records: Vec<SdmInstr>,
    pub failures: BTreeMap<String, String>,
    pub report: RunReport,
}

/// Parse a whole document.
pub fn parse_document(
    doc: &SdmDocument,
    options: &ParseOptions,
) -> Result<ParseOutcome, RunError> {
    let index = build_index(doc);
    if index.is_empty() {
        return Err(RunError::EmptyIndex);
    }

    let allow: Option<BTreeSet<&str>> = options
        .allow_list
        .as_ref()
        .map(|list| list.iter().map(|m| m.as_str()).collect());
    let selected: Vec<&MnemonicIndexEntry> = index
        .iter()
        .filter(|entry| match &allow {
            Some(allowed) => entry
                .mnemonics
                .iter()
                .any(|m| allowed.contains(m.as_str())),
            None => true,
        })
        .collect();

    let mut records = Vec::new();
    let mut failures = BTreeMap::new();
    let mut covered: BTreeSet<String> = BTreeSet::new();
    let mut parsed_groups = 0;

    for entry in &selected {
        match parse_entry(doc, entry) {
            Ok(entry_records) => {
                parsed_groups += 1;
                covered.extend(entry.mnemonics.iter().cloned());
                records.extend(entry_records);
            }
            Err(error) => {
                failures.insert(entry.group_key(), error.to_string());
            }
        }
    }

    if let Some(allowed) = &allow {
        let missing: Vec<String> = allowed
            .iter()
            .filter(|m| !covered.contains(**m))
            .map(|m| m.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RunError::Coverage { missing });
        }
    }
    if parsed_groups == 0 {
        return Err(RunError::NothingParsed);
    }

    Ok(ParseOutcome {
        records,
        failures,
        report: RunReport {
            parsed_groups,
            failed_groups: selected.len() - parsed_groups,
        },
    })
}

/// Parse one index entry, following the table across pages while the next
/// page carries the same schema and no new section banner.
fn parse_entry(doc: &SdmDocument, entry: &MnemonicIndexEntry) -> ParseResult<Vec<SdmInstr>> {
    let mut records = Vec::new();
    let mut page_id = entry.start_page;
    let mut previous_key: Option<String> = None;

    loop {
        if previous_key.is_some() && !doc.contains_page(page_id) {
            // Ran off the end of the document while continuing; the entry's
            // own start page being absent is still a hard error below.
            break;
        }
        let page = doc.page(page_id)?;
        let tokens = page.tokens_by_position();

        let header = match classify_header(&tokens) {
            Some(header) => header,
            None if previous_key.is_none() => return Err(ParseError::NoHeader(page_id)),
            None => break,
        };
        if let Some(key) = &previous_key {
            if !continues_table(key, &header) {
                break;
            }
        }

        let key = header.schema_key();
        let schema = Schema::from_key(&key, page_id)?;
        let body = trim_at_table_end(&tokens[header.body_start..], header.band_bottom);
        for raw in extract(schema, &header, &body, page_id)? {
            records.push(canonicalize_record(raw)?);
        }

        previous_key = Some(key);
        page_id += 1;
    }

    if records.is_empty() {
        return Err(ParseError::EmptyTable(entry.start_page));
    }
    Ok(records)
}

/// Canonicalize one raw record's opcode and instruction text.
fn canonicalize_record(raw: RawInstructionRecord) -> ParseResult<SdmInstr> {
    let opcode_parsed = canonicalize_opcode(&raw.opcode)?
        .iter()
        .map(|token| token.to_string())
        .collect();
    let instr_parsed = canonicalize_instr(&raw.instr)?.flatten();

    Ok(SdmInstr {
        opcode: raw.opcode,
        opcode_parsed,
        instr: raw.instr,
        instr_parsed,
        op_en: raw.op_en,
        valid_in_64bit_mode: raw.valid_64.map(Validity::is_valid),
        valid_in_compatibility_mode: raw.valid_compat.map(Validity::is_valid),
        valid_in_legacy_mode: raw.valid_legacy.map(Validity::is_valid),
        cpuid_feature_flag: raw.cpuid_feature,
        description: raw.description,
        page: raw.page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_percentage() {
        let report = RunReport {
            parsed_groups: 3,
            failed_groups: 1,
        };
        assert_eq!(report.total_groups(), 4);
        assert!((report.percent_parsed() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_canonicalize_record_maps_validity_to_booleans() {
        let raw = RawInstructionRecord {
            opcode: "37".to_string(),
            instr: "AAA".to_string(),
            op_en: Some("ZO".to_string()),
            valid_64: Some(Validity::Invalid),
            valid_compat: Some(Validity::Valid),
            valid_legacy: Some(Validity::Valid),
            cpuid_feature: None,
            description: "ASCII adjust AL after addition.".to_string(),
            page: 120,
        };
        let record = canonicalize_record(raw).unwrap();
        assert_eq!(record.valid_in_64bit_mode, Some(false));
        assert_eq!(record.valid_in_compatibility_mode, Some(true));
        assert_eq!(record.valid_in_legacy_mode, Some(true));
        assert_eq!(record.opcode_parsed, ["37"]);
        assert_eq!(record.instr_parsed, ["AAA"]);
    }

    #[test]
    fn test_canonicalize_record_propagates_opcode_errors() {
        let raw = RawInstructionRecord {
            opcode: "37 zz".to_string(),
            instr: "AAA".to_string(),
            op_en: None,
            valid_64: None,
            valid_compat: None,
            valid_legacy: None,
            cpuid_feature: None,
            description: "desc.".to_string(),
            page: 120,
        };
        assert!(matches!(
            canonicalize_record(raw).unwrap_err(),
            ParseError::MalformedOpcode { .. }
        ));
    }
}
