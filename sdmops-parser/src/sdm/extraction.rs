//! Schema-specific record extraction.
//!
//! Each registered layout owns one extraction path over the reconstructed
//! rows or table. Flag cells are validated against closed vocabularies; an
//! unrecognized value is a terminal error for the record's group, caught by
//! the pipeline at the entry boundary. Nothing here guesses: ambiguous cells
//! raise.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sdm::banding::{cell_text, column_of, make_rows, make_table, Row};
use crate::sdm::error::{ParseError, ParseResult};
use crate::sdm::header::PageHeader;
use crate::sdm::record::{parse_mode_support, RawInstructionRecord, Validity};
use crate::sdm::schema::Schema;
use crate::sdm::token::{PageId, PositionedToken};

/// Closed operand-encoding vocabulary (the `Op/En` column).
const OP_EN_VOCABULARY: [&str; 28] = [
    "ZO", "O", "I", "II", "D", "M", "A", "B", "C", "R", "MI", "M1", "MC", "MR", "RM", "FD", "TD",
    "OI", "RMI", "MRI", "RVM", "RVMI", "RMV", "MVR", "VM", "VMI", "T1S", "NA",
];

/// Closed CPUID feature-flag vocabulary.
const CPUID_FLAGS: [&str; 53] = [
    "ADX",
    "AES",
    "AVX",
    "AVX2",
    "AVX512BW",
    "AVX512CD",
    "AVX512DQ",
    "AVX512ER",
    "AVX512F",
    "AVX512IFMA",
    "AVX512PF",
    "AVX512VBMI",
    "AVX512VL",
    "BMI1",
    "BMI2",
    "CLDEMOTE",
    "CLFLUSHOPT",
    "CLWB",
    "F16C",
    "FMA",
    "FSGSBASE",
    "GFNI",
    "HLE",
    "INVPCID",
    "LZCNT",
    "MMX",
    "MOVBE",
    "MOVDIR64B",
    "MOVDIRI",
    "MPX",
    "OSPKE",
    "PCLMULQDQ",
    "POPCNT",
    "PREFETCHW",
    "RDPID",
    "RDRAND",
    "RDSEED",
    "RTM",
    "SHA",
    "SMAP",
    "SSE",
    "SSE2",
    "SSE3",
    "SSE4_1",
    "SSE4_2",
    "SSSE3",
    "VAES",
    "VPCLMULQDQ",
    "WAITPKG",
    "XSAVE",
    "XSAVEC",
    "XSAVEOPT",
    "XSS",
];

/// A row-mode record starts on a row whose opcode cell opens with a hex
/// byte or a prefix literal.
static RECORD_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-F]{2}([ /+]|$)|REX|NP|NFx|VEX|EVEX)").unwrap());

pub fn is_op_en(text: &str) -> bool {
    OP_EN_VOCABULARY.contains(&text)
}

/// Validate a CPUID cell: every whitespace-separated word must be a known
/// feature flag. Multi-flag cells (AVX512VL AVX512F) are joined with one
/// space.
pub fn validate_cpuid(text: &str) -> ParseResult<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    for word in &words {
        if !CPUID_FLAGS.contains(word) {
            return Err(ParseError::UnknownCpuidFeature(word.to_string()));
        }
    }
    Ok(words.join(" "))
}

/// The documented concatenated-flag anomaly: a 64-bit validity cell whose
/// text carries the compat/leg value as well (observed for MOV and RET).
/// Only these two concatenations are expanded; anything else parses as a
/// single flag or fails.
fn concatenated_validity(text: &str) -> Option<(Validity, Validity)> {
    match text {
        "Valid N.E." => Some((Validity::Valid, Validity::NotEncodable)),
        "Valid Valid" => Some((Validity::Valid, Validity::Valid)),
        _ => None,
    }
}

/// Run the extractor registered for `schema` over a trimmed body stream.
pub fn extract(
    schema: Schema,
    header: &PageHeader,
    body: &[PositionedToken],
    page: PageId,
) -> ParseResult<Vec<RawInstructionRecord>> {
    let anchors = header.column_anchors();
    match schema.key_column() {
        None => extract_row_mode(schema, &anchors, body, page),
        Some(key_column) => extract_table_mode(schema, &anchors, body, page, key_column),
    }
}

/// Legacy layouts: band visual rows, group them per record, slice cells by
/// column anchor.
fn extract_row_mode(
    schema: Schema,
    anchors: &[f64],
    body: &[PositionedToken],
    page: PageId,
) -> ParseResult<Vec<RawInstructionRecord>> {
    let rows = make_rows(body);
    let mut groups: Vec<Vec<Row>> = Vec::new();
    for row in rows {
        let first = &row.tokens[0];
        let starts_record =
            column_of(anchors, first.left) == 0 && RECORD_START.is_match(first.text.trim());
        if starts_record {
            groups.push(vec![row]);
        } else if let Some(group) = groups.last_mut() {
            group.push(row);
        } else {
            return Err(ParseError::UnexpectedRow {
                page,
                text: cell_text(&row.tokens),
            });
        }
    }

    groups
        .into_iter()
        .map(|group| legacy_record(schema, anchors, &group, page))
        .collect()
}

fn legacy_record(
    schema: Schema,
    anchors: &[f64],
    group: &[Row],
    page: PageId,
) -> ParseResult<RawInstructionRecord> {
    let mut cells: Vec<Vec<PositionedToken>> = vec![Vec::new(); anchors.len()];
    for row in group {
        for token in &row.tokens {
            cells[column_of(anchors, token.left)].push(token.clone());
        }
    }

    let opcode = cell_text(&cells[0]);
    let instr = required(&cells, 1, "instruction", page)?;

    let (op_en, validity_base) = if schema.has_op_en() {
        let text = required(&cells, 2, "op/en", page)?;
        if !is_op_en(&text) {
            return Err(ParseError::UnknownOperandEncoding(text));
        }
        (Some(text), 3)
    } else {
        (None, 2)
    };

    let text_64 = required(&cells, validity_base, "64-bit mode", page)?;
    let compat_text = cell_text(&cells[validity_base + 1]);
    let (valid_64, valid_compat) = match concatenated_validity(&text_64) {
        Some(pair) if compat_text.is_empty() && schema.allows_concatenated_validity() => pair,
        Some(_) => return Err(ParseError::UnknownValidity(text_64)),
        None => {
            if compat_text.is_empty() {
                return Err(ParseError::MissingCell {
                    column: "compat/leg mode",
                    page,
                });
            }
            (Validity::parse(&text_64)?, Validity::parse(&compat_text)?)
        }
    };

    let description = required(&cells, validity_base + 2, "description", page)?;

    Ok(RawInstructionRecord {
        opcode,
        instr,
        op_en,
        valid_64: Some(valid_64),
        valid_compat: Some(valid_compat),
        // One Compat/Leg column covers both non-64-bit modes.
        valid_legacy: Some(valid_compat),
        cpuid_feature: None,
        description,
        page: group[0].tokens[0].page,
    })
}

/// CPUID-era layouts: reconstruct a table keyed on the Op/En column, so
/// records whose opcode or description span several visual lines stay one
/// row.
fn extract_table_mode(
    schema: Schema,
    anchors: &[f64],
    body: &[PositionedToken],
    page: PageId,
    key_column: usize,
) -> ParseResult<Vec<RawInstructionRecord>> {
    let mut records = Vec::new();
    for row in make_table(body, anchors, key_column) {
        let (opcode, instr) = if schema.merged_opcode_column() {
            split_merged_cell(&row.cells[0], page)?
        } else {
            (row.cell_text(0), row.cell_text(1))
        };
        if opcode.is_empty() {
            return Err(ParseError::MissingCell {
                column: "opcode",
                page,
            });
        }
        if instr.is_empty() {
            return Err(ParseError::MissingCell {
                column: "instruction",
                page,
            });
        }

        let op_en = row.cell_text(key_column);
        if !is_op_en(&op_en) {
            return Err(ParseError::UnknownOperandEncoding(op_en));
        }

        let support = row.cell_text(key_column + 1);
        if support.is_empty() {
            return Err(ParseError::MissingCell {
                column: "mode support",
                page,
            });
        }
        let (valid_64, valid_32) = parse_mode_support(&support)?;

        let cpuid_text = row.cell_text(key_column + 2);
        if cpuid_text.is_empty() {
            return Err(ParseError::MissingCell {
                column: "cpuid feature",
                page,
            });
        }
        let cpuid = validate_cpuid(&cpuid_text)?;

        let description = row.cell_text(key_column + 3);
        if description.is_empty() {
            return Err(ParseError::MissingCell {
                column: "description",
                page,
            });
        }

        let record_page = row.cells[key_column]
            .first()
            .map(|t| t.page)
            .unwrap_or(page);
        records.push(RawInstructionRecord {
            opcode,
            instr,
            op_en: Some(op_en),
            valid_64: Some(valid_64),
            valid_compat: Some(valid_32),
            valid_legacy: None,
            cpuid_feature: Some(cpuid),
            description,
            page: record_page,
        });
    }
    Ok(records)
}

/// Split a merged Opcode/Instruction cell: first visual line is the opcode,
/// the rest is the instruction.
fn split_merged_cell(
    cell: &[PositionedToken],
    page: PageId,
) -> ParseResult<(String, String)> {
    let lines = make_rows(cell);
    if lines.len() < 2 {
        return Err(ParseError::MissingCell {
            column: "instruction",
            page,
        });
    }
    let opcode = cell_text(&lines[0].tokens);
    let instr_tokens: Vec<PositionedToken> = lines[1..]
        .iter()
        .flat_map(|line| line.tokens.iter().cloned())
        .collect();
    Ok((opcode, cell_text(&instr_tokens)))
}

fn required(
    cells: &[Vec<PositionedToken>],
    column: usize,
    name: &'static str,
    page: PageId,
) -> ParseResult<String> {
    let text = cells
        .get(column)
        .map(|cell| cell_text(cell))
        .unwrap_or_default();
    if text.is_empty() {
        return Err(ParseError::MissingCell { column: name, page });
    }
    Ok(text)
}
