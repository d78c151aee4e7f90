//! Instruction canonicalization.
//!
//! Turns a free-text instruction cell (`"REP OUTS DX, r/m32"`) into a
//! validated mnemonic (plus secondary mnemonic for REP forms) and operand
//! list. Operands are matched against a fixed, ordered catalog of
//! operand-syntax patterns; the only repairs attempted are the documented
//! relaxations for rendering artifacts (trailing punctuation, stray inner
//! whitespace, a stray leading numeral). Anything else fails naming the
//! offending operand.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sdm::error::{ParseError, ParseResult};

static MNEMONIC_SYNTAX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]\w+$").unwrap());

static LEADING_NUMERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+").unwrap());

/// Ordered operand-syntax catalog. Patterns are tried in declaration order;
/// the first match wins.
const OPERAND_PATTERNS: &[&str] = &[
    // Fixed registers and segment registers.
    r"^(AL|CL|DL|BL|AX|CX|DX|BX|EAX|ECX|EDX|EBX|RAX|RCX|RDX|RBX)$",
    r"^(CS|DS|SS|ES|FS|GS)$",
    r"^Sreg$",
    r"^CR[0-8]$",
    r"^CR0[–-]CR7$",
    r"^DR[0-7]$",
    r"^DR0[–-]DR7$",
    // General-purpose register and register-or-memory classes.
    r"^r(8|16|32|64)$",
    r"^r/m(8|16|32|64)$",
    r"^r(16|32|64)/m(8|16)$",
    r"^r32/m32$",
    r"^r64/m64$",
    r"^reg$",
    r"^reg/m(8|16|32)$",
    // Memory forms.
    r"^m$",
    r"^m(8|16|32|64|128|256|512)$",
    r"^m(32|64|80)fp$",
    r"^m(16|32|64)int$",
    r"^m16:(16|32|64)$",
    r"^m16&(16|32|64)$",
    r"^m32&32$",
    r"^m80bcd$",
    r"^m80dec$",
    r"^m2byte$",
    r"^m14/28byte$",
    r"^m94/108byte$",
    r"^m512byte$",
    r"^moffs(8|16|32|64)$",
    // Immediates, relative offsets, far pointers.
    r"^imm(8|16|32|64)$",
    r"^rel(8|16|32)$",
    r"^ptr16:(16|32)$",
    // MMX / SSE / AVX register classes, with EVEX decorations.
    r"^mm[0-9]?$",
    r"^mm[0-9]?/m(32|64)$",
    r"^(xmm|ymm|zmm)[0-9]?(\{k[0-7]\})?(\{z\})?$",
    r"^(xmm|ymm|zmm)[0-9]?/m(8|16|32|64|128|256|512)(\{k[0-7]\})?(\{z\})?$",
    r"^(xmm|ymm|zmm)[0-9]?/m(32|64|128|256|512)/m(32|64)bcst(\{k[0-7]\})?(\{z\})?$",
    r"^k[0-7](\{k[0-7]\})?$",
    r"^bnd[0-3]?(/m(64|128))?$",
    r"^vm(32|64)[xyz](\{k[0-7]\})?$",
    // x87 stack operands.
    r"^ST$",
    r"^ST\((0|i)\)$",
    // Implicit operands rendered in angle brackets.
    r"^<(XMM0|EAX|ECX|EDX)>$",
    // The literal shift count.
    r"^1$",
];

static OPERAND_CATALOG: Lazy<Vec<Regex>> = Lazy::new(|| {
    OPERAND_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
});

/// A validated instruction: mnemonic, REP-form secondary mnemonic, operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalInstruction {
    pub mnemonic: String,
    pub secondary_mnemonic: Option<String>,
    pub operands: Vec<String>,
}

impl CanonicalInstruction {
    /// Flat token list: mnemonic, secondary mnemonic, then operands.
    pub fn flatten(&self) -> Vec<String> {
        let mut tokens = vec![self.mnemonic.clone()];
        if let Some(secondary) = &self.secondary_mnemonic {
            tokens.push(secondary.clone());
        }
        tokens.extend(self.operands.iter().cloned());
        tokens
    }
}

/// Canonicalize one instruction cell.
pub fn canonicalize_instr(raw: &str) -> ParseResult<CanonicalInstruction> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    if words.is_empty() {
        return Err(ParseError::MalformedMnemonic(raw.to_string()));
    }
    let mnemonic = words.remove(0);
    if !MNEMONIC_SYNTAX.is_match(mnemonic) {
        return Err(ParseError::MalformedMnemonic(mnemonic.to_string()));
    }

    let secondary = if matches!(mnemonic, "REP" | "REPE" | "REPNE") {
        if words.is_empty() || !MNEMONIC_SYNTAX.is_match(words[0]) {
            return Err(ParseError::MalformedMnemonic(raw.to_string()));
        }
        Some(words.remove(0).to_string())
    } else {
        None
    };

    let operand_text = words.join(" ");
    let mut operands = Vec::new();
    if !operand_text.is_empty() {
        // Commas never occur inside a single operand in this grammar.
        for piece in operand_text.split(',') {
            operands.push(match_operand(mnemonic, piece)?);
        }
    }

    Ok(CanonicalInstruction {
        mnemonic: mnemonic.to_string(),
        secondary_mnemonic: secondary,
        operands,
    })
}

/// Match one operand against the catalog, trying the documented
/// relaxations in order of preference.
fn match_operand(mnemonic: &str, text: &str) -> ParseResult<String> {
    let trimmed = text.trim();
    let candidates = [
        trimmed.to_string(),
        trimmed
            .trim_end_matches(['.', ',', '*', ':'])
            .trim_end()
            .to_string(),
        trimmed.chars().filter(|c| !c.is_whitespace()).collect(),
        LEADING_NUMERAL.replace(trimmed, "").into_owned(),
    ];
    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        if in_catalog(mnemonic, &candidate) {
            return Ok(candidate);
        }
    }
    Err(ParseError::UnknownOperand(trimmed.to_string()))
}

fn in_catalog(mnemonic: &str, operand: &str) -> bool {
    // ENTER is the one instruction with bare 0/1 level operands.
    if mnemonic == "ENTER" && matches!(operand, "0" | "1") {
        return true;
    }
    OPERAND_CATALOG.iter().any(|pattern| pattern.is_match(operand))
}
