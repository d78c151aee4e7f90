//! Opcode canonicalization.
//!
//! Turns a free-text opcode cell (`"REX.W + C7 /0 id"`) into the strict
//! byte-grammar token sequence that mirrors wire order. The alphabet is a
//! logos lexer; on top of it an ordered validator enforces the grammar:
//! optional NP/NFx, optional VEX/EVEX literal, optional REX form, opcode
//! bytes, then the code-offset / register-in-opcode / ModRM / immediate
//! suffixes. The source text is inconsistent about spacing around `+` and
//! `/`, so both operators are tightened before lexing. Any unconsumed text
//! is a malformed-opcode error carrying the residue.

use std::fmt;

use logos::Logos;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sdm::error::{ParseError, ParseResult};

/// `" + "`, `"+ "`, `" +"` all collapse to `"+"`; same for `/`.
static OPERATOR_SPACING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*([+/])\s*").unwrap());

/// Lexical alphabet of the opcode grammar.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum RawUnit {
    #[token("NFx")]
    NoFx,
    #[token("NP")]
    NoPrefix,
    #[regex(r"E?VEX\.[0-9A-Za-z.]+", |lex| lex.slice().to_owned())]
    Vex(String),
    #[regex(r"REX(\.[RWXBrwxb])?", |lex| lex.slice().to_owned())]
    Rex(String),
    #[regex(r"[0-9A-F][0-9A-F]", |lex| lex.slice().to_owned())]
    Byte(String),
    #[regex(r"\+r[bwdo]", |lex| lex.slice().to_owned())]
    RegSuffix(String),
    #[token("+i")]
    RegIndex,
    #[token("+")]
    Plus,
    #[token("/r")]
    ModRmReg,
    #[regex(r"/[0-7]", |lex| lex.slice().as_bytes()[1] - b'0')]
    ModRmDigit(u8),
    #[regex(r"c[bwdpot]", |lex| lex.slice().to_owned())]
    CodeOffset(String),
    #[regex(r"i[bwdo]", |lex| lex.slice().to_owned())]
    Immediate(String),
}

/// One canonical opcode token. Sequence order is significant and mirrors
/// byte order on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpcodeToken {
    /// `NP`: instruction must carry no 66/F2/F3 prefix.
    NoPrefix,
    /// `NFx`: instruction must carry no F2/F3 prefix.
    NoFxPrefix,
    /// A `VEX.*`/`EVEX.*` prefix literal, verbatim.
    Vex(String),
    /// A `REX`/`REX.W`/`REX.R` form literal, verbatim.
    Rex(String),
    /// One two-hex-digit opcode byte.
    Byte(String),
    /// Register-in-opcode suffix: `+rb`, `+rw`, `+rd`, `+ro` or `+i`.
    RegisterInOpcode(String),
    /// `/r`: ModRM with a register operand.
    ModRmReg,
    /// `/0`..`/7`: ModRM with a fixed reg field.
    ModRmDigit(u8),
    /// Code-offset suffix: `cb`, `cw`, `cd`, `cp`, `co`, `ct`.
    CodeOffset(String),
    /// Immediate-size suffix: `ib`, `iw`, `id`, `io`.
    Immediate(String),
}

impl fmt::Display for OpcodeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpcodeToken::NoPrefix => write!(f, "NP"),
            OpcodeToken::NoFxPrefix => write!(f, "NFx"),
            OpcodeToken::Vex(text)
            | OpcodeToken::Rex(text)
            | OpcodeToken::Byte(text)
            | OpcodeToken::RegisterInOpcode(text)
            | OpcodeToken::CodeOffset(text)
            | OpcodeToken::Immediate(text) => write!(f, "{}", text),
            OpcodeToken::ModRmReg => write!(f, "/r"),
            OpcodeToken::ModRmDigit(digit) => write!(f, "/{}", digit),
        }
    }
}

/// Greedy left-to-right decomposition of an opcode cell.
pub fn canonicalize_opcode(raw: &str) -> ParseResult<Vec<OpcodeToken>> {
    let stripped = raw.replace('*', "");
    let normalized = OPERATOR_SPACING
        .replace_all(stripped.trim(), "$1")
        .into_owned();

    let units = lex_units(raw, &normalized)?;
    assemble(raw, &normalized, units)
}

fn lex_units(raw: &str, normalized: &str) -> ParseResult<Vec<(RawUnit, usize)>> {
    let mut lexer = RawUnit::lexer(normalized);
    let mut units = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(unit) => units.push((unit, lexer.span().start)),
            Err(()) => {
                return Err(ParseError::MalformedOpcode {
                    text: raw.to_string(),
                    residue: normalized[lexer.span().start..].to_string(),
                })
            }
        }
    }
    Ok(units)
}

fn assemble(
    raw: &str,
    normalized: &str,
    units: Vec<(RawUnit, usize)>,
) -> ParseResult<Vec<OpcodeToken>> {
    let mut out = Vec::new();
    let mut cursor = Cursor { units, index: 0 };

    match cursor.peek() {
        Some(RawUnit::NoPrefix) => {
            out.push(OpcodeToken::NoPrefix);
            cursor.advance();
        }
        Some(RawUnit::NoFx) => {
            out.push(OpcodeToken::NoFxPrefix);
            cursor.advance();
        }
        _ => {}
    }

    let mut has_vex = false;
    if let Some(RawUnit::Vex(text)) = cursor.peek() {
        out.push(OpcodeToken::Vex(text.clone()));
        has_vex = true;
        cursor.advance();
    }

    let first_byte = consume_rex_and_bytes(&mut cursor, &mut out);

    // A leading F2/F3 (REP/REPE/REPNE forms) or 66 is a mandatory prefix
    // byte; the real opcode bytes, possibly behind a REX form, follow.
    let is_mandatory_prefix = matches!(
        first_byte.as_deref(),
        Some("F2") | Some("F3") | Some("66")
    );
    if !has_vex
        && is_mandatory_prefix
        && matches!(cursor.peek(), Some(RawUnit::Plus) | Some(RawUnit::Rex(_)))
    {
        consume_rex_and_bytes(&mut cursor, &mut out);
    }

    if let Some(RawUnit::CodeOffset(text)) = cursor.peek() {
        out.push(OpcodeToken::CodeOffset(text.clone()));
        cursor.advance();
    }

    match cursor.peek() {
        Some(RawUnit::RegSuffix(text)) => {
            out.push(OpcodeToken::RegisterInOpcode(text.clone()));
            cursor.advance();
        }
        Some(RawUnit::RegIndex) => {
            out.push(OpcodeToken::RegisterInOpcode("+i".to_string()));
            cursor.advance();
        }
        _ => {}
    }

    match cursor.peek() {
        Some(RawUnit::ModRmReg) => {
            out.push(OpcodeToken::ModRmReg);
            cursor.advance();
        }
        Some(RawUnit::ModRmDigit(digit)) => {
            out.push(OpcodeToken::ModRmDigit(*digit));
            cursor.advance();
        }
        _ => {}
    }

    if let Some(RawUnit::Immediate(text)) = cursor.peek() {
        out.push(OpcodeToken::Immediate(text.clone()));
        cursor.advance();
    }

    // ENTER (C8 iw ib) carries a second immediate after the first.
    if first_byte.as_deref() == Some("C8") {
        while let Some(RawUnit::Byte(text)) = cursor.peek() {
            out.push(OpcodeToken::Byte(text.clone()));
            cursor.advance();
        }
        if let Some(RawUnit::Immediate(text)) = cursor.peek() {
            out.push(OpcodeToken::Immediate(text.clone()));
            cursor.advance();
        }
    }

    if let Some(position) = cursor.position() {
        return Err(ParseError::MalformedOpcode {
            text: raw.to_string(),
            residue: normalized[position..].to_string(),
        });
    }
    Ok(out)
}

/// Steps 4–5 of the grammar: an optional REX form (optionally wrapped in
/// `+`), then a run of opcode bytes. Returns the first byte of the run.
fn consume_rex_and_bytes(cursor: &mut Cursor, out: &mut Vec<OpcodeToken>) -> Option<String> {
    if matches!(cursor.peek(), Some(RawUnit::Plus))
        && matches!(cursor.peek_second(), Some(RawUnit::Rex(_)))
    {
        cursor.advance();
    }
    if let Some(RawUnit::Rex(text)) = cursor.peek() {
        out.push(OpcodeToken::Rex(text.clone()));
        cursor.advance();
        if matches!(cursor.peek(), Some(RawUnit::Plus)) {
            cursor.advance();
        }
    }
    let mut first_byte = None;
    while let Some(RawUnit::Byte(text)) = cursor.peek() {
        if first_byte.is_none() {
            first_byte = Some(text.clone());
        }
        out.push(OpcodeToken::Byte(text.clone()));
        cursor.advance();
    }
    first_byte
}

/// Explicit cursor over the lexed units; peeking past the end returns
/// `None` instead of raising.
struct Cursor {
    units: Vec<(RawUnit, usize)>,
    index: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&RawUnit> {
        self.units.get(self.index).map(|(unit, _)| unit)
    }

    fn peek_second(&self) -> Option<&RawUnit> {
        self.units.get(self.index + 1).map(|(unit, _)| unit)
    }

    fn advance(&mut self) {
        self.index += 1;
    }

    /// Byte offset of the first unconsumed unit, if any.
    fn position(&self) -> Option<usize> {
        self.units.get(self.index).map(|(_, start)| *start)
    }
}
