//! # sdmops-parser
//!
//! Reconstructs a structured catalog of machine-instruction encodings from
//! the SDM instruction-set reference after its fixed-layout pages have been
//! mechanically converted into positioned text tokens.
//!
//! The conversion discards all table structure, so this crate recovers it:
//! rows and columns come back from token coordinates, each page's header is
//! classified against a closed registry of column layouts, and the free-text
//! opcode and instruction cells are reduced to strict token grammars. Rows
//! that don't fit fail loudly and are reported per mnemonic group; nothing
//! is silently skipped or guessed.
//!
//! Entry point: [`sdm::pipeline::parse_document`].

pub mod sdm;
