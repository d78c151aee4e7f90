//! Closed registry of table layouts.
//!
//! The reference chapters use several incompatible column orderings. Each
//! recognized ordering is one [`Schema`] variant, selected by the normalized
//! header key; an unknown key is a terminal error for the page, never a
//! guess. The registry is a plain enum so "unknown schema" stays
//! exhaustively checkable.

use crate::sdm::error::{ParseError, ParseResult};
use crate::sdm::token::PageId;

/// One recognized column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// `Opcode | Instruction | Op/En | 64-bit Mode | Compat/Leg Mode | Description`
    LegacySplit,
    /// `Opcode | Instruction | 64-bit Mode | Compat/Leg Mode | Description`
    LegacySplitNoOpEn,
    /// `Opcode | Instruction | Op/En | 64/32-bit Mode | CPUID Feature Flag | Description`
    CpuidSplit,
    /// `Opcode | Instruction | Op/En | 64/32 bit Mode Support | CPUID Feature Flag | Description`
    CpuidSplitSupport,
    /// `Opcode/Instruction | Op/En | 64/32 bit Mode Support | CPUID Feature Flag | Description`
    VexMerged,
    /// `Opcode/Instruction | Op/En | 64/32-bit Mode | CPUID Feature Flag | Description`
    VexMergedMode,
}

impl Schema {
    /// Every registered layout, in registry order.
    pub const ALL: [Schema; 6] = [
        Schema::LegacySplit,
        Schema::LegacySplitNoOpEn,
        Schema::CpuidSplit,
        Schema::CpuidSplitSupport,
        Schema::VexMerged,
        Schema::VexMergedMode,
    ];

    /// The normalized header key this layout answers to.
    pub fn key(self) -> &'static str {
        match self {
            Schema::LegacySplit => "opcode#instruction#open#64bitmode#compatlegmode#description",
            Schema::LegacySplitNoOpEn => "opcode#instruction#64bitmode#compatlegmode#description",
            Schema::CpuidSplit => {
                "opcode#instruction#open#6432bitmode#cpuidfeatureflag#description"
            }
            Schema::CpuidSplitSupport => {
                "opcode#instruction#open#6432bitmodesupport#cpuidfeatureflag#description"
            }
            Schema::VexMerged => {
                "opcodeinstruction#open#6432bitmodesupport#cpuidfeatureflag#description"
            }
            Schema::VexMergedMode => {
                "opcodeinstruction#open#6432bitmode#cpuidfeatureflag#description"
            }
        }
    }

    /// Resolve a header key against the registry.
    pub fn from_key(key: &str, page: PageId) -> ParseResult<Schema> {
        Schema::ALL
            .into_iter()
            .find(|schema| schema.key() == key)
            .ok_or_else(|| ParseError::UnknownSchema {
                key: key.to_string(),
                page,
            })
    }

    /// Row-mode layouts band visual rows and group them per record; the
    /// others reconstruct a table keyed on the Op/En column.
    pub fn uses_row_mode(self) -> bool {
        matches!(self, Schema::LegacySplit | Schema::LegacySplitNoOpEn)
    }

    /// Column index of the Op/En column for table-mode layouts.
    pub fn key_column(self) -> Option<usize> {
        match self {
            Schema::LegacySplit | Schema::LegacySplitNoOpEn => None,
            Schema::CpuidSplit | Schema::CpuidSplitSupport => Some(2),
            Schema::VexMerged | Schema::VexMergedMode => Some(1),
        }
    }

    /// Whether opcode and instruction share one column.
    pub fn merged_opcode_column(self) -> bool {
        matches!(self, Schema::VexMerged | Schema::VexMergedMode)
    }

    /// Whether this layout carries an Op/En column at all.
    pub fn has_op_en(self) -> bool {
        !matches!(self, Schema::LegacySplitNoOpEn)
    }

    /// The `Valid N.E.` / `Valid Valid` concatenated-flag anomaly is only
    /// documented for the legacy split layouts (MOV, RET).
    pub fn allows_concatenated_validity(self) -> bool {
        matches!(self, Schema::LegacySplit | Schema::LegacySplitNoOpEn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_resolves_every_registered_layout() {
        for schema in Schema::ALL {
            assert_eq!(Schema::from_key(schema.key(), 1).unwrap(), schema);
        }
    }

    #[test]
    fn test_from_key_rejects_unknown() {
        let err = Schema::from_key("opcode#description", 42).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownSchema {
                key: "opcode#description".to_string(),
                page: 42
            }
        );
    }

    #[test]
    fn test_registry_keys_are_distinct() {
        for (i, a) in Schema::ALL.iter().enumerate() {
            for b in &Schema::ALL[i + 1..] {
                assert_ne!(a.key(), b.key());
            }
        }
    }
}
