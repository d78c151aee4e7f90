//! Mnemonic index builder.
//!
//! Scans the front matter's hyperlink anchors for `MNEMONIC — Title` entries
//! and derives the ordered work list the pipeline walks. The scan stops at
//! the first page-number regression: the reference chapters are laid out in
//! ascending page order, so a regression marks the start of the figure and
//! appendix links that must not be treated as instruction entries.

use std::collections::BTreeMap;

use crate::sdm::token::{PageId, SdmDocument};

/// Size suffixes recognized by the slash-group expansion rule.
const MNEMONIC_SUFFIXES: [&str; 8] = ["8", "16", "32", "64", "B", "W", "D", "Q"];

/// One work-list entry: the mnemonics a reference section documents and the
/// physical page its tables start on.
#[derive(Debug, Clone, PartialEq)]
pub struct MnemonicIndexEntry {
    pub mnemonics: Vec<String>,
    pub start_page: PageId,
}

impl MnemonicIndexEntry {
    /// Stable key used for the failure map and run report.
    pub fn group_key(&self) -> String {
        self.mnemonics.join(",")
    }
}

/// Expand a comma/slash-compressed section title into its mnemonics.
///
/// A slash group whose second member is a bare size suffix distributes the
/// first member's base over every member: `VMOVDQU8/16/32/64` becomes
/// `VMOVDQU8, VMOVDQU16, VMOVDQU32, VMOVDQU64`. Groups that don't qualify
/// are split verbatim.
pub fn expand_mnemonic(title: &str) -> Vec<String> {
    let mut ops: Vec<String> = Vec::new();
    for part in title.split(',') {
        let members: Vec<&str> = part.split('/').collect();
        if members.len() < 2 || !MNEMONIC_SUFFIXES.contains(&members[1].trim()) {
            ops.extend(members.iter().map(|m| m.to_string()));
            continue;
        }
        // Adjustment for MOVDQU,VMOVDQU8/16/32/64 and friends: strip every
        // recognized suffix off the first member to recover the base.
        ops.push(members[0].to_string());
        let mut base = members[0].trim();
        for suffix in MNEMONIC_SUFFIXES {
            if let Some(stripped) = base.strip_suffix(suffix) {
                base = stripped;
            }
        }
        for member in &members[1..] {
            ops.push(format!("{}{}", base, member.trim()));
        }
    }
    ops.into_iter().map(|op| op.trim().to_string()).collect()
}

/// Build the ordered index from every page's anchor links.
///
/// An empty result is valid here; the pipeline turns it into the fatal
/// empty-index condition.
pub fn build_index(doc: &SdmDocument) -> Vec<MnemonicIndexEntry> {
    let mut index = Vec::new();
    let mut last_page: PageId = 0;
    for page in doc.pages() {
        for anchor in &page.anchors {
            if !anchor.text.contains('—') {
                continue;
            }
            if anchor.target_page < last_page {
                // End of the sequential reference chapters; everything after
                // this points at figures and appendices.
                return index;
            }
            last_page = anchor.target_page;
            let head = anchor.text.split('.').next().unwrap_or("");
            let title = head.split('—').next().unwrap_or("");
            index.push(MnemonicIndexEntry {
                mnemonics: expand_mnemonic(title),
                start_page: anchor.target_page,
            });
        }
    }
    index
}

/// Map each mnemonic to every page it is indexed under.
pub fn mnemonic_page_map(index: &[MnemonicIndexEntry]) -> BTreeMap<String, Vec<PageId>> {
    let mut map: BTreeMap<String, Vec<PageId>> = BTreeMap::new();
    for entry in index {
        for mnemonic in &entry.mnemonics {
            map.entry(mnemonic.clone()).or_default().push(entry.start_page);
        }
    }
    map
}

/// Summary statistics over the index, for the CLI's stats mode.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub groups: usize,
    pub mnemonics: usize,
    pub longest_mnemonic: String,
    pub by_first_letter: BTreeMap<char, usize>,
}

pub fn index_stats(index: &[MnemonicIndexEntry]) -> IndexStats {
    let map = mnemonic_page_map(index);
    let mut longest = String::new();
    let mut by_first_letter: BTreeMap<char, usize> = BTreeMap::new();
    for mnemonic in map.keys() {
        if mnemonic.len() > longest.len() {
            longest = mnemonic.clone();
        }
        if let Some(first) = mnemonic.chars().next() {
            *by_first_letter.entry(first).or_insert(0) += 1;
        }
    }
    IndexStats {
        groups: index.len(),
        mnemonics: map.len(),
        longest_mnemonic: longest,
        by_first_letter,
    }
}
