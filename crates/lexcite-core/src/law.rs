//! Law-name normalisation and alias resolution.

use unicode_normalization::UnicodeNormalization;

/// Historical and colloquial names mapped to the current statute title.
const LAW_ALIASES: &[(&str, &str)] = &[
    ("性平法", "性別平等工作法"),
    ("性別工作平等法", "性別平等工作法"),
    ("性別平等法", "性別平等工作法"),
    ("勞基法", "勞動基準法"),
    ("就服法", "就業服務法"),
    ("職安法", "職業安全衛生法"),
];

/// NFKC-fold, drop all whitespace (including U+3000), and lowercase.
pub fn normalize_law_key(s: &str) -> String {
    s.nfkc()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolve a law name to its canonical title, or return it trimmed.
pub fn canonical_law_name(s: &str) -> String {
    let key = normalize_law_key(s);
    LAW_ALIASES
        .iter()
        .find(|(alias, _)| normalize_law_key(alias) == key)
        .map(|(_, target)| (*target).to_string())
        .unwrap_or_else(|| s.trim().to_string())
}
