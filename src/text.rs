// Text normalization helpers for title matching
// "Café" and "Cafe" must compare equal during search disambiguation

use unicode_normalization::UnicodeNormalization;

/// Strip accents/diacritics from a string, e.g. "Appétit" -> "Appetit".
///
/// Canonical (NFD) decomposition followed by removal of the combining
/// diacritical marks block, then trim. Matching is widened with this; the
/// cache keys always use the raw title.
pub fn normalize(s: &str) -> String {
    s.nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check whether two strings are equivalent once case-folded and normalized.
pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(&a.to_lowercase()) == normalize(&b.to_lowercase())
}
