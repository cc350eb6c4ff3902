//! Katakana validation.
//!
//! [`is_katakana`] is the only gate between oracle output and the persisted
//! map: nothing is stored unless it passes.

use unicode_normalization::UnicodeNormalization;

/// Combining voiced sound mark (dakuten).
const COMBINING_VOICED_MARK: char = '\u{3099}';

/// Combining semi-voiced sound mark (handakuten).
const COMBINING_SEMI_VOICED_MARK: char = '\u{309A}';

/// Prolonged sound mark, accepted regardless of its Unicode classification.
pub const PROLONGED_SOUND_MARK: char = 'ー';

/// Middle dot separator, accepted regardless of its Unicode classification.
pub const MIDDLE_DOT: char = '・';

/// Code point ranges whose Unicode name starts with `KATAKANA` or
/// `HALFWIDTH KATAKANA` and whose general category is one of
/// Lo, Lm, Sk, Mn or Pd.
///
/// KATAKANA MIDDLE DOT (U+30FB, Po) and HALFWIDTH KATAKANA MIDDLE DOT
/// (U+FF65, Po) are absent on purpose. The voiced sound marks U+309B/U+309C
/// (Sk) are listed for completeness, though NFKC never lets them through.
const KATAKANA_RANGES: &[(char, char)] = &[
    ('\u{309B}', '\u{309C}'),   // KATAKANA-HIRAGANA (SEMI-)VOICED SOUND MARK
    ('\u{30A0}', '\u{30FA}'),   // DOUBLE HYPHEN, LETTER SMALL A ..= LETTER VO
    ('\u{30FC}', '\u{30FF}'),   // PROLONGED SOUND MARK ..= DIGRAPH KOTO
    ('\u{31F0}', '\u{31FF}'),   // LETTER SMALL KU ..= LETTER SMALL RO
    ('\u{FF66}', '\u{FF9F}'),   // HALFWIDTH LETTER WO ..= SEMI-VOICED SOUND MARK
    ('\u{1AFF0}', '\u{1AFF3}'), // LETTER MINNAN TONE-2 ..= TONE-5
    ('\u{1AFF5}', '\u{1AFFB}'), // LETTER MINNAN TONE-7 ..= NASALIZED TONE-5
    ('\u{1AFFD}', '\u{1AFFE}'), // LETTER MINNAN NASALIZED TONE-7 ..= TONE-8
    ('\u{1B000}', '\u{1B000}'), // LETTER ARCHAIC E
    ('\u{1B120}', '\u{1B122}'), // LETTER ARCHAIC YI ..= ARCHAIC WU
    ('\u{1B155}', '\u{1B155}'), // LETTER SMALL KO
    ('\u{1B164}', '\u{1B167}'), // LETTER SMALL WI ..= SMALL N
];

/// Applies NFKC and strips detached combining voicing marks.
///
/// NFKC already composes a base character with a following voicing mark
/// (`カ` + U+3099 becomes `ガ`); whatever marks remain afterwards cannot
/// attach to anything and are dropped.
#[must_use]
pub fn normalize_katakana(text: &str) -> String {
    text.nfkc()
        .filter(|&c| c != COMBINING_VOICED_MARK && c != COMBINING_SEMI_VOICED_MARK)
        .collect()
}

/// Returns true if `text` is a non-empty katakana transliteration.
///
/// # Examples
///
/// ```
/// use katakana_gen::is_katakana;
///
/// assert!(is_katakana("アップル"));
/// assert!(is_katakana("コンピューター"));
/// assert!(!is_katakana("BANANA"));
/// assert!(!is_katakana(""));
/// ```
#[must_use]
pub fn is_katakana(text: &str) -> bool {
    let normalized = normalize_katakana(text);
    !normalized.is_empty() && normalized.chars().all(is_katakana_char)
}

/// Character-level predicate applied after normalization.
#[must_use]
pub fn is_katakana_char(c: char) -> bool {
    c == PROLONGED_SOUND_MARK
        || c == MIDDLE_DOT
        || KATAKANA_RANGES
            .iter()
            .any(|&(start, end)| (start..=end).contains(&c))
}
