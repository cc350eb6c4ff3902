//! Consistency checks over an existing map.

use crate::{katakana::is_katakana, store::KatakanaMap};
use serde::Serialize;

/// Katakana endings that render a plural `s`.
const PLURAL_ENDINGS: &[char] = &['ス', 'ズ', 'ツ', 'ヅ'];

/// Findings of [`audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Entries whose value is not katakana
    pub invalid: Vec<(String, String)>,

    /// Words ending in `s` whose value lacks a plural ending
    pub plural_mismatches: Vec<(String, String)>,
}

impl AuditReport {
    /// Returns true if every value is valid katakana.
    ///
    /// Plural mismatches are advisory and do not count.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    /// Prints both lists to stdout.
    pub fn print(&self) {
        if self.invalid.is_empty() {
            println!("All values in the map are valid katakana.");
        } else {
            println!("Following keys have non-katakana values:");
            for (word, value) in &self.invalid {
                println!("- {word}: {value}");
            }
        }

        if self.plural_mismatches.is_empty() {
            println!("\nAll plural words (ending with 's') have plural katakana endings.");
        } else {
            println!("\nFollowing keys ending with 's' have values not ending with ス, ズ, ツ or ヅ:");
            for (word, value) in &self.plural_mismatches {
                println!("- {word}: {value}");
            }
        }
    }
}

/// Checks every entry of `map`.
#[must_use]
pub fn audit(map: &KatakanaMap) -> AuditReport {
    let mut report = AuditReport::default();

    for (word, value) in map {
        if !is_katakana(value) {
            report.invalid.push((word.clone(), value.clone()));
        }
        if word.ends_with('s') && !value.ends_with(PLURAL_ENDINGS) {
            report
                .plural_mismatches
                .push((word.clone(), value.clone()));
        }
    }

    report
}
