//! Token-based fuzzy matching. Any algorithm satisfying the contract below
//! is an acceptable implementation; this one is a Sorensen-Dice-style
//! token-multiset overlap, scaled to `[0, 100]`.
//!
//! Contract: `token_ratio(a, a) == 100`; `token_ratio(a, b) == token_ratio(b,
//! a)`; adding a token to one side that also appears on the other side never
//! decreases the score.

use std::collections::HashMap;

fn tokenize(s: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in s.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Token-ratio similarity in `[0, 100]`. Two empty/unparseable strings are
/// defined as identical (100); one empty and one non-empty are unrelated (0).
pub fn token_ratio(a: &str, b: &str) -> u8 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);

    let count_a: u32 = tokens_a.values().sum();
    let count_b: u32 = tokens_b.values().sum();

    if count_a == 0 && count_b == 0 {
        return 100;
    }
    if count_a == 0 || count_b == 0 {
        return 0;
    }

    let common: u32 = tokens_a
        .iter()
        .map(|(token, &na)| na.min(*tokens_b.get(token).unwrap_or(&0)))
        .sum();

    let score = 200.0 * f64::from(common) / f64::from(count_a + count_b);
    score.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_100() {
        assert_eq!(token_ratio("Кухонный свет", "Кухонный свет"), 100);
        assert_eq!(token_ratio("", ""), 100);
    }

    #[test]
    fn is_symmetric() {
        assert_eq!(
            token_ratio("включи свет", "свет"),
            token_ratio("свет", "включи свет")
        );
    }

    #[test]
    fn adding_matching_token_never_decreases_score() {
        let base = token_ratio("кухонный", "кухонный свет");
        let more = token_ratio("кухонный свет", "кухонный свет");
        assert!(more >= base);
    }

    #[test]
    fn disjoint_tokens_score_zero() {
        assert_eq!(token_ratio("свет", "колонка"), 0);
    }
}
