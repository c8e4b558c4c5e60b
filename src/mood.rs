//! Mood phrase to taxonomy category matching
//!
//! Deterministic scoring of a free-text phrase against category labels.
//! Whole-phrase containment scores 1.0 outright; otherwise each label
//! token is matched against the phrase tokens (exact, or fuzzy via
//! Jaro-Winkler above a floor) and the score is the mean over label
//! tokens. Highest score wins and ties break toward earlier taxonomy
//! order. Anything below the caller's threshold is no match at all;
//! there is no silent fallback to an arbitrary category.

use crate::types::MoodCategory;
use strsim::jaro_winkler;
use tracing::debug;

/// Per-token similarity below this floor counts as no match
const TOKEN_SIMILARITY_FLOOR: f64 = 0.85;

/// Score how well `phrase` matches a category `label`, in 0.0-1.0
pub fn score_match(phrase: &str, label: &str) -> f64 {
    let phrase_lower = phrase.trim().to_lowercase();
    let label_lower = label.trim().to_lowercase();

    if phrase_lower.is_empty() || label_lower.is_empty() {
        return 0.0;
    }

    // Whole-label containment is as good as it gets
    if phrase_lower.contains(&label_lower) || label_lower.contains(&phrase_lower) {
        return 1.0;
    }

    let phrase_tokens: Vec<&str> = tokenize(&phrase_lower);
    let label_tokens: Vec<&str> = tokenize(&label_lower);
    if label_tokens.is_empty() || phrase_tokens.is_empty() {
        return 0.0;
    }

    let total: f64 = label_tokens
        .iter()
        .map(|label_token| {
            phrase_tokens
                .iter()
                .map(|phrase_token| {
                    if phrase_token == label_token {
                        1.0
                    } else {
                        let sim = jaro_winkler(phrase_token, label_token);
                        if sim >= TOKEN_SIMILARITY_FLOOR {
                            sim
                        } else {
                            0.0
                        }
                    }
                })
                .fold(0.0, f64::max)
        })
        .sum();

    total / label_tokens.len() as f64
}

/// Pick the best-scoring category at or above `min_score`
///
/// Returns the category together with its score; `None` when nothing
/// clears the threshold. Ties break toward earlier taxonomy order.
pub fn match_category<'a>(
    phrase: &str,
    taxonomy: &'a [MoodCategory],
    min_score: f64,
) -> Option<(&'a MoodCategory, f64)> {
    let mut best: Option<(&MoodCategory, f64)> = None;

    for category in taxonomy {
        let score = score_match(phrase, &category.label);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ if score > 0.0 => best = Some((category, score)),
            _ => {}
        }
    }

    match best {
        Some((category, score)) if score >= min_score => {
            debug!(
                phrase = %phrase,
                category = %category.label,
                score = score,
                "Matched mood category"
            );
            Some((category, score))
        }
        _ => None,
    }
}

fn tokenize(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Vec<MoodCategory> {
        vec![
            MoodCategory { label: "Chill".to_string(), id: "c1".to_string() },
            MoodCategory { label: "Workout".to_string(), id: "c2".to_string() },
            MoodCategory { label: "Feel Good".to_string(), id: "c3".to_string() },
            MoodCategory { label: "Focus".to_string(), id: "c4".to_string() },
        ]
    }

    // Scoring rule table: (phrase, label, minimum expected, maximum expected)
    #[test]
    fn test_score_table() {
        let cases: &[(&str, &str, f64, f64)] = &[
            ("chill", "Chill", 1.0, 1.0),                     // exact, case-insensitive
            ("I want something chill", "Chill", 1.0, 1.0),    // label contained in phrase
            ("workout music please", "Workout", 1.0, 1.0),    // containment
            ("chily evening", "Chill", 0.0, 0.95),            // fuzzy token at best
            ("feel good tunes", "Feel Good", 1.0, 1.0),       // multi-token containment
            ("good vibes", "Feel Good", 0.4, 0.6),            // one of two label tokens
            ("death metal", "Chill", 0.0, 0.0),               // zero overlap
            ("", "Chill", 0.0, 0.0),                          // empty phrase
        ];

        for (phrase, label, min, max) in cases {
            let score = score_match(phrase, label);
            assert!(
                score >= *min && score <= *max,
                "score_match({:?}, {:?}) = {} not in [{}, {}]",
                phrase,
                label,
                score,
                min,
                max
            );
        }
    }

    #[test]
    fn test_match_picks_highest_scoring_category() {
        let taxonomy = taxonomy();
        let (category, score) =
            match_category("I want something chill tonight", &taxonomy, 0.5).unwrap();
        assert_eq!(category.id, "c1");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_match_below_threshold_is_none() {
        let taxonomy = taxonomy();
        assert!(match_category("polka accordion classics", &taxonomy, 0.5).is_none());
    }

    #[test]
    fn test_match_is_deterministic_on_ties() {
        // Both labels contain the phrase token; earlier taxonomy order wins
        let taxonomy = vec![
            MoodCategory { label: "Party".to_string(), id: "p1".to_string() },
            MoodCategory { label: "Party".to_string(), id: "p2".to_string() },
        ];
        let (category, _) = match_category("party", &taxonomy, 0.5).unwrap();
        assert_eq!(category.id, "p1");
    }

    #[test]
    fn test_match_empty_taxonomy_is_none() {
        assert!(match_category("chill", &[], 0.5).is_none());
    }
}
