//! Theory answer scoring
//!
//! Free-text exam answers are scored against the question's expected key
//! points and, when present, a sample answer:
//!
//! - keyword score: share of expected key points found in the answer
//!   (case-insensitive substring match), weighted 60%
//! - overlap score: share of the sample answer's words (longer than three
//!   characters) that also appear in the answer, weighted 40%. Without a
//!   sample answer the keyword score stands in.
//!
//! Only confident scores are applied automatically. Everything else is
//! scored zero and flagged for the teacher.

use serde::Serialize;

const KEYWORD_WEIGHT: f64 = 0.6;
const OVERLAP_WEIGHT: f64 = 0.4;

/// Overall score at or above which the answer is excellent
const EXCELLENT: f64 = 0.8;
/// Overall score at or above which the answer is good
const GOOD: f64 = 0.5;
/// Overall score below which nothing is applied automatically
const AUTO_SCORE_FLOOR: f64 = 0.3;
/// Confidence below which nothing is applied automatically
const AUTO_SCORE_CONFIDENCE: f64 = 0.7;

/// Key points listed in feedback
const FEEDBACK_LIMIT: usize = 3;

// weighted sums like 0.6 * 0.8 + 0.4 * 0.8 land a hair under 0.8
const EPSILON: f64 = 1e-9;

/// Result of scoring one answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TheoryScore {
    /// Points awarded, two decimal places; zero unless auto-scored
    pub score: f64,
    pub confidence: f64,
    pub feedback: String,
    /// False when the answer needs teacher review
    pub auto_scored: bool,
}

/// Score a theory answer out of `points`
pub fn score_theory_answer<K: AsRef<str>>(
    answer: &str,
    expected: &[K],
    sample_answer: Option<&str>,
    points: f64,
) -> TheoryScore {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() {
        return TheoryScore {
            score: 0.0,
            confidence: 1.0,
            feedback: "No answer provided.".to_string(),
            auto_scored: true,
        };
    }

    let (matched, missed): (Vec<&str>, Vec<&str>) = expected
        .iter()
        .map(AsRef::as_ref)
        .partition(|keyword| answer.contains(&keyword.trim().to_lowercase()));

    let keyword_score = if expected.is_empty() {
        0.0
    } else {
        matched.len() as f64 / expected.len() as f64
    };

    let overlap_score = match sample_answer.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sample) => word_overlap(&answer, &sample.to_lowercase()),
        None => keyword_score,
    };

    let overall = KEYWORD_WEIGHT * keyword_score + OVERLAP_WEIGHT * overlap_score;
    let points_earned = (overall * points * 100.0).round() / 100.0;

    let confidence = if keyword_score > 0.8 {
        0.9
    } else if keyword_score > 0.5 {
        0.7
    } else {
        0.5
    };

    let mut feedback = Vec::new();
    if at_least(overall, EXCELLENT) {
        feedback.push(format!(
            "Excellent answer! Key points identified: {}.",
            matched.join(", ")
        ));
    } else if at_least(overall, GOOD) {
        feedback.push(format!("Good effort. You covered: {}.", matched.join(", ")));
        if !missed.is_empty() {
            feedback.push(format!("Consider including: {}.", first_few(&missed)));
        }
    } else {
        feedback.push("Needs improvement.".to_string());
        if !missed.is_empty() {
            feedback.push(format!("Missing key points: {}.", first_few(&missed)));
        }
    }

    let auto_scored =
        at_least(confidence, AUTO_SCORE_CONFIDENCE) && at_least(overall, AUTO_SCORE_FLOOR);
    if !auto_scored {
        feedback.push("This answer has been flagged for teacher review.".to_string());
    }

    TheoryScore {
        score: if auto_scored { points_earned } else { 0.0 },
        confidence,
        feedback: feedback.join(" "),
        auto_scored,
    }
}

/// Share of the sample's significant words that the answer also uses
fn word_overlap(answer: &str, sample: &str) -> f64 {
    let sample_words: Vec<&str> = significant_words(sample).collect();
    if sample_words.is_empty() {
        return 0.0;
    }
    let common = significant_words(answer)
        .filter(|word| sample_words.contains(word))
        .count();
    common as f64 / sample_words.len() as f64
}

fn significant_words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace().filter(|w| w.chars().count() > 3)
}

fn first_few(keywords: &[&str]) -> String {
    keywords
        .iter()
        .take(FEEDBACK_LIMIT)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn at_least(value: f64, threshold: f64) -> bool {
    value + EPSILON >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_POINTS: [&str; 5] = ["Sunlight", "chlorophyll", "carbon dioxide", "oxygen", "glucose"];

    fn answer_with(points: &[&str]) -> String {
        format!("Plants use {} in leaves", points.join(" and "))
    }

    #[test]
    fn test_empty_answer() {
        let score = score_theory_answer("   \n", &KEY_POINTS, None, 10.0);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.confidence, 1.0);
        assert_eq!(score.feedback, "No answer provided.");
        assert!(score.auto_scored);
    }

    #[test]
    fn test_all_key_points() {
        let answer = answer_with(&["SUNLIGHT", "chlorophyll", "carbon dioxide", "oxygen", "glucose"]);
        let score = score_theory_answer(&answer, &KEY_POINTS, None, 10.0);
        assert_eq!(score.score, 10.0);
        assert_eq!(score.confidence, 0.9);
        assert!(score.auto_scored);
        assert!(score
            .feedback
            .starts_with("Excellent answer! Key points identified: Sunlight, chlorophyll"));
    }

    #[test]
    fn test_excellent_boundary() {
        // four of five: exactly 0.8 overall, but keyword share is not above 0.8
        let answer = answer_with(&["sunlight", "chlorophyll", "carbon dioxide", "oxygen"]);
        let score = score_theory_answer(&answer, &KEY_POINTS, None, 10.0);
        assert_eq!(score.score, 8.0);
        assert_eq!(score.confidence, 0.7);
        assert!(score.auto_scored);
        assert!(score.feedback.starts_with("Excellent answer!"));
    }

    #[test]
    fn test_good_boundary() {
        let answer = answer_with(&["sunlight", "chlorophyll", "carbon dioxide"]);
        let score = score_theory_answer(&answer, &KEY_POINTS, None, 5.0);
        assert_eq!(score.score, 3.0);
        assert_eq!(score.confidence, 0.7);
        assert!(score.auto_scored);
        assert_eq!(
            score.feedback,
            "Good effort. You covered: Sunlight, chlorophyll, carbon dioxide. \
             Consider including: oxygen, glucose."
        );

        // half the key points and a perfect sample match: 0.7 overall, low confidence
        let score = score_theory_answer(
            "chlorophyll absorbs light",
            &["chlorophyll", "stomata"],
            Some("Chlorophyll absorbs light"),
            10.0,
        );
        assert_eq!(score.confidence, 0.5);
        assert!(!score.auto_scored);
        assert_eq!(score.score, 0.0);
        assert!(score.feedback.starts_with("Good effort."));
        assert!(score.feedback.ends_with("flagged for teacher review."));
    }

    #[test]
    fn test_auto_score_floor() {
        // three of five key points, no overlap with the sample: 0.36 overall
        let score = score_theory_answer(
            "sunlight chlorophyll oxygen",
            &KEY_POINTS,
            Some("water travels through xylem vessels"),
            10.0,
        );
        assert!(score.auto_scored);
        assert_eq!(score.score, 3.6);
        assert!(score.feedback.starts_with("Needs improvement. Missing key points: carbon dioxide, glucose."));
        assert!(!score.feedback.contains("flagged"));
    }

    #[test]
    fn test_weak_answer_flagged() {
        let score = score_theory_answer("plants are green", &KEY_POINTS, None, 10.0);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.confidence, 0.5);
        assert!(!score.auto_scored);
        assert_eq!(
            score.feedback,
            "Needs improvement. Missing key points: Sunlight, chlorophyll, carbon dioxide. \
             This answer has been flagged for teacher review."
        );
    }

    #[test]
    fn test_sample_overlap_ignores_short_words() {
        let sample = "the leaf makes food from light";
        // significant sample words: leaf, makes, food, from, light
        assert!((word_overlap("a leaf makes food", sample) - 0.6).abs() < 1e-12);
        assert_eq!(word_overlap("the sun", sample), 0.0);
        assert_eq!(word_overlap("anything", "a an the"), 0.0);
    }

    #[test]
    fn test_no_key_points() {
        let score = score_theory_answer::<&str>("an answer", &[], None, 10.0);
        assert_eq!(score.confidence, 0.5);
        assert!(!score.auto_scored);
        assert_eq!(
            score.feedback,
            "Needs improvement. This answer has been flagged for teacher review."
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let score = score_theory_answer("", &KEY_POINTS, None, 4.0);
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["autoScored"], true);
    }
}
