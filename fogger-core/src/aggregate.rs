//! Category aggregation
//!
//! Reduces a signal list to one score per category. The score is the
//! strongest single piece of evidence in the category, so a collaborator
//! emitting many weak duplicate hits cannot inflate it.

use std::collections::BTreeMap;

use crate::{Category, Signal};

/// Per-category scores, absent categories count as zero
pub type CategoryScores = BTreeMap<Category, f64>;

/// Maximum confidence per category
pub fn aggregate_categories(signals: &[Signal]) -> CategoryScores {
    let mut scores = CategoryScores::new();

    for signal in signals {
        let confidence = signal.effective_confidence();
        let entry = scores.entry(signal.category.clone()).or_insert(0.0);
        if confidence > *entry {
            *entry = confidence;
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(id: &str, category: Category, confidence: f64) -> Signal {
        Signal::builder(id, category).confidence(confidence).build()
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_categories(&[]).is_empty());
    }

    #[test]
    fn test_max_not_sum() {
        let signals = vec![
            signal("kw_slot", Category::Ux, 0.4),
            signal("kw_gacor", Category::Ux, 0.7),
            signal("kw_maxwin", Category::Ux, 0.5),
            signal("qris", Category::Payment, 0.9),
        ];

        let scores = aggregate_categories(&signals);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&Category::Ux], 0.7);
        assert_eq!(scores[&Category::Payment], 0.9);
        assert!(!scores.contains_key(&Category::Dns));
    }

    #[test]
    fn test_lower_duplicates_do_not_change_aggregate() {
        let mut signals = vec![signal("cdn_cloudflare", Category::Cdn, 0.6)];
        let before = aggregate_categories(&signals);

        for i in 0..50 {
            signals.push(signal(&format!("cdn_dup_{i}"), Category::Cdn, 0.59));
        }
        let after = aggregate_categories(&signals);

        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_confidence_category_is_present() {
        let scores = aggregate_categories(&[signal("dns_churn", Category::Dns, 0.0)]);
        assert_eq!(scores.get(&Category::Dns), Some(&0.0));
    }

    #[test]
    fn test_non_finite_confidence_counts_as_zero() {
        let mut bad = signal("bad", Category::Infra, 0.5);
        bad.confidence = f64::NAN;
        let mut huge = signal("huge", Category::Cdn, 0.5);
        huge.confidence = 7.0;

        let scores = aggregate_categories(&[bad, huge]);
        assert_eq!(scores[&Category::Infra], 0.0);
        assert_eq!(scores[&Category::Cdn], 1.0);
    }
}
