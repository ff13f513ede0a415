//! Task content generation.
//!
//! Produces the human-facing text of a virtual task together with the image
//! category it should be illustrated with. Categories are chosen by weight so
//! that operators can bias the mix from the resource library configuration.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Serialize;

/// Characters used for generated order numbers.
const ORDER_NUMBER_ALPHABET: &[u8] = b"1234567890abcdef";

/// Length of a generated order number.
pub const ORDER_NUMBER_LEN: usize = 10;

const ADJECTIVES: &[&str] = &[
    "Urgent", "Routine", "Priority", "Standard", "Quick", "Detailed", "Express", "Scheduled",
];

const ACTIONS: &[&str] = &[
    "data entry",
    "content review",
    "image tagging",
    "listing check",
    "copy editing",
    "quality audit",
    "catalogue update",
    "survey follow-up",
];

const REQUIREMENTS: &[&str] = &[
    "Follow the attached reference and keep the original layout.",
    "Double-check every field before submitting.",
    "Deliver a short summary of the changes with the result.",
    "Keep wording neutral and consistent with previous deliveries.",
    "Flag anything ambiguous instead of guessing.",
    "Submit within the delivery window; partial work is not accepted.",
];

/// An image category and its relative selection weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryWeight {
    pub code: String,
    pub weight: u32,
}

/// Generated text for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskContent {
    pub summary: String,
    pub requirement: String,
    /// Image category the task is illustrated with; `None` when no
    /// categories are configured.
    pub category: Option<String>,
    pub order_number: String,
}

/// Builds [`TaskContent`] from built-in templates and weighted categories.
#[derive(Debug, Clone, Default)]
pub struct ContentGenerator {
    categories: Vec<CategoryWeight>,
    total_weight: u64,
}

impl ContentGenerator {
    /// Categories with zero weight are never selected.
    pub fn new(categories: Vec<CategoryWeight>) -> Self {
        let categories: Vec<CategoryWeight> =
            categories.into_iter().filter(|c| c.weight > 0).collect();
        let total_weight = categories.iter().map(|c| u64::from(c.weight)).sum();
        Self {
            categories,
            total_weight,
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> TaskContent {
        let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Standard");
        let action = ACTIONS.choose(rng).copied().unwrap_or("data entry");
        let requirement = REQUIREMENTS
            .choose(rng)
            .copied()
            .unwrap_or("Follow the attached reference.");

        TaskContent {
            summary: format!("{adjective} task - {action}"),
            requirement: requirement.to_string(),
            category: self.pick_category(rng),
            order_number: order_number(rng),
        }
    }

    fn pick_category<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.total_weight == 0 {
            return None;
        }
        let mut ticket = rng.random_range(0..self.total_weight);
        for category in &self.categories {
            let weight = u64::from(category.weight);
            if ticket < weight {
                return Some(category.code.clone());
            }
            ticket -= weight;
        }
        None
    }
}

/// Random order number drawn from the hex-like alphabet.
pub fn order_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ORDER_NUMBER_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ORDER_NUMBER_ALPHABET.len());
            char::from(ORDER_NUMBER_ALPHABET[idx])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn weights(pairs: &[(&str, u32)]) -> Vec<CategoryWeight> {
        pairs
            .iter()
            .map(|(code, weight)| CategoryWeight {
                code: code.to_string(),
                weight: *weight,
            })
            .collect()
    }

    #[test]
    fn generate_always_assigns_a_configured_category() {
        let generator = ContentGenerator::new(weights(&[("docs", 1), ("photos", 3)]));
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let content = generator.generate(&mut rng);
            let category = content.category.expect("category");
            assert!(category == "docs" || category == "photos");
            assert!(content.summary.contains(" task - "));
            assert!(!content.requirement.is_empty());
        }
    }

    #[test]
    fn zero_weight_categories_are_never_picked() {
        let generator = ContentGenerator::new(weights(&[("never", 0), ("always", 2)]));
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            assert_eq!(generator.generate(&mut rng).category.as_deref(), Some("always"));
        }
    }

    #[test]
    fn no_categories_yields_none() {
        let generator = ContentGenerator::default();
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(generator.generate(&mut rng).category, None);
    }

    #[test]
    fn heavier_categories_are_picked_more_often() {
        let generator = ContentGenerator::new(weights(&[("light", 1), ("heavy", 9)]));
        let mut rng = StdRng::seed_from_u64(17);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..1000 {
            let category = generator.generate(&mut rng).category.expect("category");
            *counts.entry(category).or_default() += 1;
        }
        assert!(counts["heavy"] > counts["light"] * 3);
    }

    #[test]
    fn order_numbers_use_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(4);
        let number = order_number(&mut rng);
        assert_eq!(number.len(), ORDER_NUMBER_LEN);
        assert!(number.bytes().all(|b| ORDER_NUMBER_ALPHABET.contains(&b)));
    }
}
