use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::models::{CategoryRecord, Entry};

/// Aggregate metrics derived from a user's full entry history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total: usize,
    pub total_words: usize,
    pub streak: usize,
    pub buckets: BTreeMap<String, usize>,
}

/// Fine-grained interest tag -> coarse category bucket.
///
/// Interests missing from this table pass through as their own bucket name.
static INTEREST_BUCKETS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut buckets = HashMap::new();

    for interest in [
        "python",
        "sql",
        "javascript",
        "typescript",
        "rust",
        "algorithms",
        "data-analysis",
        "machine-learning",
    ] {
        buckets.insert(interest, "coding");
    }

    buckets.insert("articles", "reading");
    buckets.insert("books", "reading");

    buckets.insert("videos", "videos");
    buckets.insert("courses", "videos");
    buckets.insert("tutorials", "videos");

    buckets.insert("projects", "projects");
    buckets.insert("mini-projects", "projects");

    for interest in ["n8n", "erp", "bi", "automation"] {
        buckets.insert(interest, "workflows");
    }

    buckets
});

pub fn bucket_for_interest(interest: &str) -> &str {
    INTEREST_BUCKETS.get(interest).copied().unwrap_or(interest)
}

/// How many items a category record contributes to its bucket: coding
/// counts questions, reading counts articles plus books, everything else
/// counts the generic item list.
fn bucket_item_count(bucket: &str, record: &CategoryRecord) -> usize {
    match bucket {
        "coding" => record.questions.len(),
        "reading" => record.articles.len() + record.books.len(),
        _ => record.items.len(),
    }
}

/// Compute aggregate statistics over a user's entries.
///
/// Pure and total: any entry list, however sparse its content, produces a
/// well-defined result. The input is borrowed immutably and never reordered;
/// callers re-invoke after any store mutation.
pub fn compute_stats(entries: &[Entry], interests: &[String], today: NaiveDate) -> LearningStats {
    let total = entries.len();

    let total_words = entries.iter().map(|e| e.content.vocabulary.len()).sum();

    let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
    for interest in interests {
        let bucket = bucket_for_interest(interest);
        let count: usize = entries
            .iter()
            .filter_map(|e| e.content.categories.get(bucket))
            .map(|record| bucket_item_count(bucket, record))
            .sum();

        *buckets.entry(bucket.to_string()).or_insert(0) += count;
    }

    LearningStats {
        total,
        total_words,
        streak: current_streak(entries, today),
        buckets,
    }
}

/// Length of the run of consecutive days with an entry, counting backward
/// from today. No entry today means the streak is 0 regardless of history.
///
/// The upsert key makes entry dates unique per user, but the walk dedupes
/// anyway so a violated invariant upstream cannot double-count a day.
pub fn current_streak(entries: &[Entry], today: NaiveDate) -> usize {
    let mut dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let mut streak = 0;
    for (i, date) in dates.iter().enumerate() {
        let expected = today - Days::new(i as u64);
        if *date == expected {
            streak += 1;
        } else {
            break;
        }
    }

    streak
}
