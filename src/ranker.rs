//! Top-N selection over the item catalog.
//!
//! Items are ordered by descending score; equal scores (including exact ties
//! such as an all-zero preference vector) go to the lower catalog index. The
//! order is total, so the selected list is the same however the catalog is
//! partitioned across threads.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::kernels::dot;
use crate::models::FeedbackSet;
use crate::store::FactorStore;

/// Catalogs at least this large are scored in parallel.
const PARALLEL_THRESHOLD: usize = 16_384;
/// Rows scored per parallel task.
const CHUNK_ROWS: usize = 4_096;

/// A catalog index with its score against a preference vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredItem {
    pub index: usize,
    pub score: f64,
}

/// `Less` means `a` ranks ahead of `b`.
fn ranking(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.index.cmp(&b.index))
}

/// Heap entry whose maximum is the worst-ranked candidate kept so far.
#[derive(Debug, Clone, Copy)]
struct Candidate(ScoredItem);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        ranking(&self.0, &other.0)
    }
}

/// Keeps the best `limit` items offered to it.
struct TopN {
    limit: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopN {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::with_capacity(limit),
        }
    }

    fn offer(&mut self, item: ScoredItem) {
        if self.heap.len() < self.limit {
            self.heap.push(Candidate(item));
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if ranking(&item, &worst.0) == Ordering::Less {
                *worst = Candidate(item);
            }
        }
    }

    fn merge(mut self, other: TopN) -> TopN {
        for candidate in other.heap {
            self.offer(candidate.0);
        }
        self
    }

    /// Best first.
    fn into_sorted(self) -> Vec<ScoredItem> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|candidate| candidate.0)
            .collect()
    }
}

/// Scores every item outside `feedback` against `preference` and returns the
/// best `n`, best first.
///
/// The result has `min(n, store.size() − feedback.len())` entries. Every
/// index in `feedback` must be valid for `store`.
pub fn top_n(
    store: &FactorStore,
    preference: &[f64],
    feedback: &FeedbackSet,
    n: usize,
) -> Vec<ScoredItem> {
    debug_assert_eq!(preference.len(), store.dimension());

    let available = store.size().saturating_sub(feedback.len());
    let limit = n.min(available);
    if limit == 0 {
        return Vec::new();
    }

    let k = store.dimension();
    let factors = store.factors();

    let top = if store.size() >= PARALLEL_THRESHOLD {
        factors
            .par_chunks(CHUNK_ROWS * k)
            .enumerate()
            .map(|(chunk, rows)| score_rows(rows, chunk * CHUNK_ROWS, k, preference, feedback, limit))
            .reduce(|| TopN::new(limit), TopN::merge)
    } else {
        score_rows(factors, 0, k, preference, feedback, limit)
    };

    top.into_sorted()
}

fn score_rows(
    rows: &[f64],
    first_index: usize,
    k: usize,
    preference: &[f64],
    feedback: &FeedbackSet,
    limit: usize,
) -> TopN {
    let mut top = TopN::new(limit);
    for (offset, x) in rows.chunks_exact(k).enumerate() {
        let index = first_index + offset;
        if feedback.contains(index) {
            continue;
        }
        top.offer(ScoredItem {
            index,
            score: dot(preference, x),
        });
    }
    top
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_from(rows: usize, k: usize, value: impl Fn(usize, usize) -> f64) -> FactorStore {
        let identifiers = (0..rows).map(|i| format!("owner/repo{i}")).collect();
        let mut factors = Vec::with_capacity(rows * k);
        for r in 0..rows {
            for c in 0..k {
                factors.push(value(r, c));
            }
        }
        FactorStore::from_parts(identifiers, factors, k).unwrap()
    }

    fn indices(items: &[ScoredItem]) -> Vec<usize> {
        items.iter().map(|item| item.index).collect()
    }

    #[test]
    fn test_orders_by_score_descending() {
        let store = store_from(5, 1, |r, _| r as f64);
        let top = top_n(&store, &[1.0], &FeedbackSet::new(), 3);
        assert_eq!(indices(&top), vec![4, 3, 2]);
        assert_eq!(top[0].score, 4.0);
    }

    #[test]
    fn test_excludes_feedback() {
        let store = store_from(5, 1, |r, _| r as f64);
        let feedback: FeedbackSet = [4, 2].into_iter().collect();
        let top = top_n(&store, &[1.0], &feedback, 5);
        assert_eq!(indices(&top), vec![3, 1, 0]);
    }

    #[test]
    fn test_ties_go_to_lower_index() {
        let store = store_from(6, 2, |r, c| if c == 0 { (r % 2) as f64 } else { 0.0 });
        let top = top_n(&store, &[1.0, 0.0], &FeedbackSet::new(), 4);
        assert_eq!(indices(&top), vec![1, 3, 5, 0]);
    }

    #[test]
    fn test_zero_preference_returns_lowest_indices() {
        let store = store_from(10, 3, |r, c| (r * 3 + c) as f64 - 7.0);
        let feedback: FeedbackSet = [0, 3].into_iter().collect();
        let top = top_n(&store, &[0.0, 0.0, 0.0], &feedback, 4);
        assert_eq!(indices(&top), vec![1, 2, 4, 5]);
        assert!(top.iter().all(|item| item.score == 0.0));
    }

    #[test]
    fn test_zero_count_is_empty() {
        let store = store_from(3, 1, |r, _| r as f64);
        assert!(top_n(&store, &[1.0], &FeedbackSet::new(), 0).is_empty());
    }

    #[test]
    fn test_length_is_capped_by_available_items() {
        let store = store_from(4, 1, |r, _| r as f64);
        let feedback: FeedbackSet = [1].into_iter().collect();
        assert_eq!(top_n(&store, &[1.0], &feedback, 10).len(), 3);

        let everything: FeedbackSet = (0..4).collect();
        assert!(top_n(&store, &[1.0], &everything, 10).is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        // few distinct scores, so the cut-off lands inside a run of ties
        let rows = PARALLEL_THRESHOLD + 1_234;
        let store = store_from(rows, 2, |r, c| ((r * 7 + c * 3) % 5) as f64);
        let preference = [1.0, 0.5];
        let feedback: FeedbackSet = (0..rows).step_by(97).collect();

        let parallel = top_n(&store, &preference, &feedback, 250);
        let sequential = score_rows(store.factors(), 0, 2, &preference, &feedback, 250).into_sorted();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.len(), 250);
        for pair in parallel.windows(2) {
            assert_eq!(ranking(&pair[0], &pair[1]), Ordering::Less);
        }
        assert!(parallel.iter().all(|item| !feedback.contains(item.index)));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let store = store_from(100, 4, |r, c| ((r + c) % 3) as f64 * 0.25);
        let preference = [0.5, -0.25, 1.0, 0.0];
        let feedback: FeedbackSet = [5, 17, 64].into_iter().collect();
        let first = top_n(&store, &preference, &feedback, 20);
        let second = top_n(&store, &preference, &feedback, 20);
        assert_eq!(first, second);
    }
}
