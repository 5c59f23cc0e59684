//! # Candidate Aggregator
//!
//! Unions the results of several provider queries and picks from them.
//! Both the gallery and the auto-apply path dedup first, then sample, so a
//! photo matching two people is never more likely to be chosen.

use rand::seq::SliceRandom;
use std::collections::HashSet;

use crate::providers::Candidate;

/// Collapses candidates with equal ids, keeping the first occurrence in order.
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

/// Uniformly picks `n` items without replacement.
///
/// When `n` covers the whole pool, the pool is returned unchanged.
pub fn select_random<T: Clone>(pool: &[T], n: usize) -> Vec<T> {
    if n >= pool.len() {
        return pool.to_vec();
    }
    let mut rng = rand::thread_rng();
    pool.choose_multiple(&mut rng, n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CandidatePayload;
    use std::path::PathBuf;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            payload: CandidatePayload::LocalFile(PathBuf::from(id)),
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let unique = dedup(vec![candidate("x"), candidate("y"), candidate("x"), candidate("z"), candidate("y")]);
        assert_eq!(ids(&unique), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup(Vec::new()).is_empty());
    }

    #[test]
    fn test_select_all_when_n_covers_pool() {
        let pool = vec![1, 2, 3];
        assert_eq!(select_random(&pool, 3), pool);
        assert_eq!(select_random(&pool, 10), pool);
    }

    #[test]
    fn test_select_subset_is_distinct_members() {
        let pool: Vec<u32> = (0..50).collect();
        for n in [1, 7, 49] {
            let picked = select_random(&pool, n);
            assert_eq!(picked.len(), n);
            let distinct: HashSet<_> = picked.iter().collect();
            assert_eq!(distinct.len(), n);
            assert!(picked.iter().all(|p| pool.contains(p)));
        }
    }

    #[test]
    fn test_select_from_empty_pool() {
        let pool: Vec<u32> = Vec::new();
        assert!(select_random(&pool, 1).is_empty());
    }
}
