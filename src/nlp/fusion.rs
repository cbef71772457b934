//! Relevance Score Fusion (RSF) and rerank math: the dynamic lex/vector
//! weighting, min-max normalization, fused scoring, cliff-cutoff
//! truncation, and the cross-encoder reference score used by L3.
//!
//! Grounded on the original `core/algorithms.py` (`compute_rsf_alpha`,
//! `normalize_scores`, `rsf_fusion`, `rerank_with_threshold_cutoff`) and
//! `retrieval/reranker.py::_compute_relevance`.

use std::collections::HashMap;

use crate::text::tokenize;

/// `alpha = 0.4 + 0.3 * sigmoid((L-k)/s)`. Short queries skew toward BM25
/// (alpha -> 0.4); long queries skew toward the vector side (alpha -> 0.7).
/// `L=k` gives the midpoint, 0.55.
pub fn rsf_alpha_with(token_length: usize, k: i32, s: f64, base: f64, range: f64) -> f64 {
    let sigmoid = 1.0 / (1.0 + (-((token_length as f64) - k as f64) / s).exp());
    base + range * sigmoid
}

/// [`rsf_alpha_with`] at the spec's documented defaults (k=8, s=1, base=0.4, range=0.3).
pub fn rsf_alpha(token_length: usize) -> f64 {
    rsf_alpha_with(token_length, 8, 1.0, 0.4, 0.3)
}

/// Min-max normalize to `[0, 1]`. All-equal (including all-zero) input
/// normalizes to all `1.0`; empty input stays empty.
pub fn normalize(xs: &[f32]) -> Vec<f32> {
    if xs.is_empty() {
        return Vec::new();
    }
    let min = xs.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; xs.len()];
    }
    xs.iter().map(|&x| (x - min) / (max - min)).collect()
}

/// Deduplicate a hit list by id, keeping the maximum score per id.
fn dedup_max(hits: &[(String, f32)]) -> HashMap<String, f32> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for (id, score) in hits {
        best.entry(id.clone())
            .and_modify(|s| *s = s.max(*score))
            .or_insert(*score);
    }
    best
}

/// RSF fusion: combine deduplicated, independently min-max-normalized
/// lexical and vector hit lists into one ranked list.
///
/// `combined = alpha * vec_norm + (1 - alpha) * lex_norm`. Returns the
/// first `top_k` entries, sorted descending (ties broken by id so the
/// result is deterministic for tests).
pub fn rsf_fuse(
    lex_hits: &[(String, f32)],
    vec_hits: &[(String, f32)],
    alpha: f64,
    top_k: usize,
) -> Vec<(String, f32)> {
    let lex = dedup_max(lex_hits);
    let vec_ = dedup_max(vec_hits);

    let mut ids: Vec<String> = lex.keys().chain(vec_.keys()).cloned().collect();
    ids.sort();
    ids.dedup();

    let lex_raw: Vec<f32> = ids.iter().map(|id| *lex.get(id).unwrap_or(&0.0)).collect();
    let vec_raw: Vec<f32> = ids.iter().map(|id| *vec_.get(id).unwrap_or(&0.0)).collect();

    let lex_norm = normalize(&lex_raw);
    let vec_norm = normalize(&vec_raw);

    let mut fused: Vec<(String, f32)> = ids
        .into_iter()
        .zip(lex_norm)
        .zip(vec_norm)
        .map(|((id, l), v)| {
            let combined = alpha as f32 * v + (1.0 - alpha as f32) * l;
            (id, combined)
        })
        .collect();

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    fused.truncate(top_k);
    fused
}

/// Cliff cutoff: keep the first item unconditionally; for each subsequent
/// item, stop (not skip) once the drop from the previous score exceeds
/// `diff_threshold` *and* the current score is below `abs_floor`. Also
/// stops once `max_output` items have been kept.
///
/// `sorted_desc` must already be sorted descending by score; output is a
/// strict prefix of it.
pub fn rerank_cutoff(sorted_desc: &[(String, f32)], diff_threshold: f32, abs_floor: f32, max_output: usize) -> Vec<(String, f32)> {
    if sorted_desc.is_empty() || max_output == 0 {
        return Vec::new();
    }

    let mut output = vec![sorted_desc[0].clone()];
    for pair in &sorted_desc[1..] {
        if output.len() >= max_output {
            break;
        }
        let prev = output.last().unwrap().1;
        let diff = prev - pair.1;
        if diff > diff_threshold && pair.1 < abs_floor {
            break;
        }
        output.push(pair.clone());
    }
    output
}

/// Reference cross-encoder score: 0.40 Jaccard + 0.35 query-token coverage
/// + 0.25 position weighting (earlier matches score higher), all folded
/// into `[0, 1]`. Production deployments swap this for a trained
/// cross-encoder scoring the same `(query, text)` pair.
pub fn cross_encoder_score(query: &str, text: &str) -> f32 {
    let q_tokens: std::collections::HashSet<String> = tokenize(query).into_iter().collect();
    let t_tokens: std::collections::HashSet<String> = tokenize(text).into_iter().collect();

    if q_tokens.is_empty() || t_tokens.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&String> = q_tokens.intersection(&t_tokens).collect();
    let union_len = q_tokens.union(&t_tokens).count();
    let jaccard = intersection.len() as f32 / union_len as f32;
    let coverage = intersection.len() as f32 / q_tokens.len() as f32;

    let text_lower = text.to_lowercase();
    let text_len = text.chars().count().max(1) as f32;
    let mut position_score = 0.0f32;
    for token in &intersection {
        let needle = token.to_lowercase();
        if let Some(byte_pos) = text_lower.find(&needle) {
            let char_pos = text_lower[..byte_pos].chars().count() as f32;
            position_score += (-3.0 * char_pos / text_len).exp();
        }
    }
    position_score /= intersection.len().max(1) as f32;

    (0.40 * jaccard + 0.35 * coverage + 0.25 * position_score).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsf_alpha_is_bounded_and_monotone() {
        let mut prev = rsf_alpha(0);
        for l in 1..200 {
            let a = rsf_alpha(l);
            assert!((0.40..0.70).contains(&a), "alpha {a} out of bounds at L={l}");
            assert!(a >= prev, "alpha must be non-decreasing: L={l}");
            prev = a;
        }
    }

    #[test]
    fn rsf_alpha_midpoint_is_055() {
        assert!((rsf_alpha(8) - 0.55).abs() < 0.01);
    }

    #[test]
    fn normalize_handles_empty_and_all_equal() {
        assert_eq!(normalize(&[]), Vec::<f32>::new());
        assert_eq!(normalize(&[5.0, 5.0, 5.0]), vec![1.0, 1.0, 1.0]);
        assert_eq!(normalize(&[0.0, 0.0]), vec![1.0, 1.0]);
        let n = normalize(&[1.0, 2.0, 3.0]);
        assert_eq!(n, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn fusion_ordering_flips_with_alpha() {
        let lex_favored = vec![("a".to_string(), 10.0), ("b".to_string(), 1.0)];
        let vec_favored = vec![("a".to_string(), 0.1), ("b".to_string(), 0.9)];

        let low_alpha = rsf_fuse(&lex_favored, &vec_favored, 0.1, 10);
        let high_alpha = rsf_fuse(&lex_favored, &vec_favored, 0.9, 10);

        assert_eq!(low_alpha[0].0, "a");
        assert_eq!(high_alpha[0].0, "b");
    }

    #[test]
    fn fusion_dedupes_by_max_score() {
        let lex = vec![("a".to_string(), 1.0), ("a".to_string(), 5.0)];
        let vec_ = vec![("a".to_string(), 2.0)];
        let fused = rsf_fuse(&lex, &vec_, 0.5, 10);
        assert_eq!(fused.len(), 1);
    }

    #[test]
    fn cutoff_respects_max_output_and_is_a_prefix() {
        let sorted = vec![
            ("a".to_string(), 0.9),
            ("b".to_string(), 0.85),
            ("c".to_string(), 0.8),
            ("d".to_string(), 0.75),
        ];
        let cut = rerank_cutoff(&sorted, 0.8, 0.3, 2);
        assert_eq!(cut.len(), 2);
        assert_eq!(cut, &sorted[..2]);
    }

    #[test]
    fn cutoff_breaks_on_big_drop_to_a_low_absolute_score() {
        let sorted = vec![("a".to_string(), 0.9), ("b".to_string(), 0.05)];
        let cut = rerank_cutoff(&sorted, 0.8, 0.3, 10);
        assert_eq!(cut.len(), 1);
    }

    #[test]
    fn cutoff_does_not_break_on_big_drop_to_a_high_absolute_score() {
        // diff > 0.8 but curr is still >= abs_floor: both conditions must hold.
        let sorted = vec![("a".to_string(), 1.0), ("b".to_string(), 0.3)];
        let cut = rerank_cutoff(&sorted, 0.8, 0.3, 10);
        assert_eq!(cut.len(), 2);
    }

    #[test]
    fn cross_encoder_score_is_zero_for_disjoint_vocabulary() {
        let score = cross_encoder_score("随机接入", "完全无关的另一段内容");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn cross_encoder_score_rewards_earlier_matches() {
        let front = cross_encoder_score("随机接入", "随机接入发生在文档最前面，后面都是别的话题的填充文字用以拉长长度");
        let back = cross_encoder_score("随机接入", "别的话题的填充文字用以拉长长度，最后面才提到随机接入");
        assert!(front >= back);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Invariant 1: `rsf_alpha` stays within `[0.40, 0.70)` and is
        /// non-decreasing in token length, for any length up to a few
        /// thousand tokens.
        #[test]
        fn rsf_alpha_bounded_and_monotone(l1 in 0usize..5000, delta in 0usize..5000) {
            let a1 = rsf_alpha(l1);
            let a2 = rsf_alpha(l1 + delta);
            prop_assert!((0.40..0.70).contains(&a1));
            prop_assert!((0.40..0.70).contains(&a2));
            prop_assert!(a2 >= a1);
        }

        /// Invariant 2: `normalize` always lands in `[0, 1]`, and the
        /// output length always matches the input length.
        #[test]
        fn normalize_stays_within_unit_interval(xs in prop::collection::vec(-1_000.0f32..1_000.0, 0..64)) {
            let normalized = normalize(&xs);
            prop_assert_eq!(normalized.len(), xs.len());
            for &v in &normalized {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }

        /// Invariant 4: `rerank_cutoff`'s output is always a strict prefix
        /// of its (already sorted-descending) input, for any scores and
        /// thresholds.
        #[test]
        fn cutoff_output_is_a_prefix_of_input(
            mut scores in prop::collection::vec(0.0f32..1.0, 1..32),
            diff_threshold in 0.0f32..1.0,
            abs_floor in 0.0f32..1.0,
            max_output in 1usize..32,
        ) {
            scores.sort_by(|a, b| b.partial_cmp(a).unwrap());
            let sorted: Vec<(String, f32)> = scores.iter().enumerate().map(|(i, s)| (format!("id{i}"), *s)).collect();
            let cut = rerank_cutoff(&sorted, diff_threshold, abs_floor, max_output);
            prop_assert!(cut.len() <= sorted.len());
            prop_assert!(cut.len() <= max_output);
            prop_assert_eq!(&cut[..], &sorted[..cut.len()]);
        }
    }
}
