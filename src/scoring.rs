// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Weighted multi-constraint scoring engine.
//!
//! Scores a query [`Sad`] against a candidate [`RouteEntry`], combining a
//! handful of hard (disqualifying) constraints with a weighted sum of soft
//! sub-scores. A negative score means the candidate is disqualified.

use serde::{Deserialize, Serialize};

use crate::routing_table::RouteEntry;
use crate::sad::{FieldTag, Sad};

/// Sentinel returned for a disqualified candidate. Always negative, so
/// callers can test `score < 0.0`.
pub const DISQUALIFIED: f32 = -1.0;

/// Five nonnegative weights applied to the soft sub-scores. Should sum to
/// 1.0 but this is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub capability: f32,
    pub latency: f32,
    pub cost: f32,
    pub context_window: f32,
    pub trust: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            capability: 0.30,
            latency: 0.25,
            cost: 0.20,
            context_window: 0.15,
            trust: 0.10,
        }
    }
}

fn popcount(x: u32) -> u32 {
    x.count_ones()
}

fn match_model_arch(query: &Sad, candidate_caps: &Sad) -> f32 {
    match query.find(FieldTag::ModelArch) {
        None => 1.0,
        Some(_) => {
            let q = query.get_u32(FieldTag::ModelArch);
            match candidate_caps.find(FieldTag::ModelArch) {
                None => 0.0,
                Some(_) => {
                    if candidate_caps.get_u32(FieldTag::ModelArch) == q {
                        1.0
                    } else {
                        0.0
                    }
                }
            }
        }
    }
}

fn match_capability(query: &Sad, candidate_caps: &Sad) -> f32 {
    let q_caps = match query.find(FieldTag::Capability) {
        None => return 1.0,
        Some(_) => query.get_u32(FieldTag::Capability),
    };
    if q_caps == 0 {
        return 1.0;
    }
    let c_caps = match candidate_caps.find(FieldTag::Capability) {
        None => return 0.0,
        Some(_) => candidate_caps.get_u32(FieldTag::Capability),
    };
    let matched = c_caps & q_caps;
    popcount(matched) as f32 / popcount(q_caps) as f32
}

fn match_context_window(query: &Sad, candidate_caps: &Sad) -> f32 {
    match query.find(FieldTag::ContextWindow) {
        None => 1.0,
        Some(_) => {
            let q_ctx = query.get_u32(FieldTag::ContextWindow);
            match candidate_caps.find(FieldTag::ContextWindow) {
                None => 0.0,
                Some(_) => {
                    let c_ctx = candidate_caps.get_u32(FieldTag::ContextWindow);
                    if c_ctx >= q_ctx {
                        1.0
                    } else {
                        0.0
                    }
                }
            }
        }
    }
}

fn match_latency(query: &Sad, candidate_latency_us: u32) -> f32 {
    let max_ms = match query.find(FieldTag::MaxLatencyMs) {
        None => return 1.0,
        Some(_) => query.get_u32(FieldTag::MaxLatencyMs),
    };
    if max_ms == 0 {
        return 0.0;
    }
    let cand_ms = candidate_latency_us as f32 / 1000.0;
    let score = 1.0 - (cand_ms / max_ms as f32);
    score.max(0.0)
}

fn match_cost(query: &Sad, candidate_cost_milli: u32) -> f32 {
    let max_cost = match query.find(FieldTag::MaxCostMilli) {
        None => return 1.0,
        Some(_) => query.get_u32(FieldTag::MaxCostMilli),
    };
    if max_cost == 0 {
        return 0.0;
    }
    let score = 1.0 - (candidate_cost_milli as f32 / max_cost as f32);
    score.max(0.0)
}

fn match_trust(query: &Sad, candidate_trust: u8) -> f32 {
    match query.find(FieldTag::TrustLevel) {
        None => 1.0,
        Some(_) => {
            let required = query.get_u8(FieldTag::TrustLevel);
            if candidate_trust >= required {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn match_region_prefer(query: &Sad, candidate_region: u16) -> f32 {
    match query.find(FieldTag::RegionPrefer) {
        None => 1.0,
        Some(_) => {
            let regions = query.get_regions(FieldTag::RegionPrefer);
            if regions.contains(&candidate_region) {
                1.0
            } else {
                0.5
            }
        }
    }
}

/// Returns `None` for "pass", `Some(DISQUALIFIED)` for "hard reject".
fn match_region_exclude(query: &Sad, candidate_region: u16) -> Option<f32> {
    match query.find(FieldTag::RegionExclude) {
        None => None,
        Some(_) => {
            let regions = query.get_regions(FieldTag::RegionExclude);
            if regions.contains(&candidate_region) {
                Some(DISQUALIFIED)
            } else {
                None
            }
        }
    }
}

/// Compute the composite match score of `candidate` against `query`,
/// using `weights` for the soft sub-scores. Returns a value in `[0, 1]`,
/// or a negative sentinel if a hard constraint was violated.
///
/// Order of operations (load-bearing, matches the reference implementation):
/// wildcard shortcut, then the three hard checks (context_window, trust,
/// region_exclude), then the weighted soft sum, then the model_arch hard
/// check applied *after* the sum, then the region_prefer multiplier, then
/// clamp to `[0, 1]`.
pub fn score(query: &Sad, candidate: &RouteEntry, weights: &ScoringWeights) -> f32 {
    if query.is_wildcard() {
        return 1.0;
    }

    let cand_caps = &candidate.capabilities;

    let ctx_score = match_context_window(query, cand_caps);
    if ctx_score <= 0.0 {
        return DISQUALIFIED;
    }

    let trust_score = match_trust(query, candidate.trust_level);
    if trust_score <= 0.0 {
        return DISQUALIFIED;
    }

    if let Some(rejected) = match_region_exclude(query, candidate.region_code) {
        return rejected;
    }

    let arch_score = match_model_arch(query, cand_caps);
    let cap_score = match_capability(query, cand_caps);
    let lat_score = match_latency(query, candidate.latency_us);
    let cost_score = match_cost(query, candidate.cost_milli);
    let region_pref = match_region_prefer(query, candidate.region_code);

    let mut total = 0.0;
    total += weights.capability * cap_score;
    total += weights.latency * lat_score;
    total += weights.cost * cost_score;
    total += weights.context_window * ctx_score;
    total += weights.trust * trust_score;

    if arch_score <= 0.0 {
        return DISQUALIFIED;
    }

    total *= region_pref;

    total.clamp(0.0, 1.0)
}

/// A single resolve result: a copy of the matched entry plus its score.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub entry: RouteEntry,
    pub score: f32,
}

/// Scan `entries`, scoring each against `query`, and return up to `top_k`
/// results sorted descending by score. Disqualified candidates are
/// skipped. Ties keep insertion order (stable): a later equal-score
/// candidate never displaces an earlier one.
pub fn find_best(
    query: &Sad,
    entries: &[RouteEntry],
    weights: &ScoringWeights,
    top_k: usize,
) -> Vec<ResolveResult> {
    if top_k == 0 {
        return Vec::new();
    }

    let mut results: Vec<ResolveResult> = Vec::with_capacity(top_k);

    for entry in entries {
        let s = score(query, entry, weights);
        if s < 0.0 {
            continue;
        }

        if results.len() < top_k {
            let mut pos = results.len();
            results.push(ResolveResult {
                entry: entry.clone(),
                score: s,
            });
            while pos > 0 && results[pos - 1].score < s {
                results.swap(pos - 1, pos);
                pos -= 1;
            }
        } else if s > results[results.len() - 1].score {
            let last = results.len() - 1;
            results[last] = ResolveResult {
                entry: entry.clone(),
                score: s,
            };
            let mut pos = last;
            while pos > 0 && results[pos - 1].score < s {
                results.swap(pos - 1, pos);
                pos -= 1;
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::NodeId;

    fn entry_with(caps: Sad, latency_us: u32, region: u16, trust: u8, node: u8) -> RouteEntry {
        RouteEntry {
            node_id: NodeId::new([node; 16]),
            capabilities: caps,
            latency_us,
            load_factor: 0.0,
            cost_milli: 0,
            trust_level: trust,
            region_code: region,
            last_updated: 0,
            ttl_ns: 0,
        }
    }

    fn caps_with_arch_and_bits(arch: u32, bits: u32, ctx: u32) -> Sad {
        let mut s = Sad::new();
        s.add_u32(FieldTag::ModelArch, arch).unwrap();
        s.add_u32(FieldTag::Capability, bits).unwrap();
        s.add_u32(FieldTag::ContextWindow, ctx).unwrap();
        s
    }

    #[test]
    fn wildcard_scores_one_against_everything() {
        let query = Sad::new();
        let entry = entry_with(caps_with_arch_and_bits(1, 1, 100), 999, 1, 0, 1);
        assert_eq!(score(&query, &entry, &ScoringWeights::default()), 1.0);
    }

    #[test]
    fn scenario_hard_constraint_rejection() {
        let mut query = Sad::new();
        query.add_u32(FieldTag::ContextWindow, 131072).unwrap();
        let entry = entry_with(caps_with_arch_and_bits(1, 1, 8192), 10, 1, 0, 1);
        assert!(score(&query, &entry, &ScoringWeights::default()) < 0.0);
    }

    #[test]
    fn trust_hard_constraint() {
        let mut query = Sad::new();
        query.add_u8(FieldTag::TrustLevel, 3).unwrap();
        let entry = entry_with(caps_with_arch_and_bits(1, 1, 8192), 10, 1, 1, 1);
        assert!(score(&query, &entry, &ScoringWeights::default()) < 0.0);
    }

    #[test]
    fn region_exclude_hard_constraint() {
        let mut query = Sad::new();
        query.add_regions(FieldTag::RegionExclude, &[840]).unwrap();
        let entry = entry_with(caps_with_arch_and_bits(1, 1, 8192), 10, 840, 0, 1);
        assert!(score(&query, &entry, &ScoringWeights::default()) < 0.0);
    }

    #[test]
    fn model_arch_mismatch_is_hard_reject_after_sum() {
        let mut query = Sad::new();
        query.add_u32(FieldTag::ModelArch, 1).unwrap();
        let entry = entry_with(caps_with_arch_and_bits(2, 1, 8192), 10, 1, 0, 1);
        assert!(score(&query, &entry, &ScoringWeights::default()) < 0.0);
    }

    #[test]
    fn increasing_latency_weakly_decreases_score() {
        let mut query = Sad::new();
        query.add_u32(FieldTag::MaxLatencyMs, 500).unwrap();
        let fast = entry_with(Sad::new(), 10_000, 1, 0, 1);
        let slow = entry_with(Sad::new(), 400_000, 1, 0, 1);
        let weights = ScoringWeights::default();
        let fast_score = score(&query, &fast, &weights);
        let slow_score = score(&query, &slow, &weights);
        assert!(slow_score <= fast_score);
    }

    #[test]
    fn scenario_top_k_ranking() {
        const TEXT_GEN: u32 = 1 << 0;
        const CODE_GEN: u32 = 1 << 1;
        const IMAGE_GEN: u32 = 1 << 2;
        const REASONING: u32 = 1 << 7;

        let mut caps0 = Sad::new();
        caps0
            .add_u32(FieldTag::Capability, TEXT_GEN | CODE_GEN | REASONING)
            .unwrap();
        let mut caps1 = Sad::new();
        caps1.add_u32(FieldTag::Capability, TEXT_GEN).unwrap();
        let mut caps2 = Sad::new();
        caps2
            .add_u32(FieldTag::Capability, TEXT_GEN | CODE_GEN | IMAGE_GEN)
            .unwrap();
        let mut caps3 = Sad::new();
        caps3.add_u32(FieldTag::Capability, CODE_GEN).unwrap();

        let entries = vec![
            entry_with(caps0, 50_000, 1, 0, 0),
            entry_with(caps1, 200_000, 1, 0, 1),
            entry_with(caps2, 30_000, 1, 0, 2),
            entry_with(caps3, 450_000, 1, 0, 3),
        ];

        let mut query = Sad::new();
        query
            .add_u32(FieldTag::Capability, TEXT_GEN | CODE_GEN)
            .unwrap();
        query.add_u32(FieldTag::MaxLatencyMs, 500).unwrap();

        let results = find_best(&query, &entries, &ScoringWeights::default(), 2);
        assert_eq!(results.len(), 2);
        let winners: Vec<u8> = results.iter().map(|r| r.entry.node_id.0[0]).collect();
        assert!(winners.contains(&0));
        assert!(winners.contains(&2));
    }

    #[test]
    fn top_k_never_returns_disqualified_and_is_sorted_descending() {
        let mut query = Sad::new();
        query.add_u8(FieldTag::TrustLevel, 2).unwrap();
        let entries = vec![
            entry_with(Sad::new(), 10, 1, 0, 0), // disqualified (trust 0 < 2)
            entry_with(Sad::new(), 10, 1, 2, 1),
            entry_with(Sad::new(), 500, 1, 3, 2),
        ];
        let results = find_best(&query, &entries, &ScoringWeights::default(), 5);
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        for r in &results {
            assert_ne!(r.entry.node_id.0[0], 0);
        }
    }

    #[test]
    fn tie_break_is_stable_insertion_order() {
        let entries = vec![
            entry_with(Sad::new(), 0, 1, 0, 0),
            entry_with(Sad::new(), 0, 1, 0, 1),
            entry_with(Sad::new(), 0, 1, 0, 2),
        ];
        let query = Sad::new(); // wildcard: every candidate scores 1.0
        let results = find_best(&query, &entries, &ScoringWeights::default(), 2);
        assert_eq!(results[0].entry.node_id.0[0], 0);
        assert_eq!(results[1].entry.node_id.0[0], 1);
    }
}
