//! Neighboring-call (causality) specification inference.
//!
//! For every function observed before or after the target on a trace, the
//! analyzer accumulates how often the pairing occurs and, for trailing
//! neighbors, under which return-value check condition of the target it
//! occurs. Neighbors frequent enough under the acceptance threshold become
//! required.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::features::FeatureRecord;
use crate::keywords;

use super::round3;

/// Score bonus for a post-style neighbor of a pre-style target.
pub const CAUSAL_ENHANCE_PRE_POST: f64 = 0.3;
/// Score bonus for a post-style neighbor of any other target.
pub const CAUSAL_ENHANCE_POST: f64 = 0.1;
/// Neighbors below this raw frequency prune the rest of the sorted list.
pub const CAUSAL_MIN_FREQ: f64 = 0.2;
/// Corpora smaller than this never receive keyword enhancement.
pub const CAUSAL_ENHANCE_MIN_TRACES: u64 = 50;

/// Check-condition key of a trace that carries no return-value section.
pub const DEFAULT_COND: &str = "default";
/// Check-condition key of a trace whose return value was never compared.
pub const NO_CHECK_COND: &str = "no_check";

/// Per-trace return-check condition used to bucket trailing neighbors.
pub fn check_cond_key(record: &FeatureRecord) -> String {
    let Some(ret) = &record.retval else {
        return DEFAULT_COND.to_string();
    };
    let check = &ret.check;
    if check.checked {
        if check.compared_with_non_const {
            "non_const".to_string()
        } else {
            let cond = check.check_cond.map_or("", |c| c.as_str());
            format!("{}_{}", check.compared_with_const, cond)
        }
    } else if check.indir_checked {
        "indir_chk".to_string()
    } else {
        NO_CHECK_COND.to_string()
    }
}

/// One required trailing neighbor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostNeighbor {
    /// Frequency score, including any keyword enhancement.
    pub score: f64,
    /// Return-check conditions under which the pairing is expected, keyed
    /// as by [`check_cond_key`]. Empty means the pairing holds regardless.
    pub conds: BTreeMap<String, f64>,
}

/// Inferred neighboring-call contract.
#[derive(Debug, Clone, Default)]
pub struct CausalSpec {
    /// Required preceding calls, sorted by (score desc, name asc).
    pub pre_functions: IndexMap<String, f64>,
    /// Required trailing calls, sorted by (score desc, name asc).
    pub post_functions: IndexMap<String, PostNeighbor>,
}

/// Streaming analyzer over one function's feature table.
#[derive(Debug, Default)]
pub struct CausalAnalyzer {
    // Trace counts per check condition of the target's own return.
    chkcond_stat: BTreeMap<String, u64>,
    pre_stat: BTreeMap<String, u64>,
    post_stat: BTreeMap<String, (u64, BTreeMap<String, u64>)>,
}

impl CausalAnalyzer {
    /// Fold one distinct record observed `time` times.
    pub fn update(&mut self, record: &FeatureRecord, time: u64) {
        let Some(causal) = &record.causality else { return };
        let cond = check_cond_key(record);
        *self.chkcond_stat.entry(cond.clone()).or_insert(0) += time;
        for func in causal.pre_call.keys() {
            *self.pre_stat.entry(func.clone()).or_insert(0) += time;
        }
        for func in causal.post_call.keys() {
            let entry = self
                .post_stat
                .entry(func.clone())
                .or_insert_with(|| (0, BTreeMap::new()));
            entry.0 += time;
            *entry.1.entry(cond.clone()).or_insert(0) += time;
        }
    }

    /// Close the analyzer into a [`CausalSpec`].
    pub fn finish(
        &self,
        func_name: &str,
        total: u64,
        threshold: f64,
        disable_code: bool,
    ) -> CausalSpec {
        if disable_code {
            return CausalSpec::default();
        }
        CausalSpec {
            pre_functions: self.filter_pre(total, threshold),
            post_functions: self.filter_post(func_name, total, threshold),
        }
    }

    fn filter_pre(&self, total: u64, threshold: f64) -> IndexMap<String, f64> {
        let mut sorted: Vec<(&String, u64)> =
            self.pre_stat.iter().map(|(k, v)| (k, *v)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut picked: Vec<(String, f64)> = Vec::new();
        for (func, time) in sorted {
            let raw = time as f64 / total as f64;
            if raw >= threshold {
                picked.push((func.clone(), round3(raw)));
            }
            if raw < CAUSAL_MIN_FREQ {
                break;
            }
        }
        sort_by_score(&mut picked, |score| *score);
        picked.into_iter().collect()
    }

    fn filter_post(
        &self,
        target: &str,
        total: u64,
        threshold: f64,
    ) -> IndexMap<String, PostNeighbor> {
        let mut sorted: Vec<(&String, &(u64, BTreeMap<String, u64>))> =
            self.post_stat.iter().collect();
        sorted.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(b.0)));

        let mut picked: Vec<(String, PostNeighbor)> = Vec::new();
        for (func, (time, conds)) in sorted {
            let enhanced = if total >= CAUSAL_ENHANCE_MIN_TRACES {
                enhancement(target, func)
            } else {
                0.0
            };
            let raw = *time as f64 / total as f64;
            let score = raw + enhanced;
            if score >= threshold {
                picked.push((
                    func.clone(),
                    PostNeighbor {
                        score: round3(score),
                        conds: self.filter_conds(conds, threshold),
                    },
                ));
            }
            if raw < CAUSAL_MIN_FREQ {
                break;
            }
        }
        sort_by_score(&mut picked, |neighbor| neighbor.score);
        picked.into_iter().collect()
    }

    /// Keep a check condition when it is the only one observed for the
    /// neighbor, or when its share against that condition's own trace
    /// population clears the threshold. `no_check` is handled first and
    /// does not count toward the "only one" rule for the others.
    fn filter_conds(&self, stats: &BTreeMap<String, u64>, threshold: f64) -> BTreeMap<String, f64> {
        let mut conds = BTreeMap::new();
        let mut valid_len = stats.len();
        if let Some(time) = stats.get(NO_CHECK_COND) {
            if let Some(total) = self.chkcond_stat.get(NO_CHECK_COND) {
                let score = *time as f64 / *total as f64;
                if valid_len == 1 || score > threshold {
                    conds.insert(NO_CHECK_COND.to_string(), round3(score));
                }
            }
            valid_len -= 1;
        }
        for (cond, time) in stats {
            if cond == NO_CHECK_COND {
                continue;
            }
            let Some(total) = self.chkcond_stat.get(cond) else {
                continue;
            };
            let score = *time as f64 / *total as f64;
            if valid_len == 1 || score > threshold {
                conds.insert(cond.clone(), round3(score));
            }
        }
        conds
    }
}

/// Keyword bonus for a trailing neighbor of `target`.
fn enhancement(target: &str, neighbor: &str) -> f64 {
    if keywords::is_pre(target) && keywords::is_post(neighbor) {
        CAUSAL_ENHANCE_PRE_POST
    } else if keywords::is_post(neighbor) {
        CAUSAL_ENHANCE_POST
    } else {
        0.0
    }
}

fn sort_by_score<T>(entries: &mut [(String, T)], score: impl Fn(&T) -> f64) {
    entries.sort_by(|a, b| {
        score(&b.1)
            .partial_cmp(&score(&a.1))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}
