//! Return-value specification inference.

use std::collections::BTreeMap;

use crate::features::{CheckValKey, FeatureRecord};

use super::round3;

/// Inferred contract for a function's return value.
#[derive(Debug, Clone, Default)]
pub struct RetSpec {
    /// A conforming caller must compare the return value.
    pub need_to_check: bool,
    /// Fraction of traces that checked the return.
    pub score: f64,
    /// Check-value keys seen often enough to count as legitimate, with
    /// their share among checked traces.
    pub valid_chkvals: BTreeMap<CheckValKey, f64>,
    /// Self-freeing heuristic: when the function itself reappears after
    /// the call, the return usually goes unchecked and that is fine.
    pub no_need_to_check_if_same_in_post: bool,
    /// Complement of the heuristic: traces without the trailing self-call
    /// do check the return, so the plain majority rule still applies to
    /// them.
    pub no_same_in_post_need_to_check: bool,
}

/// Streaming analyzer over one function's feature table.
#[derive(Debug, Default)]
pub struct RetAnalyzer {
    checked_count: u64,
    // Checked and the function itself appears in post.call.
    cur_checked: u64,
    has_same_in_post: u64,
    chkvals: Vec<(CheckValKey, u64)>,
}

impl RetAnalyzer {
    /// Fold one distinct record observed `time` times.
    pub fn update(&mut self, func_name: &str, record: &FeatureRecord, time: u64) {
        let Some(ret) = &record.retval else { return };
        let same_in_post = record
            .causality
            .as_ref()
            .is_some_and(|c| c.post_call.contains_key(func_name));
        if same_in_post {
            self.has_same_in_post += time;
        }
        let Some(key) = CheckValKey::from_check(&ret.check) else {
            return;
        };
        self.checked_count += time;
        if same_in_post {
            self.cur_checked += time;
        }
        match self.chkvals.iter_mut().find(|(k, _)| *k == key) {
            Some((_, t)) => *t += time,
            None => self.chkvals.push((key, time)),
        }
    }

    /// Close the analyzer into a [`RetSpec`].
    ///
    /// The self-freeing heuristic is only enabled for single-argument
    /// functions, where "the same value" is unambiguous.
    pub fn finish(
        &self,
        total: u64,
        threshold: f64,
        arg_num: Option<usize>,
        disable_code: bool,
    ) -> RetSpec {
        let mut no_need_if_same_in_post = false;
        let mut no_same_in_post_need = false;
        if arg_num == Some(1) {
            if self.has_same_in_post > 0 {
                no_need_if_same_in_post =
                    (self.cur_checked as f64 / self.has_same_in_post as f64) < threshold;
            }
            if total > self.has_same_in_post {
                no_same_in_post_need = (self.checked_count - self.cur_checked) as f64
                    / (total - self.has_same_in_post) as f64
                    > threshold;
            }
        }

        if disable_code {
            // The heuristic stays on as an empirical filter; everything
            // else defers to documentation.
            return RetSpec {
                need_to_check: false,
                score: 0.0,
                valid_chkvals: BTreeMap::new(),
                no_need_to_check_if_same_in_post: no_need_if_same_in_post,
                no_same_in_post_need_to_check: false,
            };
        }

        let checked_share = self.checked_count as f64 / total as f64;
        let mut valid_chkvals = BTreeMap::new();
        if self.checked_count > 0 {
            let min_share = 1.0 / self.chkvals.len() as f64;
            for (key, time) in &self.chkvals {
                let share = *time as f64 / self.checked_count as f64;
                if share >= min_share {
                    valid_chkvals.insert(*key, round3(share));
                }
            }
        }
        RetSpec {
            need_to_check: checked_share >= threshold,
            score: round3(checked_share),
            valid_chkvals,
            no_need_to_check_if_same_in_post: no_need_if_same_in_post,
            no_same_in_post_need_to_check: no_same_in_post_need,
        }
    }
}
