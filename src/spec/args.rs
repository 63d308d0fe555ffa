//! Per-argument specification inference, before and after the call.

use crate::features::FeatureRecord;

use super::round3;

/// Inferred per-argument check requirements.
///
/// One entry per argument position: whether a conforming caller checks it,
/// and the observed share backing that claim (`None` in doc-only mode).
#[derive(Debug, Clone, Default)]
pub struct ArgSpec {
    /// `[need_check, score]` per argument position.
    pub args_need_to_check: Vec<(bool, Option<f64>)>,
}

/// Counts pre-call argument checks across a function's traces.
///
/// The argument count is pinned by the first record carrying the section;
/// records disagreeing with it are treated as variadic noise and skipped.
#[derive(Debug, Default)]
pub struct ArgPreAnalyzer {
    arg_num: Option<usize>,
    checked: Vec<u64>,
}

impl ArgPreAnalyzer {
    /// Argument count observed for this function, if any record had one.
    pub fn arg_num(&self) -> Option<usize> {
        self.arg_num
    }

    /// Fold one distinct record observed `time` times.
    pub fn update(&mut self, record: &FeatureRecord, time: u64) {
        let Some(pre) = &record.arg_pre else { return };
        match self.arg_num {
            None => {
                self.arg_num = Some(pre.arg_num);
                self.checked = vec![0; pre.arg_num];
            }
            Some(n) if n == 0 || pre.arg_num != n => return,
            Some(_) => {}
        }
        for (i, count) in self.checked.iter_mut().enumerate() {
            if pre.feature.get(i).is_some_and(|slot| slot.check.checked) {
                *count += time;
            }
        }
    }

    /// Close the analyzer into an [`ArgSpec`].
    pub fn finish(&self, total: u64, threshold: f64, disable_code: bool) -> ArgSpec {
        finish_counts(&self.checked, total, threshold, disable_code)
    }
}

/// Counts post-call argument checks across a function's traces.
#[derive(Debug, Default)]
pub struct ArgPostAnalyzer {
    arg_num: Option<usize>,
    checked: Vec<u64>,
}

impl ArgPostAnalyzer {
    /// Fold one distinct record observed `time` times.
    pub fn update(&mut self, record: &FeatureRecord, time: u64) {
        let Some(post) = &record.arg_post else { return };
        match self.arg_num {
            None => {
                self.arg_num = Some(post.arg_num);
                self.checked = vec![0; post.arg_num];
            }
            Some(n) if n == 0 || post.arg_num != n => return,
            Some(_) => {}
        }
        for (i, count) in self.checked.iter_mut().enumerate() {
            // Constants carry no state worth re-checking after the call.
            let constant = record
                .arg_pre
                .as_ref()
                .and_then(|pre| pre.feature.get(i))
                .is_some_and(|slot| slot.is_constant);
            if !constant && post.feature.get(i).is_some_and(|slot| slot.used_in_check) {
                *count += time;
            }
        }
    }

    /// Close the analyzer into an [`ArgSpec`].
    pub fn finish(&self, total: u64, threshold: f64, disable_code: bool) -> ArgSpec {
        finish_counts(&self.checked, total, threshold, disable_code)
    }
}

fn finish_counts(checked: &[u64], total: u64, threshold: f64, disable_code: bool) -> ArgSpec {
    if disable_code {
        return ArgSpec {
            args_need_to_check: vec![(false, None); checked.len()],
        };
    }
    ArgSpec {
        args_need_to_check: checked
            .iter()
            .map(|count| {
                let share = *count as f64 / total as f64;
                (share >= threshold, Some(round3(share)))
            })
            .collect(),
    }
}
