//! Specification inference from folded feature tables.
//!
//! Four analyzers fold one pass over a [`FeatureTable`] into a
//! per-function [`Specification`]: thresholded claims about what a
//! conforming call to that function looks like. Specifications live for
//! exactly one detection pass and carry no back-references.

pub mod args;
pub mod causality;
pub mod retval;

use crate::features::FeatureTable;

pub use args::{ArgPostAnalyzer, ArgPreAnalyzer, ArgSpec};
pub use causality::{check_cond_key, CausalAnalyzer, CausalSpec, PostNeighbor};
pub use retval::{RetAnalyzer, RetSpec};

/// Default midpoint of the logistic threshold curve.
pub const DEFAULT_RHO: u32 = 500;

/// Acceptance threshold for a corpus of `total` traces.
///
/// A user override inside (0, 1) wins unconditionally. `rho = 0` pins the
/// strict ceiling of 0.8. Otherwise the logistic curve ramps from a gentle
/// 0.5 for rarely-seen functions toward 0.8 for hot ones, with the knee at
/// `rho` traces.
pub fn threshold(total: u64, user: Option<f64>, rho: Option<u32>) -> f64 {
    if let Some(t) = user {
        if t > 0.0 && t < 1.0 {
            return t;
        }
        // Out-of-range overrides silently fall back to the curve.
    }
    let rho = rho.unwrap_or(DEFAULT_RHO);
    if rho == 0 {
        return 0.8;
    }
    let rho = f64::from(rho);
    0.5 + 0.3 / (1.0 + (-(total as f64 - rho) / (rho / 5.0)).exp())
}

/// Round a score the way it is reported: three decimals.
pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Options steering specification inference.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferOptions {
    /// User threshold override; values outside (0, 1) are ignored.
    pub threshold: Option<f64>,
    /// Logistic-curve midpoint override.
    pub rho: Option<u32>,
    /// Documentation-only mode: emit disabled code specs.
    pub disable_code: bool,
}

/// Per-function inferred specification across the four evidence kinds.
#[derive(Debug, Clone, Default)]
pub struct Specification {
    /// The acceptance threshold the specs were inferred under.
    pub threshold: f64,
    /// Total number of traces backing the specs.
    pub traces: u64,
    /// Return-value sub-specification.
    pub ret: RetSpec,
    /// Pre-call argument sub-specification.
    pub arg_pre: ArgSpec,
    /// Post-call argument sub-specification.
    pub arg_post: ArgSpec,
    /// Neighboring-call sub-specification.
    pub causal: CausalSpec,
}

impl Specification {
    /// Human-readable dump, one sub-specification per line.
    pub fn display_lines(&self) -> Vec<String> {
        vec![
            format!("{:>8} threshold: {}, traces: {}", "info", self.threshold, self.traces),
            format!("{:>8} {:?}", "ret", self.ret),
            format!("{:>8} {:?}", "arg.pre", self.arg_pre),
            format!("{:>8} {:?}", "arg.post", self.arg_post),
            format!("{:>8} {:?}", "causal", self.causal),
        ]
    }
}

/// Infer the whole specification for one function's feature table.
pub fn infer(table: &FeatureTable, func_name: &str, opts: &InferOptions) -> Specification {
    let total = table.total_time();
    if total == 0 {
        return Specification::default();
    }
    let threshold = threshold(total, opts.threshold, opts.rho);

    let mut causal = CausalAnalyzer::default();
    let mut arg_pre = ArgPreAnalyzer::default();
    let mut arg_post = ArgPostAnalyzer::default();
    let mut ret = RetAnalyzer::default();
    for (i, record) in table.features.iter().enumerate() {
        let time = table.times[i];
        causal.update(record, time);
        arg_pre.update(record, time);
        arg_post.update(record, time);
        ret.update(func_name, record, time);
    }

    Specification {
        threshold,
        traces: total,
        causal: causal.finish(func_name, total, threshold, opts.disable_code),
        arg_post: arg_post.finish(total, threshold, opts.disable_code),
        ret: ret.finish(total, threshold, arg_pre.arg_num(), opts.disable_code),
        arg_pre: arg_pre.finish(total, threshold, opts.disable_code),
    }
}
