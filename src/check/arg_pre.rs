//! Pre-call argument checker.

use std::fmt::Write as _;

use crate::doc::DocArgs;
use crate::features::FeatureRecord;
use crate::keywords;
use crate::spec::ArgSpec;

use super::Verdict;

/// Replay one record's pre-call argument evidence against the inferred
/// spec.
///
/// Deallocator-style functions get a different rule: instead of demanding
/// checks, any stack-allocated argument is flagged as a potential
/// stack-lifetime bug.
pub fn check(
    func_name: &str,
    record: &FeatureRecord,
    spec: &ArgSpec,
    doc: Option<&DocArgs>,
) -> Verdict {
    let Some(pre) = &record.arg_pre else {
        return Verdict::Conforming;
    };
    let need = &spec.args_need_to_check;
    if pre.arg_num != need.len() || pre.feature.len() < pre.arg_num {
        // Variadic or inconsistent record; nothing to match against.
        return Verdict::Conforming;
    }

    let mut alarm = String::new();
    if !keywords::is_post(func_name) {
        for (i, slot) in pre.feature.iter().take(pre.arg_num).enumerate() {
            let doc_need = doc.is_some_and(|d| d.pre.get(i).copied().unwrap_or(false));
            if (need[i].0 || doc_need)
                && !slot.check.checked
                && !slot.is_global
                && !slot.is_constant
            {
                let _ = write!(alarm, "violate the most-frequent check for arg.{i}.pre. ");
            }
        }
    } else {
        for (i, slot) in pre.feature.iter().take(pre.arg_num).enumerate() {
            if slot.is_alloca {
                let _ = write!(alarm, "Potential: arg {i} is on stack and dealloced. ");
            }
        }
    }
    Verdict::from_alarm(alarm)
}
