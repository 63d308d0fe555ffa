//! Post-call argument checker.

use std::fmt::Write as _;

use crate::doc::DocArgs;
use crate::features::FeatureRecord;
use crate::spec::ArgSpec;

use super::Verdict;

/// Replay one record's post-call argument evidence against the inferred
/// spec.
///
/// Arguments that are constants or globals carry no caller-owned state and
/// are skipped; an argument that is returned escapes to the caller's
/// caller together with the responsibility to check it.
pub fn check(record: &FeatureRecord, spec: &ArgSpec, doc: Option<&DocArgs>) -> Verdict {
    let Some(post) = &record.arg_post else {
        return Verdict::Conforming;
    };

    let mut alarm = String::new();
    for (i, slot) in post.feature.iter().take(post.arg_num).enumerate() {
        if constant_or_global(record, i) {
            continue;
        }
        if slot.returned {
            continue;
        }
        let need_check = spec
            .args_need_to_check
            .get(i)
            .is_some_and(|(need, _)| *need);
        let doc_need = doc.is_some_and(|d| d.post.get(i).copied().unwrap_or(false));
        if (need_check || doc_need) && !slot.used_in_check {
            if slot.derefed_read || slot.derefed_write {
                let _ = write!(alarm, "Dereferenced without check of arg.{i}.post");
            } else {
                let _ = write!(alarm, "Potential lack check for arg.{i}.post");
            }
        }
    }
    Verdict::from_alarm(alarm)
}

fn constant_or_global(record: &FeatureRecord, index: usize) -> bool {
    record
        .arg_pre
        .as_ref()
        .and_then(|pre| pre.feature.get(index))
        .is_some_and(|slot| slot.is_constant || slot.is_global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ArgPostFeature, ArgPostSlot, ArgPreFeature, ArgPreSlot};

    fn spec(needs: &[bool]) -> ArgSpec {
        ArgSpec {
            args_need_to_check: needs.iter().map(|&n| (n, Some(0.9))).collect(),
        }
    }

    fn record_with(slots: Vec<ArgPostSlot>) -> FeatureRecord {
        FeatureRecord {
            arg_post: Some(ArgPostFeature {
                arg_num: slots.len(),
                feature: slots,
            }),
            ..FeatureRecord::default()
        }
    }

    #[test]
    fn unchecked_deref_is_flagged() {
        let record = record_with(vec![ArgPostSlot {
            derefed_read: true,
            ..ArgPostSlot::default()
        }]);
        let verdict = check(&record, &spec(&[true]), None);
        assert_eq!(
            verdict,
            Verdict::Violation("Dereferenced without check of arg.0.post".to_string())
        );
    }

    #[test]
    fn plain_missing_check_is_the_mild_alarm() {
        let record = record_with(vec![ArgPostSlot::default()]);
        let verdict = check(&record, &spec(&[true]), None);
        assert_eq!(
            verdict,
            Verdict::Violation("Potential lack check for arg.0.post".to_string())
        );
    }

    #[test]
    fn returned_argument_escapes_responsibility() {
        let record = record_with(vec![ArgPostSlot {
            returned: true,
            derefed_read: true,
            ..ArgPostSlot::default()
        }]);
        assert_eq!(check(&record, &spec(&[true]), None), Verdict::Conforming);
    }

    #[test]
    fn constants_and_globals_are_skipped() {
        let mut record = record_with(vec![ArgPostSlot {
            derefed_write: true,
            ..ArgPostSlot::default()
        }]);
        record.arg_pre = Some(ArgPreFeature {
            arg_num: 1,
            feature: vec![ArgPreSlot {
                is_constant: true,
                ..ArgPreSlot::default()
            }],
        });
        assert_eq!(check(&record, &spec(&[true]), None), Verdict::Conforming);
    }

    #[test]
    fn checked_argument_conforms() {
        let record = record_with(vec![ArgPostSlot {
            used_in_check: true,
            derefed_read: true,
            ..ArgPostSlot::default()
        }]);
        assert_eq!(check(&record, &spec(&[true]), None), Verdict::Conforming);
    }
}
