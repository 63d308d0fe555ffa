//! Return-value checker.

use crate::doc::DocRet;
use crate::features::{CheckValKey, FeatureRecord};
use crate::spec::RetSpec;

use super::Verdict;

/// Replay one record's return-value evidence against the inferred spec.
pub fn check(
    func_name: &str,
    record: &FeatureRecord,
    spec: &RetSpec,
    doc: Option<&DocRet>,
) -> Verdict {
    let Some(ret) = &record.retval else {
        return Verdict::Conforming;
    };

    let mut need_check = false;
    if spec.no_need_to_check_if_same_in_post {
        let same_in_post = record
            .causality
            .as_ref()
            .is_some_and(|c| c.post_call.contains_key(func_name));
        if same_in_post {
            // The call consumes its own handle; there is nothing left for
            // the caller to check.
            return Verdict::Silent;
        }
        if spec.no_same_in_post_need_to_check {
            need_check = true;
        }
    }

    let checked = ret.check.checked || ret.check.indir_checked;
    let doc_need = doc.is_some_and(|d| !d.value.is_empty());
    if !(need_check || spec.need_to_check || doc_need) {
        return Verdict::Conforming;
    }

    if !checked {
        if ret.ctx.returned {
            // The unchecked value travels up; responsibility goes with it.
            return Verdict::Silent;
        }
        if ret.ctx.derefed_read || ret.ctx.derefed_write {
            return Verdict::Violation(
                "Dereferenced read/write the return value without check. ".to_string(),
            );
        }
        return Verdict::Violation("Lacking proper check for the return value. ".to_string());
    }

    // The value was compared; with no legitimate keys on record there is
    // nothing to vet the comparison against.
    if spec.valid_chkvals.is_empty() {
        return Verdict::Conforming;
    }
    if let Some(key) = CheckValKey::from_check(&ret.check) {
        let in_doc = key
            .as_const()
            .is_some_and(|v| doc.is_some_and(|d| d.value.contains(&v)));
        if !spec.valid_chkvals.contains_key(&key) && !in_doc {
            return Verdict::Violation(
                "The check condition for the return value is potential wrong. ".to_string(),
            );
        }
    }
    Verdict::Conforming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        CausalityFeature, CheckCond, CoUse, RetContext, RetvalFeature, ValueCheck,
    };
    use std::collections::BTreeMap;

    fn spec_with_key(key: CheckValKey) -> RetSpec {
        let mut valid_chkvals = BTreeMap::new();
        valid_chkvals.insert(key, 1.0);
        RetSpec {
            need_to_check: true,
            score: 1.0,
            valid_chkvals,
            ..RetSpec::default()
        }
    }

    fn record(check: ValueCheck, ctx: RetContext) -> FeatureRecord {
        FeatureRecord {
            retval: Some(RetvalFeature { check, ctx }),
            ..FeatureRecord::default()
        }
    }

    #[test]
    fn unchecked_deref_is_the_severe_alarm() {
        let verdict = check(
            "foo_new",
            &record(
                ValueCheck::default(),
                RetContext {
                    derefed_read: true,
                    ..RetContext::default()
                },
            ),
            &spec_with_key(CheckValKey::Halves(0)),
            None,
        );
        assert_eq!(
            verdict,
            Verdict::Violation(
                "Dereferenced read/write the return value without check. ".to_string()
            )
        );
    }

    #[test]
    fn propagated_return_is_silent() {
        let verdict = check(
            "foo_new",
            &record(
                ValueCheck::default(),
                RetContext {
                    returned: true,
                    ..RetContext::default()
                },
            ),
            &spec_with_key(CheckValKey::Halves(0)),
            None,
        );
        assert_eq!(verdict, Verdict::Silent);
    }

    #[test]
    fn unusual_check_value_is_flagged() {
        let odd_check = ValueCheck {
            checked: true,
            check_cond: Some(CheckCond::Eq),
            compared_with_const: 7,
            ..ValueCheck::default()
        };
        let verdict = check(
            "foo_new",
            &record(odd_check, RetContext::default()),
            &spec_with_key(CheckValKey::Halves(0)),
            None,
        );
        assert!(matches!(verdict, Verdict::Violation(text)
            if text.contains("potential wrong")));
    }

    #[test]
    fn doc_values_excuse_unusual_checks() {
        let odd_check = ValueCheck {
            checked: true,
            check_cond: Some(CheckCond::Eq),
            compared_with_const: 7,
            ..ValueCheck::default()
        };
        let doc = DocRet {
            value: vec![7],
            cond: vec!["fail".to_string()],
        };
        let verdict = check(
            "foo_new",
            &record(odd_check, RetContext::default()),
            &spec_with_key(CheckValKey::Halves(0)),
            Some(&doc),
        );
        assert_eq!(verdict, Verdict::Conforming);
    }

    #[test]
    fn self_in_post_call_is_tolerated() {
        let mut post_call = BTreeMap::new();
        post_call.insert("h_lock".to_string(), CoUse::default());
        let record = FeatureRecord {
            retval: Some(RetvalFeature::default()),
            causality: Some(CausalityFeature {
                post_call,
                ..CausalityFeature::default()
            }),
            ..FeatureRecord::default()
        };
        let spec = RetSpec {
            need_to_check: true,
            no_need_to_check_if_same_in_post: true,
            ..RetSpec::default()
        };
        assert_eq!(check("h_lock", &record, &spec, None), Verdict::Silent);
    }

    #[test]
    fn empty_check_value_table_accepts_any_comparison() {
        // Doc-only mode infers no legitimate keys at all; a checked trace
        // conforms no matter what it compared against.
        let doc = DocRet {
            value: vec![0],
            cond: vec!["fail".to_string()],
        };
        let odd_check = ValueCheck {
            checked: true,
            check_cond: Some(CheckCond::Eq),
            compared_with_const: 7,
            ..ValueCheck::default()
        };
        let verdict = check(
            "foo_new",
            &record(odd_check, RetContext::default()),
            &RetSpec::default(),
            Some(&doc),
        );
        assert_eq!(verdict, Verdict::Conforming);

        // Unchecked traces are still held to the doc's need-to-check.
        let verdict = check(
            "foo_new",
            &record(ValueCheck::default(), RetContext::default()),
            &RetSpec::default(),
            Some(&doc),
        );
        assert!(matches!(verdict, Verdict::Violation(text)
            if text.contains("Lacking proper check")));
    }

    #[test]
    fn no_requirement_means_conforming() {
        let verdict = check(
            "foo",
            &record(ValueCheck::default(), RetContext::default()),
            &RetSpec::default(),
            None,
        );
        assert_eq!(verdict, Verdict::Conforming);
    }
}
