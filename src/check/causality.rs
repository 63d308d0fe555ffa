//! Neighboring-call (causality) checker.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::doc::DocFeature;
use crate::features::{CheckCond, CoUse, FeatureRecord};
use crate::keywords;
use crate::spec::{check_cond_key, CausalSpec};

use super::Verdict;

/// Which side of the target a neighbor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Pre,
    Post,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre.call",
            Self::Post => "post.call",
        }
    }
}

/// Replay one record's neighboring-call evidence against the inferred
/// spec.
pub fn check(
    target: &str,
    record: &FeatureRecord,
    spec: &CausalSpec,
    doc: Option<&DocFeature>,
) -> Verdict {
    let Some(causal) = &record.causality else {
        return Verdict::Conforming;
    };
    let doc_causal = doc.and_then(|d| d.causality.as_ref());
    let doc_pre: &[String] = doc_causal.map_or(&[], |c| c.pre.as_slice());
    let doc_post: &[String] = doc_causal.map_or(&[], |c| c.post.as_slice());

    let mut alarm = String::new();

    // Preceding calls only make sense for functions that come second in a
    // pairing; allocator-style targets are somebody else's predecessor.
    if keywords::is_subsequent(target) {
        let required: Vec<RequiredNeighbor<'_>> = spec
            .pre_functions
            .iter()
            .map(|(name, score)| RequiredNeighbor {
                name,
                score: *score,
                conds: None,
            })
            .collect();
        alarm.push_str(&check_direction(
            target,
            &causal.pre_call,
            Direction::Pre,
            &required,
            doc_pre,
            None,
        ));
    }

    // When documentation shows the return value discriminates success from
    // failure and this trace sits on the failure branch, trailing-call
    // obligations do not apply.
    if !is_error_handling(record, doc) {
        if !keywords::is_post(target) && ret_is_used(record) {
            let cond = check_cond_key(record);
            let required: Vec<RequiredNeighbor<'_>> = spec
                .post_functions
                .iter()
                .map(|(name, neighbor)| RequiredNeighbor {
                    name,
                    score: neighbor.score,
                    conds: Some(&neighbor.conds),
                })
                .collect();
            alarm.push_str(&check_direction(
                target,
                &causal.post_call,
                Direction::Post,
                &required,
                doc_post,
                Some(&cond),
            ));
        } else if causal.post_call.len() == 1
            && keywords::is_post(target)
            && causal.post_call.contains_key(target)
            && !causal.pre_call.contains_key(target)
        {
            alarm.push_str(&format!(
                "Potential: duplicated call of {target} in post.call. "
            ));
        }
    }
    Verdict::from_alarm(alarm)
}

struct RequiredNeighbor<'a> {
    name: &'a str,
    score: f64,
    conds: Option<&'a BTreeMap<String, f64>>,
}

fn check_direction(
    target: &str,
    observed: &BTreeMap<String, CoUse>,
    direction: Direction,
    required: &[RequiredNeighbor<'_>],
    doc_required: &[String],
    cond: Option<&str>,
) -> String {
    if ignore_direction(target, direction, observed) {
        return String::new();
    }
    let mut alarm = String::new();
    for neighbor in required {
        if neighbor.score == 1.0 {
            continue;
        }
        if let (Some(cond), Some(conds)) = (cond, neighbor.conds) {
            if !conds.is_empty() && !conds.contains_key(cond) {
                continue;
            }
        }
        // Direct variants: the required name may appear embedded in a
        // longer observed name.
        let mut wanted = neighbor.name;
        for name in observed.keys() {
            if name.contains(neighbor.name) {
                wanted = name.as_str();
                break;
            }
        }
        if !observed.contains_key(wanted) {
            let _ = write!(alarm, "Lack {}: {}. ", direction.as_str(), wanted);
        }
        // With many required neighbors, only report against the
        // most-frequent one.
        if required.len() > 2 {
            break;
        }
    }
    if alarm.is_empty() && !doc_required.is_empty() {
        let present = doc_required.iter().any(|name| observed.contains_key(name));
        if !present {
            let _ = write!(
                alarm,
                "Lack one of them in {}: {:?}. (by documents spec.) ",
                direction.as_str(),
                doc_required
            );
        }
    }
    alarm
}

/// Skip a whole direction when an observed neighbor already belongs to the
/// target's own family: a matching keyword class plus a shared prefix.
fn ignore_direction(
    target: &str,
    direction: Direction,
    observed: &BTreeMap<String, CoUse>,
) -> bool {
    observed.keys().any(|name| {
        let related = match direction {
            Direction::Pre => keywords::is_pre(name),
            Direction::Post => keywords::is_post(name),
        };
        related && has_same_prefix(target, name, direction)
    })
}

/// Family test between the target and one observed neighbor.
///
/// The split point is the last underscore of the target, or, without one,
/// the first suffix that stops carrying the direction's keyword class. The
/// names are family when their suffix classes agree or their prefixes
/// match verbatim.
fn has_same_prefix(target: &str, neighbor: &str, direction: Direction) -> bool {
    let length = target.len();
    let (target_class, neighbor_class): (fn(&str) -> bool, fn(&str) -> bool) = match direction {
        Direction::Post => (keywords::is_pre_seq, keywords::is_post),
        Direction::Pre => (keywords::is_subsequent, keywords::is_pre),
    };
    let idx = match target.rfind('_') {
        Some(i) => i,
        None => {
            let mut idx = 0;
            for i in 0..length {
                idx = i;
                if !target_class(target.get(i..).unwrap_or("")) {
                    break;
                }
            }
            idx
        }
    };
    if idx < length {
        let target_suffix = target.get(idx..).unwrap_or("");
        let neighbor_suffix = neighbor.get(idx..).unwrap_or("");
        if target_class(target_suffix) == neighbor_class(neighbor_suffix)
            || (idx > 0 && target.get(..idx) == neighbor.get(..idx))
        {
            return true;
        }
    }
    false
}

/// The returned value leaves the calling frame.
fn value_escapes(record: &FeatureRecord) -> bool {
    record
        .retval
        .as_ref()
        .is_some_and(|r| r.ctx.indir_returned || r.ctx.returned || r.ctx.stored_not_local)
}

/// The caller actually consumes the return value locally. A function
/// without a return-value section counts as used so that trailing-call
/// obligations still apply to it.
fn ret_is_used(record: &FeatureRecord) -> bool {
    if value_escapes(record) {
        return false;
    }
    match &record.retval {
        Some(r) => {
            r.check.checked
                || r.check.indir_checked
                || r.ctx.derefed_read
                || r.ctx.derefed_write
                || r.ctx.used_in_bin
                || r.ctx.used_in_call
        }
        None => true,
    }
}

/// Documentation says the return discriminates success from failure, and
/// this trace's comparison selects the failure branch.
fn is_error_handling(record: &FeatureRecord, doc: Option<&DocFeature>) -> bool {
    let Some(doc_ret) = doc.and_then(|d| d.ret.as_ref()) else {
        return false;
    };
    if !doc_ret
        .cond
        .iter()
        .any(|c| c == "success" || c == "fail")
    {
        return false;
    }
    let Some(ret) = &record.retval else {
        return false;
    };
    let check = &ret.check;
    if !check.checked || check.compared_with_non_const || check.indir_checked {
        return false;
    }
    let Some(idx) = doc_ret
        .value
        .iter()
        .position(|v| *v == check.compared_with_const)
    else {
        return false;
    };
    let Some(cond) = doc_ret.cond.get(idx) else {
        return false;
    };
    (cond == "success"
        && matches!(
            check.check_cond,
            Some(CheckCond::Ne) | Some(CheckCond::Lt) | Some(CheckCond::Gt)
        ))
        || (cond == "fail"
            && matches!(
                check.check_cond,
                Some(CheckCond::Eq) | Some(CheckCond::Le) | Some(CheckCond::Ge)
            ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CausalityFeature;
    use crate::spec::PostNeighbor;
    use indexmap::IndexMap;

    fn causal_record(pre: &[&str], post: &[&str]) -> FeatureRecord {
        let build = |names: &[&str]| {
            names
                .iter()
                .map(|n| (n.to_string(), CoUse::default()))
                .collect::<BTreeMap<_, _>>()
        };
        FeatureRecord {
            causality: Some(CausalityFeature {
                pre_call: build(pre),
                post_call: build(post),
            }),
            ..FeatureRecord::default()
        }
    }

    fn post_spec(name: &str, score: f64, conds: &[(&str, f64)]) -> CausalSpec {
        let mut post_functions = IndexMap::new();
        post_functions.insert(
            name.to_string(),
            PostNeighbor {
                score,
                conds: conds
                    .iter()
                    .map(|(c, s)| (c.to_string(), *s))
                    .collect(),
            },
        );
        CausalSpec {
            post_functions,
            ..CausalSpec::default()
        }
    }

    #[test]
    fn missing_required_post_neighbor_is_flagged() {
        let spec = post_spec("sock_close", 0.9, &[("default", 0.9)]);
        let record = causal_record(&[], &[]);
        let verdict = check("sock_open", &record, &spec, None);
        assert_eq!(
            verdict,
            Verdict::Violation("Lack post.call: sock_close. ".to_string())
        );
    }

    #[test]
    fn family_neighbor_suppresses_the_direction() {
        // sock_flush is required but absent; the observed family close
        // suppresses the whole direction.
        let spec = post_spec("sock_flush", 0.9, &[("default", 0.9)]);
        let record = causal_record(&[], &["sock_close"]);
        assert_eq!(check("sock_open", &record, &spec, None), Verdict::Conforming);
    }

    #[test]
    fn variant_names_count_as_present() {
        let spec = post_spec("ctx_teardown", 0.9, &[("default", 0.9)]);
        let record = causal_record(&[], &["my_ctx_teardown_v2"]);
        assert_eq!(
            check("pkt_decode", &record, &spec, None),
            Verdict::Conforming
        );
    }

    #[test]
    fn duplicate_deallocator_call_is_flagged() {
        let record = causal_record(&[], &["buf_free"]);
        let verdict = check("buf_free", &record, &CausalSpec::default(), None);
        assert_eq!(
            verdict,
            Verdict::Violation("Potential: duplicated call of buf_free in post.call. ".to_string())
        );
    }

    #[test]
    fn mismatched_check_condition_skips_the_neighbor() {
        use crate::features::{RetContext, RetvalFeature};
        let spec = post_spec("h_close", 0.9, &[("0_ne", 1.0)]);
        // This trace never checks the return, so the 0_ne obligation does
        // not bind it.
        let mut record = causal_record(&[], &[]);
        record.retval = Some(RetvalFeature {
            ctx: RetContext {
                derefed_read: true,
                ..RetContext::default()
            },
            ..RetvalFeature::default()
        });
        assert_eq!(check("h_open2", &record, &spec, None), Verdict::Conforming);
    }

    #[test]
    fn unused_return_skips_post_obligations() {
        let spec = post_spec("h_close", 0.9, &[("default", 0.9)]);
        let mut record = causal_record(&[], &[]);
        // Present but entirely unused return value.
        record.retval = Some(crate::features::RetvalFeature::default());
        assert_eq!(check("h_openx", &record, &spec, None), Verdict::Conforming);
    }
}
