//! Bug-report collation and writing.
//!
//! Findings accumulate per kind during detection; the writer merges them
//! per location (kinds in fixed order, locations in first-seen order),
//! deduplicates by feature fingerprint within a location, and renders the
//! report deterministically: two runs over the same inputs produce
//! byte-identical files.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use log::info;

use crate::error::{Error, Result};
use crate::features::CheckKind;

use super::{Finding, KindReports};

/// Merge the per-kind tables into a single per-location table.
pub fn resort(reports: &BTreeMap<CheckKind, KindReports>) -> IndexMap<String, Vec<Finding>> {
    let mut resorted: IndexMap<String, Vec<Finding>> = IndexMap::new();
    for kind_reports in reports.values() {
        for (loc, findings) in kind_reports {
            resorted
                .entry(loc.clone())
                .or_default()
                .extend(findings.iter().cloned());
        }
    }
    resorted
}

/// Render the report text.
pub fn render(resorted: &IndexMap<String, Vec<Finding>>, only_report_locations: bool) -> String {
    let mut out = String::new();
    for (loc, findings) in resorted {
        if findings.is_empty() {
            continue;
        }
        if only_report_locations {
            let mut line = format!("{}: {}, TYPE:", findings[0].func_name, loc);
            let mut kinds: Vec<CheckKind> = Vec::new();
            for finding in findings {
                if !kinds.contains(&finding.kind) {
                    let _ = write!(line, " {}", finding.kind);
                    kinds.push(finding.kind);
                }
            }
            out.push_str(&line);
            out.push('\n');
            continue;
        }
        let _ = writeln!(out, "{}:", findings[0].func_name);
        let _ = writeln!(out, "\tLocation:{loc}");
        let mut reported: Vec<&str> = Vec::new();
        for finding in findings {
            if reported.contains(&finding.feature.as_str()) {
                continue;
            }
            reported.push(&finding.feature);
            let _ = writeln!(
                out,
                "\tTYPE: {}. feature: {}",
                finding.kind, finding.feature
            );
            let _ = writeln!(out, "\tViolation: {}", finding.alarm_text);
            if findings.len() > 1 {
                out.push('\n');
            }
        }
    }
    out
}

/// Write the report file and log the total.
pub fn write(
    path: &Path,
    reports: &BTreeMap<CheckKind, KindReports>,
    only_report_locations: bool,
) -> Result<usize> {
    let resorted = resort(reports);
    let rendered = render(&resorted, only_report_locations);
    std::fs::write(path, rendered)
        .map_err(|err| Error::Reporting(format!("can not write {}: {err}", path.display())))?;
    info!("Total reports: {}", resorted.len());
    Ok(resorted.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(kind: CheckKind, feature: &str, alarm: &str) -> Finding {
        Finding {
            func_name: "foo_new".to_string(),
            feature: feature.to_string(),
            frequency: 0.1,
            kind,
            alarm_text: alarm.to_string(),
            doc_sentences: None,
            doc_feature: None,
        }
    }

    fn one_report(kind: CheckKind, loc: &str, findings: Vec<Finding>) -> BTreeMap<CheckKind, KindReports> {
        let mut reports: BTreeMap<CheckKind, KindReports> = BTreeMap::new();
        let mut kind_reports = KindReports::new();
        kind_reports.insert(loc.to_string(), findings);
        reports.insert(kind, kind_reports);
        reports
    }

    #[test]
    fn full_blocks_carry_type_and_violation() {
        let reports = one_report(
            CheckKind::Retval,
            "a.c:42",
            vec![finding(CheckKind::Retval, "{}", "Lacking proper check. ")],
        );
        let text = render(&resort(&reports), false);
        assert!(text.contains("foo_new:"));
        assert!(text.contains("\tLocation:a.c:42"));
        assert!(text.contains("TYPE: retval. feature: {}"));
        assert!(text.contains("Violation: Lacking proper check. "));
    }

    #[test]
    fn locations_mode_is_one_line_per_location() {
        let reports = one_report(
            CheckKind::ArgPre,
            "b.c:7",
            vec![
                finding(CheckKind::ArgPre, "{a}", "x"),
                finding(CheckKind::ArgPre, "{b}", "y"),
            ],
        );
        let text = render(&resort(&reports), true);
        assert_eq!(text, "foo_new: b.c:7, TYPE: arg.pre\n");
    }

    #[test]
    fn duplicate_fingerprints_render_once() {
        let reports = one_report(
            CheckKind::Causality,
            "c.c:9",
            vec![
                finding(CheckKind::Causality, "{same}", "first"),
                finding(CheckKind::Causality, "{same}", "second"),
            ],
        );
        let text = render(&resort(&reports), false);
        assert_eq!(text.matches("{same}").count(), 1);
        assert!(text.contains("first"));
        assert!(!text.contains("second"));
    }

    #[test]
    fn kinds_merge_per_location_in_fixed_order() {
        let mut reports: BTreeMap<CheckKind, KindReports> = BTreeMap::new();
        let mut causality = KindReports::new();
        causality.insert(
            "d.c:1".to_string(),
            vec![finding(CheckKind::Causality, "{c}", "lack")],
        );
        reports.insert(CheckKind::Causality, causality);
        let mut retval = KindReports::new();
        retval.insert(
            "d.c:1".to_string(),
            vec![finding(CheckKind::Retval, "{r}", "miss")],
        );
        reports.insert(CheckKind::Retval, retval);

        let resorted = resort(&reports);
        let kinds: Vec<CheckKind> = resorted["d.c:1"].iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![CheckKind::Retval, CheckKind::Causality]);
    }
}
