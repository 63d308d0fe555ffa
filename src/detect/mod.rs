//! Detection orchestrator.
//!
//! Drives the two-stage pipeline per function: fold the trace features,
//! infer the specification, replay every record through the configured
//! checkers, and collect findings into the process-wide bug-report table.
//! Features and specification for one function are dropped before the next
//! begins.

pub mod report;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use indexmap::IndexMap;
use log::info;

use crate::check::{self, Verdict};
use crate::config::DetectConfig;
use crate::doc::DocStore;
use crate::features::{CheckKind, FeatureRecord, FeatureTable};
use crate::keywords;
use crate::spec::{self, InferOptions, Specification};

/// Kinds for which one conforming trace at a location erases alarms of the
/// same kind at that location.
pub const TOLERABLE_KINDS: &[CheckKind] = &[CheckKind::Retval, CheckKind::ArgPre];

/// A single finding attached to a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    /// Target function name.
    pub func_name: String,
    /// Fingerprint of the offending record's section.
    pub feature: String,
    /// Share of the function's traces showing this record.
    pub frequency: f64,
    /// Evidence kind that produced the finding.
    pub kind: CheckKind,
    /// Human-readable violation text.
    pub alarm_text: String,
    /// Supporting documentation sentences, when doc evidence fired.
    pub doc_sentences: Option<String>,
    /// Documentation feature behind the finding, when doc evidence fired.
    pub doc_feature: Option<String>,
}

/// Per-kind report table: location to findings, in first-seen order.
pub type KindReports = IndexMap<String, Vec<Finding>>;

/// The detection engine. One instance accumulates reports across all
/// functions of a run.
pub struct Detector {
    config: DetectConfig,
    doc: Option<DocStore>,
    check_kinds: Vec<CheckKind>,
    reports: BTreeMap<CheckKind, KindReports>,
    toleration: BTreeMap<CheckKind, HashSet<String>>,
}

impl Detector {
    /// Create a detector; `doc` supplies secondary evidence when present.
    pub fn new(config: DetectConfig, doc: Option<DocStore>) -> Self {
        let check_kinds = match config.check_kind {
            Some(kind) => vec![kind],
            None => CheckKind::ALL.to_vec(),
        };
        let reports = CheckKind::ALL
            .iter()
            .map(|kind| (*kind, KindReports::new()))
            .collect();
        Self {
            config,
            doc,
            check_kinds,
            reports,
            toleration: BTreeMap::new(),
        }
    }

    /// Run detection over a `{func_name -> trace files}` corpus.
    pub fn run(&mut self, corpus: &IndexMap<String, Vec<PathBuf>>) {
        for (func_name, paths) in corpus {
            self.detect_function(func_name, paths);
        }
    }

    /// Fold, infer and check one function, then drop its state.
    pub fn detect_function(&mut self, func_name: &str, paths: &[PathBuf]) {
        info!("Processing {func_name}");
        self.reset_toleration();
        let table = FeatureTable::load(paths, self.config.remove_dup);
        let opts = InferOptions {
            threshold: self.config.threshold,
            rho: self.config.rho,
            disable_code: self.config.disable_code,
        };
        let specification = spec::infer(&table, func_name, &opts);
        if self.config.display_spec {
            println!("## specifications inferred from code ##");
            for line in specification.display_lines() {
                println!("{line}");
            }
            if let Some(doc) = self.doc.as_ref().and_then(|d| d.get(func_name)) {
                println!("## specifications inferred from doc ##");
                println!("{doc:?}");
            }
        }
        self.check_function(func_name, &table, &specification);
    }

    /// Consume the detector, yielding the accumulated report table.
    pub fn into_reports(self) -> BTreeMap<CheckKind, KindReports> {
        self.reports
    }

    fn reset_toleration(&mut self) {
        self.toleration.clear();
        for kind in TOLERABLE_KINDS {
            self.toleration.insert(*kind, HashSet::new());
        }
    }

    fn check_function(
        &mut self,
        func_name: &str,
        table: &FeatureTable,
        specification: &Specification,
    ) {
        let total = table.total_time();
        if total == 0 {
            return;
        }
        let variadic = keywords::is_variadic(func_name);
        let kinds = self.check_kinds.clone();
        for i in 0..table.len() {
            let locs = &table.locs[i];
            if locs.is_empty() {
                continue;
            }
            let record = &table.features[i];
            let frequency = spec::round3(table.times[i] as f64 / total as f64);
            for kind in &kinds {
                if !record.has_section(*kind) {
                    continue;
                }
                // Variadic functions keep only the return-value check; the
                // extractor cannot attribute their arguments reliably.
                if variadic && *kind != CheckKind::Retval {
                    continue;
                }
                let verdict = self.dispatch(*kind, func_name, record, specification);
                self.apply(*kind, func_name, record, frequency, locs, verdict);
            }
        }
    }

    fn dispatch(
        &self,
        kind: CheckKind,
        func_name: &str,
        record: &FeatureRecord,
        specification: &Specification,
    ) -> Verdict {
        let doc = self.doc.as_ref().and_then(|d| d.get(func_name));
        match kind {
            CheckKind::Retval => check::retval::check(
                func_name,
                record,
                &specification.ret,
                doc.and_then(|d| d.ret.as_ref()),
            ),
            CheckKind::ArgPre => check::arg_pre::check(
                func_name,
                record,
                &specification.arg_pre,
                doc.and_then(|d| d.args.as_ref()),
            ),
            CheckKind::ArgPost => check::arg_post::check(
                record,
                &specification.arg_post,
                doc.and_then(|d| d.args.as_ref()),
            ),
            CheckKind::Causality => {
                check::causality::check(func_name, record, &specification.causal, doc)
            }
        }
    }

    fn apply(
        &mut self,
        kind: CheckKind,
        func_name: &str,
        record: &FeatureRecord,
        frequency: f64,
        locs: &[String],
        verdict: Verdict,
    ) {
        let tolerable = TOLERABLE_KINDS.contains(&kind);
        match verdict {
            Verdict::Violation(alarm_text) => {
                let finding = Finding {
                    func_name: func_name.to_string(),
                    feature: record.section_fingerprint(kind),
                    frequency,
                    kind,
                    alarm_text,
                    doc_sentences: None,
                    doc_feature: None,
                };
                let Some(kind_reports) = self.reports.get_mut(&kind) else {
                    return;
                };
                for loc in locs {
                    if tolerable
                        && self
                            .toleration
                            .get(&kind)
                            .is_some_and(|locs| locs.contains(loc))
                    {
                        continue;
                    }
                    let entries = kind_reports.entry(loc.clone()).or_default();
                    if !entries.contains(&finding) {
                        entries.push(finding.clone());
                    }
                }
            }
            Verdict::Conforming => {
                if tolerable {
                    for loc in locs {
                        if let Some(tolerated) = self.toleration.get_mut(&kind) {
                            tolerated.insert(loc.clone());
                        }
                        // One conforming trace erases earlier alarms of
                        // this kind at the same location.
                        if let Some(kind_reports) = self.reports.get_mut(&kind) {
                            kind_reports.shift_remove(loc);
                        }
                    }
                }
            }
            Verdict::Silent => {}
        }
    }
}
