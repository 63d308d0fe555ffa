//! End-to-end detection scenarios over on-disk trace corpora.

mod common;

use common::{arg_pre, causality_post, retval_checked, retval_unchecked, TestCorpus};
use misuse_rs::detect::report;
use misuse_rs::doc::{DocFeature, DocRet, DocStore};
use misuse_rs::{corpus, DetectConfig, Detector};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

/// Run the full pipeline over a corpus and render the report.
fn run_detection(test_corpus: &TestCorpus, doc: Option<DocStore>) -> String {
    let traces = corpus::feature_files(&test_corpus.feature_dir(), None).unwrap();
    let mut detector = Detector::new(DetectConfig::default(), doc);
    detector.run(&traces);
    let reports = detector.into_reports();
    report::render(&report::resort(&reports), false)
}

#[test]
fn missing_null_check_after_allocator() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("foo_new", 9, "x.c", |loc| retval_checked(loc, "eq", 0));
    test_corpus.add_trace("foo_new", retval_unchecked("a.c:42", true));

    let text = run_detection(&test_corpus, None);
    assert!(text.contains("foo_new:"), "report:\n{text}");
    assert!(text.contains("\tLocation:a.c:42"));
    assert!(text.contains("TYPE: retval"));
    assert!(text.contains("Dereferenced read/write the return value without check."));
    // The nine conforming call sites stay silent.
    assert_eq!(text.matches("Location:").count(), 1);
}

#[test]
fn majority_pre_check_of_first_argument() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("parse_hdr", 8, "ok.c", |loc| arg_pre(loc, true));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));

    let text = run_detection(&test_corpus, None);
    assert!(text.contains("\tLocation:b.c:7"));
    assert!(text.contains("TYPE: arg.pre"));
    assert!(text.contains("violate the most-frequent check for arg.0.pre."));
}

#[test]
fn conforming_trace_tolerates_the_location() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("parse_hdr", 8, "ok.c", |loc| arg_pre(loc, true));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));
    // One checked trace at the same location retracts the alarms above.
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", true));

    let text = run_detection(&test_corpus, None);
    assert!(!text.contains("b.c:7"), "report:\n{text}");
}

#[test]
fn missing_release_call() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("open_x", 9, "k.c", |loc| causality_post(loc, &["close_x"]));
    test_corpus.add_trace("open_x", causality_post("c.c:99", &[]));

    let text = run_detection(&test_corpus, None);
    assert!(text.contains("\tLocation:c.c:99"));
    assert!(text.contains("TYPE: causality"));
    assert!(text.contains("Lack post.call: close_x."));
    assert_eq!(text.matches("Location:").count(), 1);
}

#[test]
fn duplicated_release_call() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_trace("free_x", causality_post("d.c:5", &["free_x"]));

    let text = run_detection(&test_corpus, None);
    assert!(text.contains("\tLocation:d.c:5"));
    assert!(text.contains("Potential: duplicated call of free_x in post.call."));
}

#[test]
fn doc_evidence_resolves_through_name_variants() {
    let test_corpus = TestCorpus::new();
    // Code evidence alone says nothing: no trace ever checks the return.
    test_corpus.add_trace("EVP_CIPHER_CTX_new2", retval_unchecked("e.c:10", false));
    test_corpus.add_trace("EVP_CIPHER_CTX_new2", retval_unchecked("e.c:11", false));

    // Documentation exists only under the digitless spelling.
    let mut features = BTreeMap::new();
    features.insert(
        "EVP_CIPHER_CTX_new".to_string(),
        DocFeature {
            ret: Some(DocRet {
                value: vec![0],
                cond: vec!["fail".to_string()],
            }),
            args: None,
            causality: None,
        },
    );
    let doc = DocStore::from_features(features);

    let text = run_detection(&test_corpus, Some(doc));
    assert!(text.contains("Lacking proper check for the return value."));
    assert!(text.contains("\tLocation:e.c:10"));
    assert!(text.contains("\tLocation:e.c:11"));
}

#[test]
fn reports_are_deterministic() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("foo_new", 9, "x.c", |loc| retval_checked(loc, "eq", 0));
    test_corpus.add_trace("foo_new", retval_unchecked("a.c:42", true));
    test_corpus.add_traces_at("open_x", 9, "k.c", |loc| causality_post(loc, &["close_x"]));
    test_corpus.add_trace("open_x", causality_post("c.c:99", &[]));

    let first = run_detection(&test_corpus, None);
    let second = run_detection(&test_corpus, None);
    assert_eq!(first, second);
}

#[test]
fn majority_conforming_traces_never_add_alarms() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("parse_hdr", 8, "ok.c", |loc| arg_pre(loc, true));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));
    test_corpus.add_trace("parse_hdr", arg_pre("b.c:7", false));
    let before = run_detection(&test_corpus, None);

    // One more trace matching the majority, at a fresh location.
    test_corpus.add_trace("parse_hdr", arg_pre("ok.c:99", true));
    let after = run_detection(&test_corpus, None);

    assert_eq!(
        before.matches("Violation:").count(),
        after.matches("Violation:").count()
    );
}

#[test]
fn locations_only_mode_is_one_line_per_site() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("foo_new", 9, "x.c", |loc| retval_checked(loc, "eq", 0));
    test_corpus.add_trace("foo_new", retval_unchecked("a.c:42", true));

    let traces = corpus::feature_files(&test_corpus.feature_dir(), None).unwrap();
    let mut detector = Detector::new(DetectConfig::default(), None);
    detector.run(&traces);
    let reports = detector.into_reports();
    let text = report::render(&report::resort(&reports), true);
    assert_eq!(text, "foo_new: a.c:42, TYPE: retval\n");
}

#[test]
fn variadic_functions_only_keep_the_retval_check() {
    let test_corpus = TestCorpus::new();
    // An unchecked argument corpus that would normally alarm.
    test_corpus.add_traces_at("printf_wrap", 8, "ok.c", |loc| arg_pre(loc, true));
    test_corpus.add_trace("printf_wrap", arg_pre("v.c:1", false));
    test_corpus.add_trace("printf_wrap", arg_pre("v.c:1", false));

    let text = run_detection(&test_corpus, None);
    assert!(text.is_empty(), "report:\n{text}");
}

#[test]
fn corrupt_and_unlocated_traces_are_skipped() {
    let test_corpus = TestCorpus::new();
    test_corpus.add_traces_at("foo_new", 9, "x.c", |loc| retval_checked(loc, "eq", 0));
    test_corpus.add_trace("foo_new", retval_unchecked("a.c:42", true));
    // Unparsable and location-less files must not derail the run.
    test_corpus.add_trace("foo_new", serde_json::json!({ "loc": "" }));
    let dir = test_corpus.feature_dir().join("foo_new");
    std::fs::write(dir.join("broken.fea.json"), "{not json").unwrap();

    let text = run_detection(&test_corpus, None);
    assert!(text.contains("Dereferenced read/write the return value without check."));
}
