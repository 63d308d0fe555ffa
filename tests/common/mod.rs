//! Common test utilities and helpers for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A temporary on-disk trace corpus laid out the way the extractor writes
/// it: `<features>/<func_name>/<id>.fea.json`.
pub struct TestCorpus {
    pub temp_dir: TempDir,
    counter: Cell<usize>,
}

impl TestCorpus {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            counter: Cell::new(0),
        }
    }

    pub fn feature_dir(&self) -> PathBuf {
        self.temp_dir.path().join("features")
    }

    pub fn outdir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Write one trace file for `func`. The record must carry its `loc`.
    pub fn add_trace(&self, func: &str, record: Value) {
        let dir = self.feature_dir().join(func);
        fs::create_dir_all(&dir).unwrap();
        let id = self.counter.get();
        self.counter.set(id + 1);
        fs::write(dir.join(format!("{id:04}.fea.json")), record.to_string()).unwrap();
    }

    /// Write `n` records of the same shape at distinct locations.
    pub fn add_traces_at<F>(&self, func: &str, n: usize, prefix: &str, build: F)
    where
        F: Fn(&str) -> Value,
    {
        for i in 0..n {
            let loc = format!("{prefix}:{i}");
            self.add_trace(func, build(&loc));
        }
    }
}

/// A record whose return value is compared against a constant.
pub fn retval_checked(loc: &str, cond: &str, constant: i64) -> Value {
    json!({
        "loc": loc,
        "retval": {
            "check": {
                "checked": true,
                "indir_checked": false,
                "check_cond": cond,
                "compared_with_const": constant,
                "compared_with_non_const": false
            },
            "ctx": {}
        }
    })
}

/// A record whose return value goes unchecked, optionally dereferenced.
pub fn retval_unchecked(loc: &str, derefed: bool) -> Value {
    json!({
        "loc": loc,
        "retval": {
            "check": { "checked": false, "indir_checked": false },
            "ctx": { "derefed_read": derefed }
        }
    })
}

/// A single-argument pre-call record.
pub fn arg_pre(loc: &str, checked: bool) -> Value {
    json!({
        "loc": loc,
        "arg.pre": {
            "arg_num": 1,
            "feature": [{
                "check": { "checked": checked },
                "is_alloca": false,
                "is_global": false,
                "is_constant": false
            }]
        }
    })
}

/// A causality record listing trailing calls by name.
pub fn causality_post(loc: &str, post: &[&str]) -> Value {
    let post_call: serde_json::Map<String, Value> = post
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!({ "used_as_arg": true, "share_argument": false }),
            )
        })
        .collect();
    json!({
        "loc": loc,
        "causality": { "pre.call": {}, "post.call": post_call }
    })
}
