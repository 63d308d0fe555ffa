//! Filesystem layout shared with the external extractor.
//!
//! The extractor writes one feature file per trace under
//! `<feature-dir>/<func_name>/<id>.fea.json` and one occurrence map per
//! bitcode file under `<outdir>/occurrences/`. This module walks those
//! trees deterministically and builds the summary artifacts exchanged with
//! the extractor.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Result;

/// File suffix of per-trace feature files.
pub const FEATURE_SUFFIX: &str = ".fea.json";

/// Collect `{func_name -> trace files}` under the feature directory.
///
/// Function directories and files are visited in sorted order so a corpus
/// always folds the same way. With `target_fn`, only that function's
/// directory is collected.
pub fn feature_files(
    feature_dir: &Path,
    target_fn: Option<&str>,
) -> Result<IndexMap<String, Vec<PathBuf>>> {
    let mut functions: Vec<String> = Vec::new();
    for entry in fs::read_dir(feature_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if target_fn.is_none_or(|t| t == name) {
            functions.push(name);
        }
    }
    functions.sort_unstable();

    let mut corpus = IndexMap::new();
    for func in functions {
        let mut files: Vec<PathBuf> = WalkDir::new(feature_dir.join(&func))
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.to_string_lossy().ends_with(FEATURE_SUFFIX))
            .collect();
        files.sort_unstable();
        corpus.insert(func, files);
    }
    Ok(corpus)
}

/// Per-bitcode occurrence entry: has-return-type flag and slice count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Occurrence(
    /// Whether the function returns a value.
    pub bool,
    /// Number of slices the extractor found.
    pub u64,
);

impl Occurrence {
    /// Whether the function returns a value.
    pub fn has_return_type(&self) -> bool {
        self.0
    }

    /// Number of slices the extractor found for the function.
    pub fn num_slices(&self) -> u64 {
        self.1
    }
}

/// Union the per-bitcode occurrence maps under `<outdir>/occurrences/`
/// into total slice counts per function.
pub fn summarize_occurrences(outdir: &Path) -> Result<BTreeMap<String, u64>> {
    let occurrence_dir = outdir.join("occurrences");
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut files: Vec<PathBuf> = fs::read_dir(&occurrence_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort_unstable();
    for file in files {
        let data = match fs::read_to_string(&file) {
            Ok(data) => data,
            Err(err) => {
                warn!("can not read {}: {err}", file.display());
                continue;
            }
        };
        let single: BTreeMap<String, Occurrence> = match serde_json::from_str(&data) {
            Ok(single) => single,
            Err(err) => {
                warn!("can not parse {}: {err}", file.display());
                continue;
            }
        };
        for (func, occurrence) in single {
            *totals.entry(func).or_insert(0) += occurrence.num_slices();
        }
    }
    Ok(totals)
}

/// Write the summary to `<outdir>/total_occurrences.json`.
pub fn write_occurrence_summary(outdir: &Path, totals: &BTreeMap<String, u64>) -> Result<PathBuf> {
    let path = outdir.join("total_occurrences.json");
    fs::write(&path, serde_json::to_string(totals)?)?;
    Ok(path)
}

/// Read a previously written occurrence summary.
pub fn read_occurrence_summary(outdir: &Path) -> Result<BTreeMap<String, u64>> {
    let path = outdir.join("total_occurrences.json");
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// One function worth extracting features for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFunction {
    /// Function name.
    pub name: String,
    /// Whether the function returns a value.
    pub has_return_type: bool,
    /// `[bitcode name, slice count]` pairs across the package.
    pub package_num_slices: Vec<(String, u64)>,
}

/// Work list handed to the feature extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetNumSlicesMap {
    /// Functions worth extracting, with their per-bitcode slice counts.
    pub functions: Vec<TargetFunction>,
}

/// Build the extraction work list from per-bitcode occurrence maps.
///
/// Functions with zero slices everywhere are dropped; the rest carry one
/// `[bitcode, count]` pair per bitcode file they occur in.
pub fn build_target_map(
    package_occurrences: &BTreeMap<String, BTreeMap<String, Occurrence>>,
) -> TargetNumSlicesMap {
    let mut functions: IndexMap<String, TargetFunction> = IndexMap::new();
    for (bc_name, occurrences) in package_occurrences {
        for (func_name, occurrence) in occurrences {
            if occurrence.num_slices() == 0 {
                continue;
            }
            functions
                .entry(func_name.clone())
                .or_insert_with(|| TargetFunction {
                    name: func_name.clone(),
                    has_return_type: occurrence.has_return_type(),
                    package_num_slices: Vec::new(),
                })
                .package_num_slices
                .push((bc_name.clone(), occurrence.num_slices()));
        }
    }
    TargetNumSlicesMap {
        functions: functions.into_values().collect(),
    }
}
