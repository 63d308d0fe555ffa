//! Fan-out driver for the external trace extractor.
//!
//! The extractor is a separate binary that consumes one LLVM bitcode file
//! per invocation and drops its outputs into a shared directory. A failing
//! invocation is logged and skipped; partial outputs on disk stay intact
//! so a run can be resumed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{info, warn};
use walkdir::WalkDir;

use crate::corpus::{self, Occurrence, TargetNumSlicesMap};
use crate::error::Result;

/// Collect `.bc` files under a directory, in sorted order.
pub fn bc_files(bcdir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(bcdir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "bc"))
        .collect();
    files.sort_unstable();
    files
}

/// Driver around one extractor binary and one output directory.
pub struct ExtractorDriver {
    binary: PathBuf,
    outdir: PathBuf,
    extra_args: Vec<String>,
}

impl ExtractorDriver {
    /// Create a driver. `extra_args` are passed through to every
    /// invocation.
    pub fn new(binary: PathBuf, outdir: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            binary,
            outdir,
            extra_args,
        }
    }

    /// Run the extractor on one bitcode file and read back its occurrence
    /// map. Returns `None` when the invocation or the read-back fails;
    /// detection continues with the remaining inputs.
    pub fn run_on(&self, bc_file: &Path, tmp_dir: &Path) -> Option<BTreeMap<String, Occurrence>> {
        let bc_name = bc_file.file_name()?.to_string_lossy().into_owned();
        let map_file = tmp_dir.join(format!("{bc_name}.json"));
        info!("=== Running extractor on {} ===", bc_file.display());
        let status = Command::new(&self.binary)
            .arg(bc_file)
            .arg(&self.outdir)
            .arg("--subfolder")
            .arg(&bc_name)
            .arg("--target-num-slices-map-file")
            .arg(&map_file)
            .args(&self.extra_args)
            .status();
        match status {
            Err(err) => {
                warn!("failed to spawn {}: {err}", self.binary.display());
                return None;
            }
            Ok(status) if !status.success() => {
                warn!(
                    "failure during handling {bc_name}, error code: {:?}",
                    status.code()
                );
                return None;
            }
            Ok(_) => {}
        }
        let data = match fs::read_to_string(&map_file) {
            Ok(data) => data,
            Err(err) => {
                warn!("can not read {}: {err}", map_file.display());
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(map) => Some(map),
            Err(err) => {
                warn!("can not parse {}: {err}", map_file.display());
                None
            }
        }
    }

    /// Run the extractor over every bitcode file and build the extraction
    /// work list from the surviving occurrence maps.
    pub fn run_all<F>(&self, bc_files: &[PathBuf], mut on_done: F) -> Result<TargetNumSlicesMap>
    where
        F: FnMut(&Path),
    {
        let tmp_dir = self.outdir.join("tmp_folder");
        fs::create_dir_all(&tmp_dir)?;
        let mut package: BTreeMap<String, BTreeMap<String, Occurrence>> = BTreeMap::new();
        for bc_file in bc_files {
            if let Some(occurrences) = self.run_on(bc_file, &tmp_dir) {
                if !occurrences.is_empty() {
                    let bc_name = bc_file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    package.insert(bc_name, occurrences);
                }
            }
            on_done(bc_file);
        }
        let target_map = corpus::build_target_map(&package);
        let map_path = tmp_dir.join("ALL.json");
        fs::write(&map_path, serde_json::to_string(&target_map)?)?;
        info!(
            "wrote extraction work list for {} functions to {}",
            target_map.functions.len(),
            map_path.display()
        );
        Ok(target_map)
    }
}
