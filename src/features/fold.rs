//! Folding per-trace feature records into a per-function frequency table.

use log::warn;
use std::fs;
use std::path::Path;

use super::{FeatureRecord, TraceFile};

/// Frequency table over the distinct feature records of one function.
///
/// Three parallel vectors of equal length: the record, the number of traces
/// sharing it, and the source locations it was observed at. The table is
/// insertion-ordered and equality is deep structural equality on the
/// record, so two runs over the same inputs produce identical tables.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    /// Distinct feature records, in first-seen order.
    pub features: Vec<FeatureRecord>,
    /// Trace count per distinct record.
    pub times: Vec<u64>,
    /// Locations per distinct record, in first-seen order.
    pub locs: Vec<Vec<String>>,
    remove_dup: bool,
}

impl FeatureTable {
    /// Creates an empty table. With `remove_dup`, a record seen again at a
    /// location it was already counted at does not count as a new trace.
    pub fn new(remove_dup: bool) -> Self {
        Self {
            remove_dup,
            ..Self::default()
        }
    }

    /// Number of distinct records.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total number of folded traces.
    pub fn total_time(&self) -> u64 {
        self.times.iter().sum()
    }

    /// Fold one trace into the table.
    pub fn fold(&mut self, record: FeatureRecord, loc: String) {
        match self.features.iter().position(|f| *f == record) {
            None => {
                self.features.push(record);
                self.times.push(1);
                self.locs.push(vec![loc]);
            }
            Some(i) => {
                if !self.locs[i].contains(&loc) {
                    self.locs[i].push(loc);
                    self.times[i] += 1;
                } else if !self.remove_dup {
                    // The same record at an already-known location still
                    // counts as another trace unless dedup is requested.
                    self.times[i] += 1;
                }
            }
        }
    }

    /// Load and fold every trace file of one function.
    ///
    /// Unreadable or unparsable files and records without a location
    /// reduce recall but never abort the run.
    pub fn load<P: AsRef<Path>>(paths: &[P], remove_dup: bool) -> Self {
        let mut table = Self::new(remove_dup);
        for path in paths {
            let path = path.as_ref();
            let data = match fs::read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    warn!("can not read {}: {err}", path.display());
                    continue;
                }
            };
            let trace: TraceFile = match serde_json::from_str(&data) {
                Ok(trace) => trace,
                Err(err) => {
                    warn!("can not parse {}: {err}", path.display());
                    continue;
                }
            };
            if trace.loc.is_empty() {
                continue;
            }
            table.fold(trace.record, trace.loc);
        }
        table
    }
}
