//! Configuration structures for misuse-rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::features::CheckKind;

/// Configuration of one detection run.
///
/// Every field has a sensible default so a config file only needs to name
/// what it changes; CLI flags override file values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Directory of per-function trace features; defaults to
    /// `<outdir>/features`.
    pub feature_dir: Option<PathBuf>,

    /// Directory holding `doc_feature.json`.
    pub doc_dir: Option<PathBuf>,

    /// Output directory for reports and summaries.
    pub outdir: Option<PathBuf>,

    /// Restrict detection to one function name.
    pub target_fn: Option<String>,

    /// Restrict detection to one evidence kind; all four by default.
    pub check_kind: Option<CheckKind>,

    /// Acceptance-threshold override; values outside (0, 1) are ignored.
    pub threshold: Option<f64>,

    /// Midpoint override for the logistic threshold curve.
    pub rho: Option<u32>,

    /// Count a repeated feature at one location only once.
    pub remove_dup: bool,

    /// Consult documentation features as secondary evidence.
    pub enable_doc: bool,

    /// Documentation-only mode: ignore code-inferred majorities.
    pub disable_code: bool,

    /// Print each function's inferred specification while detecting.
    pub display_spec: bool,

    /// Emit one line per offending location instead of full blocks.
    pub only_report_locations: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            feature_dir: None,
            doc_dir: None,
            outdir: None,
            target_fn: None,
            check_kind: None,
            threshold: None,
            rho: None,
            remove_dup: false,
            enable_doc: false,
            disable_code: false,
            display_spec: false,
            only_report_locations: false,
        }
    }
}

impl DetectConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| crate::Error::Config(format!("can not parse {}: {err}", path.display())))
    }

    /// Output directory, defaulting to `./cad-output`.
    pub fn resolved_outdir(&self) -> PathBuf {
        self.outdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("cad-output"))
    }

    /// Feature directory, defaulting to `<outdir>/features`.
    pub fn resolved_feature_dir(&self) -> PathBuf {
        self.feature_dir
            .clone()
            .unwrap_or_else(|| self.resolved_outdir().join("features"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_everything_unset() {
        let config = DetectConfig::default();
        assert!(config.threshold.is_none());
        assert!(!config.remove_dup);
        assert_eq!(config.resolved_outdir(), PathBuf::from("cad-output"));
        assert_eq!(
            config.resolved_feature_dir(),
            PathBuf::from("cad-output").join("features")
        );
    }

    #[test]
    fn toml_round_trip_with_kind() {
        let toml_src = r#"
            threshold = 0.7
            remove_dup = true
            check_kind = "arg.pre"
        "#;
        let config: DetectConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.threshold, Some(0.7));
        assert!(config.remove_dup);
        assert_eq!(config.check_kind, Some(CheckKind::ArgPre));
    }
}
