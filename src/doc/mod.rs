//! Documentation-derived feature store.
//!
//! Documentation features are mined offline from the libc man pages, the
//! Linux core-API HTML and the OpenSSL POD sources, and arrive here as one
//! JSON map from function name to feature. They serve as a secondary
//! evidence source next to the code-inferred specifications.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::Result;

/// Return-value documentation: known literal return values and whether
/// each marks success or failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocRet {
    /// Documented return constants.
    #[serde(default)]
    pub value: Vec<i64>,
    /// Per-constant outcome, `"success"` or `"fail"`, aligned with
    /// `value`.
    #[serde(default)]
    pub cond: Vec<String>,
}

/// Per-argument documentation: whether each argument must be checked
/// before and after the call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocArgs {
    /// Pre-call check requirement per argument position.
    #[serde(rename = "arg.pre", default)]
    pub pre: Vec<bool>,
    /// Post-call check requirement per argument position.
    #[serde(rename = "arg.post", default)]
    pub post: Vec<bool>,
}

/// Documented neighboring-call requirements.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocCausality {
    /// Functions documented as required predecessors.
    #[serde(default)]
    pub pre: Vec<String>,
    /// Functions documented as required successors.
    #[serde(default)]
    pub post: Vec<String>,
}

/// Everything the documentation says about one function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocFeature {
    /// Return-value documentation.
    #[serde(default)]
    pub ret: Option<DocRet>,
    /// Argument documentation.
    #[serde(default)]
    pub args: Option<DocArgs>,
    /// Neighboring-call documentation.
    #[serde(default)]
    pub causality: Option<DocCausality>,
}

/// Store of per-function documentation features with name-variant
/// fallback.
#[derive(Debug)]
pub struct DocStore {
    features: BTreeMap<String, DocFeature>,
    trailing_digits: Regex,
}

impl DocStore {
    /// Load the store from a `doc_feature.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let features = serde_json::from_str(&data)?;
        Ok(Self::from_features(features))
    }

    /// Build a store from an in-memory map.
    pub fn from_features(features: BTreeMap<String, DocFeature>) -> Self {
        Self {
            features,
            // The pattern is a literal; it always compiles.
            trailing_digits: Regex::new(r"\d+$").unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Number of documented functions.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Look up a function, falling back to known name variants on a miss.
    pub fn get(&self, func_name: &str) -> Option<&DocFeature> {
        if let Some(feature) = self.features.get(func_name) {
            return Some(feature);
        }
        self.name_variants(func_name)
            .into_iter()
            .find_map(|variant| self.features.get(&variant))
    }

    /// Spelling variants probed on a lookup miss: the CRYPTO family prefix
    /// for OpenSSL names, a trailing-digit strip, and, for names without a
    /// trailing digit, the common numbered suffixes.
    fn name_variants(&self, func_name: &str) -> Vec<String> {
        let mut variants = Vec::new();
        if let Some(prefix) = func_name.split('_').next() {
            if prefix == "OPENSSL" || prefix == "SSL" {
                variants.push(func_name.replace(prefix, "CRYPTO"));
            }
        }
        if let Some(m) = self.trailing_digits.find(func_name) {
            variants.push(func_name[..m.start()].to_string());
        } else {
            for i in 0..10 {
                variants.push(format!("{func_name}{i}"));
            }
            variants.push(format!("{func_name}32"));
            variants.push(format!("{func_name}64"));
        }
        variants
    }
}
