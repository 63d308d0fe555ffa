//! Typed model of per-trace feature records.
//!
//! Records arrive as JSON, one file per explored trace, produced by the
//! external symbolic-trace extractor. The four sections are independently
//! optional and "section absent" is meaningful, so each is an `Option`.
//! All maps are `BTreeMap` so serialized fingerprints are stable strings.

pub mod fold;

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use fold::FeatureTable;

/// Comparison operator used when a value was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckCond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CheckCond {
    /// Wire spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }
}

fn cond_from_wire<'de, D>(deserializer: D) -> Result<Option<CheckCond>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some("eq") => Ok(Some(CheckCond::Eq)),
        Some("ne") => Ok(Some(CheckCond::Ne)),
        Some("lt") => Ok(Some(CheckCond::Lt)),
        Some("le") => Ok(Some(CheckCond::Le)),
        Some("gt") => Ok(Some(CheckCond::Gt)),
        Some("ge") => Ok(Some(CheckCond::Ge)),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["eq", "ne", "lt", "le", "gt", "ge"],
        )),
    }
}

/// How a value was compared around the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueCheck {
    /// Directly compared.
    #[serde(default)]
    pub checked: bool,
    /// Compared through a copy or a flag derived from the value.
    #[serde(default)]
    pub indir_checked: bool,
    /// Operator used for the comparison, when present. The extractor
    /// writes an empty string for values it never compared.
    #[serde(
        default,
        deserialize_with = "cond_from_wire",
        skip_serializing_if = "Option::is_none"
    )]
    pub check_cond: Option<CheckCond>,
    /// Literal compared against; meaningful only when `checked` and not
    /// `compared_with_non_const`.
    #[serde(default)]
    pub compared_with_const: i64,
    /// Compared against a non-constant expression.
    #[serde(default)]
    pub compared_with_non_const: bool,
}

/// How the returned value was used by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetContext {
    /// Read through a dereference.
    #[serde(default)]
    pub derefed_read: bool,
    /// Written through a dereference.
    #[serde(default)]
    pub derefed_write: bool,
    /// Returned through an out-parameter.
    #[serde(default)]
    pub indir_returned: bool,
    /// Returned directly to the caller's caller.
    #[serde(default)]
    pub returned: bool,
    /// Stored somewhere outliving the call site.
    #[serde(default)]
    pub stored_not_local: bool,
    /// Used as an operand of a binary operation.
    #[serde(default)]
    pub used_in_bin: bool,
    /// Passed on to another call.
    #[serde(default)]
    pub used_in_call: bool,
}

/// Return-value section: present when the function returns a value the
/// caller can observe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetvalFeature {
    /// How the return value was compared.
    #[serde(default)]
    pub check: ValueCheck,
    /// How the return value was otherwise used.
    #[serde(default)]
    pub ctx: RetContext,
}

/// Pre-call state of one argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgPreSlot {
    /// How the argument was compared before the call.
    #[serde(default)]
    pub check: ValueCheck,
    /// Stack allocation in the calling frame.
    #[serde(default)]
    pub is_alloca: bool,
    /// Global variable.
    #[serde(default)]
    pub is_global: bool,
    /// Literal constant.
    #[serde(default)]
    pub is_constant: bool,
}

/// Pre-call argument section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgPreFeature {
    /// Number of arguments observed at the call.
    pub arg_num: usize,
    /// Per-argument state, indexed by position.
    #[serde(default)]
    pub feature: Vec<ArgPreSlot>,
}

/// Post-call state of one argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgPostSlot {
    /// Read through a dereference after the call.
    #[serde(default)]
    pub derefed_read: bool,
    /// Written through a dereference after the call.
    #[serde(default)]
    pub derefed_write: bool,
    /// Returned to the caller's caller after the call.
    #[serde(default)]
    pub returned: bool,
    /// Involved in a comparison after the call.
    #[serde(default)]
    pub used_in_check: bool,
}

/// Post-call argument section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgPostFeature {
    /// Number of arguments observed at the call.
    pub arg_num: usize,
    /// Per-argument state, indexed by position.
    #[serde(default)]
    pub feature: Vec<ArgPostSlot>,
}

/// Co-use modes observed between the target and a neighboring call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoUse {
    /// The target's value flows into the neighbor as an argument.
    #[serde(default)]
    pub used_as_arg: bool,
    /// The two calls share an argument.
    #[serde(default)]
    pub share_argument: bool,
}

/// Causality section: calls observed before and after the target on the
/// same trace, keyed by function name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CausalityFeature {
    /// Calls preceding the target.
    #[serde(rename = "pre.call", default)]
    pub pre_call: BTreeMap<String, CoUse>,
    /// Calls following the target.
    #[serde(rename = "post.call", default)]
    pub post_call: BTreeMap<String, CoUse>,
}

/// One trace's complete feature record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Return-value evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retval: Option<RetvalFeature>,
    /// Pre-call argument evidence.
    #[serde(rename = "arg.pre", default, skip_serializing_if = "Option::is_none")]
    pub arg_pre: Option<ArgPreFeature>,
    /// Post-call argument evidence.
    #[serde(rename = "arg.post", default, skip_serializing_if = "Option::is_none")]
    pub arg_post: Option<ArgPostFeature>,
    /// Neighboring-call evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causality: Option<CausalityFeature>,
}

impl FeatureRecord {
    /// Whether the section backing `kind` is present in this record.
    pub fn has_section(&self, kind: CheckKind) -> bool {
        match kind {
            CheckKind::Retval => self.retval.is_some(),
            CheckKind::ArgPre => self.arg_pre.is_some(),
            CheckKind::ArgPost => self.arg_post.is_some(),
            CheckKind::Causality => self.causality.is_some(),
        }
    }

    /// Canonical fingerprint of one section, used as a report key.
    ///
    /// Field order is fixed by the struct definitions and maps are sorted,
    /// so equal sections always produce the same string.
    pub fn section_fingerprint(&self, kind: CheckKind) -> String {
        fn render<T: Serialize>(section: &Option<T>) -> String {
            section
                .as_ref()
                .and_then(|s| serde_json::to_string(s).ok())
                .unwrap_or_default()
        }
        match kind {
            CheckKind::Retval => render(&self.retval),
            CheckKind::ArgPre => render(&self.arg_pre),
            CheckKind::ArgPost => render(&self.arg_post),
            CheckKind::Causality => render(&self.causality),
        }
    }
}

/// On-disk trace file: a feature record stamped with its source location.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceFile {
    /// Source location of the call site, as produced upstream. Empty means
    /// the extractor could not attribute the trace; such records are
    /// ignored.
    #[serde(default)]
    pub loc: String,
    /// The feature record proper.
    #[serde(flatten)]
    pub record: FeatureRecord,
}

/// The four orthogonal evidence kinds carried by a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CheckKind {
    /// Return-value checking.
    #[serde(rename = "retval")]
    Retval,
    /// Argument preconditions.
    #[serde(rename = "arg.pre")]
    ArgPre,
    /// Argument postconditions.
    #[serde(rename = "arg.post")]
    ArgPost,
    /// Required neighboring calls.
    #[serde(rename = "causality")]
    Causality,
}

impl CheckKind {
    /// All kinds, in report order.
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Retval,
        CheckKind::ArgPre,
        CheckKind::ArgPost,
        CheckKind::Causality,
    ];

    /// Wire and report spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retval => "retval",
            Self::ArgPre => "arg.pre",
            Self::ArgPost => "arg.post",
            Self::Causality => "causality",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retval" => Ok(Self::Retval),
            "arg.pre" => Ok(Self::ArgPre),
            "arg.post" => Ok(Self::ArgPost),
            "causality" => Ok(Self::Causality),
            other => Err(format!("unknown check kind: {other}")),
        }
    }
}

/// Canonicalized comparison key for a checked value.
///
/// Constant comparisons are stored in half units so that equivalent
/// inequalities collapse to the same key: `<= K` and `> K` both split the
/// number line at K + 1/2, `< K` and `>= K` at K - 1/2. In particular
/// `< K` and `<= K-1` become equal, as do `> K` and `>= K+1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckValKey {
    /// Compared against a constant; the boundary position in half units.
    Halves(i64),
    /// Compared against a non-constant value.
    NonConst,
    /// Only indirectly checked.
    IndirChk,
}

/// Boundary offset, in half units, merging adjacent comparison operators.
pub const CHECK_VAL_OFFSET: i64 = 1;

impl CheckValKey {
    /// Derive the key for a directly or indirectly checked value, or
    /// `None` when the value was never compared at all.
    pub fn from_check(check: &ValueCheck) -> Option<Self> {
        if check.checked {
            if check.compared_with_non_const {
                return Some(Self::NonConst);
            }
            let base = check.compared_with_const * 2;
            let key = match check.check_cond {
                Some(CheckCond::Gt) | Some(CheckCond::Le) => base + CHECK_VAL_OFFSET,
                Some(CheckCond::Ge) | Some(CheckCond::Lt) => base - CHECK_VAL_OFFSET,
                _ => base,
            };
            Some(Self::Halves(key))
        } else if check.indir_checked {
            Some(Self::IndirChk)
        } else {
            None
        }
    }

    /// Whole-constant value when the key is an exact equality comparison.
    pub fn as_const(&self) -> Option<i64> {
        match self {
            Self::Halves(h) if h % 2 == 0 => Some(h / 2),
            _ => None,
        }
    }
}

impl fmt::Display for CheckValKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halves(h) if h % 2 == 0 => write!(f, "{}", h / 2),
            Self::Halves(h) => write!(f, "{}", *h as f64 / 2.0),
            Self::NonConst => f.write_str("non_const"),
            Self::IndirChk => f.write_str("indir_chk"),
        }
    }
}
