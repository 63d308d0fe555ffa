//! misuse-rs: frequency-based API-misuse detection for compiled C/C++ code
//!
//! This library infers per-function usage specifications from a corpus of
//! symbolic-trace features and flags call sites that deviate from them.
//! Feature records are produced upstream, one per explored trace; textual
//! API documentation is mined separately and consulted as a secondary
//! evidence source.
//!
//! # Features
//!
//! - **Feature Aggregation**: Fold per-trace records into per-function
//!   frequency tables with stable fingerprints
//! - **Specification Inference**: Return-value, argument pre/post and
//!   neighboring-call contracts under a logistic acceptance threshold
//! - **Violation Detection**: Deterministic rule checkers with toleration
//!   to suppress frequency-based false positives
//! - **Documentation Evidence**: Per-function doc features with
//!   name-variant fallback
//! - **Report Generation**: Location-grouped, fingerprint-deduplicated
//!   bug reports
//!
//! # Quick Start
//!
//! ```no_run
//! use misuse_rs::{corpus, detect, DetectConfig, Detector};
//! use std::path::Path;
//!
//! let config = DetectConfig::default();
//! let traces = corpus::feature_files(Path::new("cad-output/features"), None)?;
//! let mut detector = Detector::new(config, None);
//! detector.run(&traces);
//! let reports = detector.into_reports();
//! detect::report::write(Path::new("cad-output/bugreport.txt"), &reports, false)?;
//! # Ok::<(), misuse_rs::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`features`]: trace feature records, fingerprints and folding
//! - [`spec`]: per-function specification inference
//! - [`check`]: the four violation checkers
//! - [`doc`]: documentation-feature store
//! - [`detect`]: orchestrator, toleration and report writing
//! - [`corpus`]: filesystem layout shared with the extractor
//! - [`driver`]: external extractor fan-out

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod check;
pub mod config;
pub mod corpus;
pub mod detect;
pub mod doc;
pub mod driver;
pub mod error;
pub mod features;
pub mod keywords;
pub mod spec;

pub use config::DetectConfig;
pub use detect::{Detector, Finding};
pub use error::{Error, Result};
pub use features::{CheckKind, FeatureRecord, FeatureTable};
