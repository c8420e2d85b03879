//! minver core - Minimum-Version Build Verifier
//!
//! Confirms that the lower bounds a Cargo manifest declares for its
//! dependencies are actually sufficient to build:
//! - Strict baseline build against the currently resolved versions
//! - External lower-bound rewrite of the manifest
//! - Strict rebuild against the rewritten manifest
//!
//! A secondary workflow invokes an external distro version comparator.

pub mod comparator;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod flags;
pub mod manifest;
pub mod phase;
pub mod report;
pub mod rewrite;
pub mod strict_build;
pub mod telemetry;
pub mod tool;
pub mod verifier;

// Re-export key types
pub use comparator::{ComparatorConfig, ComparisonOutcome, DistroComparator};
pub use error::{ExecError, VerifyError};
pub use executor::{CommandExecutor, CommandOutput, Invocation, InvocationKind, ProcessExecutor};
pub use flags::StrictFlagSet;
pub use manifest::{ManifestDigest, ManifestRef, ManifestSnapshot};
pub use phase::{Phase, VerifierState, Verdict};
pub use report::{RestoreOutcome, StepRecord, VerificationReport};
pub use rewrite::LowerBoundRewriter;
pub use strict_build::StrictBuildRunner;
pub use telemetry::init_tracing;
pub use tool::{validate_tool, validate_tool_in, ToolHandle};
pub use verifier::{LowerBoundVerifier, VerifierConfig};

/// Conventional environment variable naming the lower-bound mutator.
pub const SET_LOWER_BOUNDS_VAR: &str = "SET_LOWER_BOUNDS";

/// Conventional environment variable naming the distro version comparator.
pub const COMPARE_FEDORA_VERSIONS_VAR: &str = "COMPARE_FEDORA_VERSIONS";
