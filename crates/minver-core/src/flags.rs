//! Strict-build lint flags.

use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Lints denied by default, in the order they are passed to rustc.
pub const DEFAULT_DENIED_LINTS: &[&str] = &[
    "warnings",
    "future-incompatible",
    "unused",
    "rust_2018_idioms",
    "nonstandard_style",
];

/// Immutable, ordered set of `-D <lint>` directives.
///
/// Cloning shares the same underlying list, so every build in a run sees the
/// exact same flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictFlagSet {
    denied: Arc<[String]>,
}

impl StrictFlagSet {
    /// Create a flag set denying exactly the given lints, in order.
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn new<I, S>(lints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut denied: Vec<String> = Vec::new();
        for lint in lints {
            let owned: String = lint.into();
            let lint = owned.trim();
            if lint.is_empty() || denied.iter().any(|d| d == lint) {
                continue;
            }
            denied.push(lint.to_string());
        }
        Self {
            denied: denied.into(),
        }
    }

    /// Extend the set with additional denied lints, returning a new set.
    pub fn with_denied<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            self.denied
                .iter()
                .cloned()
                .chain(extra.into_iter().map(Into::into)),
        )
    }

    pub fn denied_lints(&self) -> &[String] {
        &self.denied
    }

    /// Flags as individual rustc arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.denied
            .iter()
            .flat_map(|lint| ["-D".to_string(), lint.clone()])
            .collect()
    }

    /// Flags rendered as a `RUSTFLAGS` value.
    pub fn to_rustflags(&self) -> String {
        self.to_args().join(" ")
    }
}

impl Default for StrictFlagSet {
    fn default() -> Self {
        Self::new(DEFAULT_DENIED_LINTS.iter().copied())
    }
}

impl Serialize for StrictFlagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.denied.iter())
    }
}
