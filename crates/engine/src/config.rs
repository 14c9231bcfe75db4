//! Engine configuration.
//!
//! Loaded by the binary from the `[engine]` table of its configuration file;
//! every field has a default so an absent table is valid.

use serde::{Deserialize, Serialize};

/// Reason recorded by `stop_all` unless configured otherwise.
pub const DEFAULT_INTERRUPT_REASON: &str = "Stopped by app.";

/// Tunables for one [`crate::QueryEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log the pretty-printed pipeline description on every evaluation.
    pub trace_descriptions: bool,

    /// Reason carried by the `Interrupted` failure that `stop_all` records.
    pub interrupt_reason: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_descriptions: false,
            interrupt_reason: DEFAULT_INTERRUPT_REASON.to_owned(),
        }
    }
}
