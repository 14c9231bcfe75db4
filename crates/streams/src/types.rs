//! Shared value types for the PrivStreams domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (capability sets are deduplicated, purposes
//! are immutable once declared) and participate in engine decisions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Capability;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// An unordered, deduplicated set of [`Capability`] values.
///
/// Backed by a `BTreeSet` so that iteration, display, and serialisation are
/// deterministic; the ordering carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding exactly one capability.
    pub fn single(capability: Capability) -> Self {
        let mut set = Self::new();
        set.insert(capability);
        set
    }

    /// Adds a capability. Returns `false` if it was already present.
    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// Returns `true` if `capability` is in the set.
    pub fn contains(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    /// Returns the union of `self` and `other` as a new set.
    #[must_use]
    pub fn union(&self, other: &CapabilitySet) -> CapabilitySet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// Returns `true` if the set holds no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the capabilities in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Capability> for CapabilitySet {
    fn extend<I: IntoIterator<Item = Capability>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for CapabilitySet {
    type Item = Capability;
    type IntoIter = std::collections::btree_set::IntoIter<Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, capability) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{capability}")?;
        }
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// Purposes
// ---------------------------------------------------------------------------

/// The family a declared [`Purpose`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurposeCategory {
    /// Advertising.
    Ads,
    /// Usage analytics.
    Analytics,
    /// A user-facing feature of the application.
    Feature,
    /// Health or fitness tracking.
    Health,
    /// Academic or product research.
    Research,
    /// Social features (sharing, messaging).
    Social,
    /// Utility functionality (backup, sync, accessibility).
    Utility,
    /// Anything not covered above.
    Other,
}

impl std::fmt::Display for PurposeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ads => "ads",
            Self::Analytics => "analytics",
            Self::Feature => "feature",
            Self::Health => "health",
            Self::Research => "research",
            Self::Social => "social",
            Self::Utility => "utility",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// The declared reason a caller wants access to a data source.
///
/// Purposes are immutable values. One purpose is bound to one pipeline head at
/// registration time; re-registering the head replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Purpose {
    category: PurposeCategory,
    description: String,
}

impl Purpose {
    /// Creates a purpose in an explicit category.
    pub fn new(category: PurposeCategory, description: impl Into<String>) -> Self {
        Self {
            category,
            description: description.into(),
        }
    }

    /// Data is used for advertising.
    pub fn ads(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Ads, description)
    }

    /// Data is used for analytics.
    pub fn analytics(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Analytics, description)
    }

    /// Data is used by a user-facing feature.
    pub fn feature(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Feature, description)
    }

    /// Data is used for health tracking.
    pub fn health(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Health, description)
    }

    /// Data is used for research.
    pub fn research(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Research, description)
    }

    /// Data is used for social features.
    pub fn social(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Social, description)
    }

    /// Data is used for utility functionality.
    pub fn utility(description: impl Into<String>) -> Self {
        Self::new(PurposeCategory::Utility, description)
    }

    /// Returns the purpose category.
    pub fn category(&self) -> PurposeCategory {
        self.category
    }

    /// Returns the free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.description)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// One unit of personal data flowing through a pipeline.
///
/// An ordered map of named fields. Providers decide which fields they emit;
/// stages read and rewrite them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(BTreeMap<String, Value>);

impl Item {
    /// Creates an item with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a field as `f64`, if present and numeric.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    /// Returns a field as `&str`, if present and a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Iterates all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// Provider cardinality
// ---------------------------------------------------------------------------

/// How many items a provider produces before finishing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Single-shot: finishes automatically after its first item.
    Single,
    /// Continuous: finishes only when cancelled or its resource is exhausted.
    Multi,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
