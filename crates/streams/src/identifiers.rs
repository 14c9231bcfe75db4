//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example, a
//! [`SourceId`] with a [`GrantRequestId`] even though both are `u64` under the
//! hood.
//!
//! Identity here is *handle* identity, not structural equality: two providers
//! constructed with identical parameters still receive distinct [`SourceId`]s,
//! and the purpose registry is keyed by that id.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, from_static(), as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Creates an identifier from a compile-time constant.
            ///
            /// # Panics
            ///
            /// Panics if `value` is empty, in every build profile.
            pub fn from_static(value: &'static str) -> Self {
                assert!(!value.is_empty(), concat!(stringify!($name), " must not be empty"));
                Self(value.to_owned())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for process-monotonic u64 newtypes.
// Generates: struct (Copy), next(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! sequential_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next identifier. Never returns the same value twice
            /// within one process.
            pub fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// An opaque runtime access right required to read a data source
    /// (e.g. `"ACCESS_FINE_LOCATION"`).
    ///
    /// Hosts decide what a capability means; the engine only compares them.
    Capability
}

string_id! {
    /// Human-readable name of a data provider (e.g. `"location.updates"`).
    ProviderName
}

string_id! {
    /// Human-readable name of a pipeline stage, used in errors and diagnostics.
    StageName
}

// ---------------------------------------------------------------------------
// Identifiers — monotonic (internally generated)
// ---------------------------------------------------------------------------

sequential_id! {
    /// Identity of a pipeline head.
    ///
    /// Allocated once per [`crate::Source`]; this is the key of the engine's
    /// purpose registry.
    SourceId
}

sequential_id! {
    /// Identity of a single node in a pipeline chain.
    NodeId
}

sequential_id! {
    /// Identity of a submitted pipeline in an engine's query set.
    QueryId
}

sequential_id! {
    /// Correlation key between a pending grant request and the pipeline
    /// waiting on it.
    GrantRequestId
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed
// ---------------------------------------------------------------------------

/// Identifies one engine instance (one logical host session).
///
/// Generated fresh for every engine; propagated through spans so all activity
/// from a single session can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random session identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`SessionId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_empty_values() {
        assert!(Capability::new("").is_none());
        assert_eq!(
            Capability::new("ACCESS_FINE_LOCATION").map(|c| c.to_string()),
            Some("ACCESS_FINE_LOCATION".to_owned())
        );
    }

    #[test]
    fn sequential_ids_are_never_reused() {
        let a = SourceId::next();
        let b = SourceId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn session_ids_are_random() {
        assert_ne!(SessionId::new_random(), SessionId::new_random());
    }
}
