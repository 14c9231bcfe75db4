//! Access-grant checking.
//!
//! The checker is a pure function over a requested [`CapabilitySet`] and the
//! host's current grant state. It has no side effects and never retries; the
//! retry policy lives in the engine.
//!
//! [`GrantTable`] is a thread-safe, in-memory [`GrantState`] for hosts that
//! keep grants themselves (and for tests).

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::{Capability, CapabilitySet};

/// The host's current grant state.
///
/// # Thread Safety
///
/// Grant checks may run on provider callback threads, so implementations must
/// be `Send + Sync`.
pub trait GrantState: Send + Sync {
    /// Returns `true` if `capability` is currently granted.
    fn is_granted(&self, capability: &Capability) -> bool;
}

/// Returns the subset of `required` that is not currently granted.
///
/// An empty `required` set is trivially satisfied.
pub fn missing<G>(required: &CapabilitySet, grants: &G) -> CapabilitySet
where
    G: GrantState + ?Sized,
{
    required
        .iter()
        .filter(|capability| !grants.is_granted(capability))
        .cloned()
        .collect()
}

/// Returns `true` if every capability in `required` is granted.
pub fn all_granted<G>(required: &CapabilitySet, grants: &G) -> bool
where
    G: GrantState + ?Sized,
{
    missing(required, grants).is_empty()
}

/// Returns `true` if a single capability is granted.
pub fn check<G>(capability: &Capability, grants: &G) -> bool
where
    G: GrantState + ?Sized,
{
    grants.is_granted(capability)
}

// ---------------------------------------------------------------------------
// In-memory grant state
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory grant state.
///
/// Read-heavy workloads (a check on every evaluation) benefit from concurrent
/// read access; grants and revocations take the write lock.
#[derive(Debug, Default)]
pub struct GrantTable {
    granted: RwLock<HashSet<Capability>>,
}

impl GrantTable {
    /// Creates a table with nothing granted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with `capabilities` already granted.
    pub fn with_granted(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let table = Self::new();
        table.grant_all(capabilities);
        table
    }

    /// Grants one capability.
    pub fn grant(&self, capability: Capability) {
        tracing::debug!(%capability, "Capability granted");
        self.granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability);
    }

    /// Grants every capability in `capabilities`.
    pub fn grant_all(&self, capabilities: impl IntoIterator<Item = Capability>) {
        for capability in capabilities {
            self.grant(capability);
        }
    }

    /// Revokes a capability. Returns `false` if it was not granted.
    pub fn revoke(&self, capability: &Capability) -> bool {
        let removed = self
            .granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(capability);
        if removed {
            tracing::debug!(%capability, "Capability revoked");
        }
        removed
    }

    /// Returns a snapshot of the granted capabilities.
    pub fn granted(&self) -> CapabilitySet {
        self.granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl GrantState for GrantTable {
    fn is_granted(&self, capability: &Capability) -> bool {
        self.granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(name: &str) -> Capability {
        Capability::new(name).unwrap()
    }

    #[test]
    fn empty_requirement_is_trivially_satisfied() {
        let table = GrantTable::new();
        assert!(missing(&CapabilitySet::new(), &table).is_empty());
        assert!(all_granted(&CapabilitySet::new(), &table));
    }

    #[test]
    fn missing_reports_exactly_the_ungranted_subset() {
        let table = GrantTable::with_granted([cap("CONTACTS")]);
        let required: CapabilitySet = [cap("CONTACTS"), cap("FINE_LOCATION"), cap("AUDIO")]
            .into_iter()
            .collect();

        let m = missing(&required, &table);

        let expected: CapabilitySet = [cap("AUDIO"), cap("FINE_LOCATION")].into_iter().collect();
        assert_eq!(m, expected);
        assert!(!all_granted(&required, &table));
    }

    #[test]
    fn revoke_takes_effect_on_next_check() {
        let table = GrantTable::with_granted([cap("CAMERA")]);
        assert!(check(&cap("CAMERA"), &table));
        assert!(table.revoke(&cap("CAMERA")));
        assert!(!check(&cap("CAMERA"), &table));
        assert!(!table.revoke(&cap("CAMERA")));
    }

    #[test]
    fn checker_accepts_trait_objects() {
        let table = GrantTable::with_granted([cap("A")]);
        let grants: &dyn GrantState = &table;
        assert!(all_granted(&CapabilitySet::single(cap("A")), grants));
    }
}
