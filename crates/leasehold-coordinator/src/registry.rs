//! Registry of lock names that have a live handle in this coordinator.
//!
//! Owned by one [`LockCoordinator`](crate::LockCoordinator) rather than being
//! process-global, so tests can run several coordinators side by side, each
//! playing the part of a separate process. Entries point weakly at the
//! handle's state so the coordinator can tear live handles down on shutdown.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::LeaseError;
use crate::lease::LeaseState;

/// Reserved lock names and the lease each one belongs to.
///
/// Backed by `DashMap`; `reserve` is a single atomic check-and-insert.
#[derive(Debug, Default)]
pub struct NameRegistry {
    leases: DashMap<String, Weak<LeaseState>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        NameRegistry {
            leases: DashMap::new(),
        }
    }

    /// Reserves `name` for `lease`, failing if it is already reserved.
    pub(crate) fn reserve(&self, name: &str, lease: Weak<LeaseState>) -> Result<(), LeaseError> {
        match self.leases.entry(name.to_string()) {
            Entry::Occupied(_) => Err(LeaseError::NameInUse(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(lease);
                Ok(())
            }
        }
    }

    /// Removes the reservation only if it still belongs to `lease`. A handle
    /// torn down after its name was forcibly cleared leaves the new owner's
    /// reservation alone.
    pub(crate) fn release_lease(&self, name: &str, lease: &Arc<LeaseState>) -> bool {
        self.leases
            .remove_if(name, |_, owner| std::ptr::eq(owner.as_ptr(), Arc::as_ptr(lease)))
            .is_some()
    }

    /// Removes a reservation whoever owns it. Returns `true` if the name was
    /// reserved.
    pub fn unregister(&self, name: &str) -> bool {
        self.leases.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.leases.contains_key(name)
    }

    /// All reserved names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.leases.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// States of reserved leases whose handle still exists.
    pub(crate) fn live(&self) -> Vec<Arc<LeaseState>> {
        self.leases
            .iter()
            .filter_map(|e| e.value().upgrade())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserve(registry: &NameRegistry, name: &str) -> Result<(), LeaseError> {
        registry.reserve(name, Weak::new())
    }

    #[test]
    fn second_reservation_fails() {
        let registry = NameRegistry::new();
        reserve(&registry, "job").unwrap();

        let err = reserve(&registry, "job").unwrap_err();
        assert!(matches!(err, LeaseError::NameInUse(name) if name == "job"));
    }

    #[test]
    fn unregister_frees_the_name() {
        let registry = NameRegistry::new();
        reserve(&registry, "job").unwrap();

        assert!(registry.unregister("job"));
        assert!(!registry.unregister("job"));
        assert!(reserve(&registry, "job").is_ok());
    }

    #[test]
    fn names_are_sorted() {
        let registry = NameRegistry::new();
        reserve(&registry, "b").unwrap();
        reserve(&registry, "a").unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn dead_entries_are_not_live() {
        let registry = NameRegistry::new();
        reserve(&registry, "job").unwrap();
        assert!(registry.live().is_empty());
        assert!(registry.contains("job"));
    }
}
