//! Capability registry
//!
//! Tracks the requested (reduced) capability set against the full name
//! universe discovered in the repository, answers group queries and
//! computes virtual capabilities. Frozen at load time; read-only after.

use crate::virtuals;
use devc_common::{Capabilities, DetectError, DetectResult, MANDATORY_CAPABILITIES};
use std::collections::{BTreeMap, BTreeSet};

/// Frozen per-engine capability bookkeeping. Built once during `load()`.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    requested: BTreeSet<String>,
    loaded: BTreeSet<String>,
    universe: BTreeSet<String>,
    groups: BTreeMap<String, String>,
}

impl CapabilityRegistry {
    /// Freeze the requested set against the discovered universe.
    ///
    /// Returns the registry together with the effective resolve filter:
    /// empty when everything is kept, otherwise the requested names plus
    /// the mandatory set (mandatory capabilities ride along with any
    /// reduced selection).
    pub fn build(
        requested: BTreeSet<String>,
        universe: BTreeSet<String>,
        groups: BTreeMap<String, String>,
    ) -> (Self, BTreeSet<String>) {
        let filter: BTreeSet<String> = if requested.is_empty() {
            BTreeSet::new()
        } else {
            requested
                .iter()
                .cloned()
                .chain(MANDATORY_CAPABILITIES.iter().map(|name| name.to_string()))
                .collect()
        };

        let loaded = if filter.is_empty() {
            universe.clone()
        } else {
            universe.intersection(&filter).cloned().collect()
        };

        let registry = Self {
            requested,
            loaded,
            universe,
            groups,
        };
        (registry, filter)
    }

    /// Whether the name appears anywhere in the repository, loaded or not
    pub fn is_known(&self, name: &str) -> bool {
        self.universe.contains(name)
    }

    /// Whether the name was kept in memory by the load
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    /// Names kept in memory, in sorted order. Restartable.
    pub fn loaded_names(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(String::as_str)
    }

    /// Number of loaded capability names
    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    /// The names the caller explicitly requested
    pub fn requested(&self) -> &BTreeSet<String> {
        &self.requested
    }

    /// Group the capability was declared under, if any
    pub fn group_of(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// All capability names declared under a group, in sorted order.
    /// Fails with `CapabilityGroupNotFound` for an unknown group.
    pub fn capabilities_in_group(&self, group: &str) -> DetectResult<Vec<String>> {
        let caps: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, declared)| declared.as_str() == group)
            .map(|(name, _)| name.clone())
            .collect();
        if caps.is_empty() {
            return Err(DetectError::CapabilityGroupNotFound(group.to_string()));
        }
        Ok(caps)
    }

    /// Verify that `name` is declared under `group`.
    pub fn check_in_group(&self, group: &str, name: &str) -> DetectResult<()> {
        if !self.groups.values().any(|declared| declared == group) {
            return Err(DetectError::CapabilityGroupNotFound(group.to_string()));
        }
        match self.groups.get(name) {
            Some(declared) if declared == group => Ok(()),
            Some(_) => Err(DetectError::CapabilityGroupMismatch {
                group: group.to_string(),
                name: name.to_string(),
            }),
            None => Err(DetectError::CapabilityNotFound(name.to_string())),
        }
    }

    /// Whether a compute function exists for the virtual capability
    pub fn has_virtual(&self, name: &str) -> bool {
        virtuals::lookup(name).is_some()
    }

    /// Compute a single virtual capability for the given capability set
    pub fn compute_virtual(&self, name: &str, caps: &Capabilities) -> DetectResult<String> {
        let compute = virtuals::lookup(name)
            .ok_or_else(|| DetectError::VirtualCapabilityNotFound(name.to_string()))?;
        Ok(compute(caps))
    }

    /// Compute every virtual capability for the given capability set
    pub fn compute_all_virtuals(&self, caps: &Capabilities) -> Capabilities {
        virtuals::VIRTUAL_CAPABILITIES
            .iter()
            .map(|(name, compute)| (name.to_string(), compute(caps)))
            .collect()
    }
}
