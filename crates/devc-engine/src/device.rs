//! Device handles returned by lookups
//!
//! A handle is an immutable snapshot of the capability set resolved at
//! lookup time. It shares the loaded repository, so it stays valid and
//! answers virtual-capability and group queries on its own.

use crate::engine::LoadedRepository;
use devc_common::{Capabilities, DetectError, DetectResult};
use std::fmt;
use std::sync::Arc;

/// An immutable device resolved from a lookup.
#[derive(Clone)]
pub struct Device {
    id: String,
    capabilities: Arc<Capabilities>,
    shared: Arc<LoadedRepository>,
}

impl Device {
    pub(crate) fn new(
        id: String,
        capabilities: Arc<Capabilities>,
        shared: Arc<LoadedRepository>,
    ) -> Self {
        Self {
            id,
            capabilities,
            shared,
        }
    }

    /// The matched device id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Fetch a capability value
    pub fn capability(&self, name: &str) -> DetectResult<&str> {
        self.capabilities
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| DetectError::CapabilityNotFound(name.to_string()))
    }

    /// Fetch a capability value converted to an integer
    pub fn capability_as_int(&self, name: &str) -> DetectResult<i64> {
        let value = self.capability(name)?;
        value
            .parse()
            .map_err(|_| DetectError::InvalidCapabilityValue {
                name: name.to_string(),
                value: value.to_string(),
            })
    }

    /// Fetch a capability value converted to a boolean
    pub fn capability_as_bool(&self, name: &str) -> DetectResult<bool> {
        let value = self.capability(name)?;
        match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(DetectError::InvalidCapabilityValue {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Whether the capability is present in this snapshot
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// The full resolved capability set
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Fetch a capability after verifying it is declared under `group`
    pub fn capability_in_group(&self, group: &str, name: &str) -> DetectResult<&str> {
        self.shared.registry.check_in_group(group, name)?;
        self.capability(name)
    }

    /// Whether a compute function exists for the virtual capability
    pub fn has_virtual_capability(&self, name: &str) -> bool {
        self.shared.registry.has_virtual(name)
    }

    /// Compute a virtual capability from this snapshot
    pub fn virtual_capability(&self, name: &str) -> DetectResult<String> {
        self.shared
            .registry
            .compute_virtual(name, &self.capabilities)
    }

    /// Compute every virtual capability from this snapshot
    pub fn virtual_capabilities(&self) -> Capabilities {
        self.shared.registry.compute_all_virtuals(&self.capabilities)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities.len())
            .finish()
    }
}
