//! Device records produced by the repository loader

use crate::capability::Capabilities;
use serde::{Deserialize, Serialize};

/// A single device profile as it appears in the repository.
///
/// Only locally-overridden capabilities are stored; the effective set for a
/// device is resolved against its parent chain by the hierarchy store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique device id
    pub id: String,
    /// Parent device id; `None` for the hierarchy root
    pub parent: Option<String>,
    /// User-agent pattern used for matching; may be empty for devices that
    /// are only reachable through fallback
    pub user_agent: String,
    /// Marks a real hardware profile rather than a user-agent-variant
    /// subtree
    pub actual_device_root: bool,
    /// Locally-overridden capability values
    pub capabilities: Capabilities,
}

impl DeviceRecord {
    /// Create an empty record with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: None,
            user_agent: String::new(),
            actual_device_root: false,
            capabilities: Capabilities::new(),
        }
    }

    /// Whether this record is a hierarchy root
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
