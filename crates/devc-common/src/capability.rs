//! Capability naming

use std::collections::BTreeMap;

/// Capability name to string-value mapping.
///
/// A `BTreeMap` keeps enumeration order deterministic.
pub type Capabilities = BTreeMap<String, String>;

/// Capabilities the engine always loads, regardless of the requested set.
///
/// The order is stable and part of the public contract.
pub const MANDATORY_CAPABILITIES: [&str; 16] = [
    "device_os",
    "device_os_version",
    "is_tablet",
    "is_wireless_device",
    "pointing_method",
    "preferred_markup",
    "resolution_height",
    "resolution_width",
    "ux_full_desktop",
    "xhtml_support_level",
    "is_smarttv",
    "can_assign_phone_number",
    "brand_name",
    "model_name",
    "marketing_name",
    "mobile_browser_version",
];

/// Check whether a capability is in the mandatory set
pub fn is_mandatory(name: &str) -> bool {
    MANDATORY_CAPABILITIES.contains(&name)
}
