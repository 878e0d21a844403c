//! Immutable device hierarchy store
//!
//! Built once at load time, then read concurrently without locking.
//! Effective capability sets are resolved by walking a device's parent
//! chain; the nearer a record is to the device, the higher its override
//! precedence.

use devc_common::{Capabilities, DetectError, DetectResult, DeviceRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Device id of the conventional fallback profile.
const GENERIC_DEVICE: &str = "generic";

/// Id-indexed device hierarchy with per-device depth.
#[derive(Debug)]
pub struct HierarchyStore {
    devices: BTreeMap<String, DeviceRecord>,
    depths: BTreeMap<String, u32>,
    default_id: Option<String>,
}

impl HierarchyStore {
    /// Index the records and validate the parent links.
    ///
    /// Fails with `XmlConsistency` when a parent id is never defined and
    /// with `DeviceHierarchyCircularReference` when the parent chain
    /// loops.
    pub fn build(devices: BTreeMap<String, DeviceRecord>) -> DetectResult<Self> {
        for rec in devices.values() {
            if let Some(parent) = &rec.parent {
                if !devices.contains_key(parent) {
                    return Err(DetectError::XmlConsistency(format!(
                        "device {:?} falls back to undefined device {:?}",
                        rec.id, parent
                    )));
                }
            }
        }

        let depths = compute_depths(&devices)?;

        let default_id = if devices.contains_key(GENERIC_DEVICE) {
            Some(GENERIC_DEVICE.to_string())
        } else {
            devices
                .values()
                .filter(|rec| rec.is_root())
                .map(|rec| rec.id.clone())
                .next()
        };

        Ok(Self {
            devices,
            depths,
            default_id,
        })
    }

    /// Number of devices in the hierarchy
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the hierarchy holds no devices
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Whether the id is present
    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Fetch a record by id
    pub fn get(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// Distance from the root, root itself being 0
    pub fn depth(&self, device_id: &str) -> Option<u32> {
        self.depths.get(device_id).copied()
    }

    /// The fallback device id: `generic` when defined, otherwise the
    /// first root in id order
    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    /// All records, in id order
    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Lazy walk from the device to the root, the device itself first.
    /// The iterator is restartable: call again for a fresh walk.
    pub fn ancestors(&self, device_id: &str) -> DetectResult<Ancestors<'_>> {
        let start = self
            .devices
            .get(device_id)
            .ok_or_else(|| DetectError::DeviceNotFound(device_id.to_string()))?;
        Ok(Ancestors {
            devices: &self.devices,
            next: Some(start),
        })
    }

    /// Effective capability set for a device: the union of its own
    /// overrides and every ancestor's, nearer values winning on key
    /// conflicts. A non-empty `filter` restricts the result to the named
    /// capabilities.
    pub fn resolve(&self, device_id: &str, filter: &BTreeSet<String>) -> DetectResult<Capabilities> {
        let mut resolved = Capabilities::new();
        for rec in self.ancestors(device_id)? {
            for (name, value) in &rec.capabilities {
                if !filter.is_empty() && !filter.contains(name) {
                    continue;
                }
                if !resolved.contains_key(name) {
                    resolved.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(resolved)
    }
}

/// Iterator over a device's parent chain. See [`HierarchyStore::ancestors`].
pub struct Ancestors<'a> {
    devices: &'a BTreeMap<String, DeviceRecord>,
    next: Option<&'a DeviceRecord>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a DeviceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let rec = self.next?;
        self.next = rec
            .parent
            .as_deref()
            .and_then(|parent| self.devices.get(parent));
        Some(rec)
    }
}

enum WalkStop {
    Known(u32),
    Root,
}

fn compute_depths(devices: &BTreeMap<String, DeviceRecord>) -> DetectResult<BTreeMap<String, u32>> {
    let mut depths: BTreeMap<String, u32> = BTreeMap::new();

    for start in devices.keys() {
        if depths.contains_key(start) {
            continue;
        }

        let mut chain: Vec<&str> = Vec::new();
        let mut cursor = start.as_str();
        let stop = loop {
            if let Some(&depth) = depths.get(cursor) {
                break WalkStop::Known(depth);
            }
            if chain.iter().any(|&seen| seen == cursor) {
                return Err(DetectError::DeviceHierarchyCircularReference(
                    cursor.to_string(),
                ));
            }
            chain.push(cursor);
            match devices.get(cursor).and_then(|rec| rec.parent.as_deref()) {
                None => break WalkStop::Root,
                Some(parent) => cursor = parent,
            }
        };

        let mut depth = match stop {
            WalkStop::Known(parent_depth) => parent_depth + 1,
            WalkStop::Root => 0,
        };
        for &id in chain.iter().rev() {
            depths.insert(id.to_string(), depth);
            depth += 1;
        }
    }

    Ok(depths)
}
