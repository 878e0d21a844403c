//! Device repository loader
//!
//! Reads the on-disk XML device-definition format into [`DeviceRecord`]s
//! and merges patch overlays over the root repository. The loader only
//! validates file-level structure (duplicate ids, duplicate user-agent
//! patterns, malformed XML); hierarchy validation such as cycle detection
//! belongs to the engine's hierarchy store.

#![warn(missing_docs)]

mod xml;

use devc_common::{DetectError, DetectResult, DeviceRecord};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

/// A parsed device repository: the device records plus the metadata the
/// engine needs to build its indexes.
#[derive(Debug, Default)]
pub struct Repository {
    /// Device records keyed by id
    pub devices: BTreeMap<String, DeviceRecord>,
    /// Version string from the root repository file, if present
    pub version: Option<String>,
    /// Every capability name seen in the input, including names a reduced
    /// requested set later keeps out of memory
    pub universe: BTreeSet<String>,
    /// Capability name to group id
    pub groups: BTreeMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// Root repository: redefining an id is an error
    Root,
    /// Patch overlay: existing devices are merged, new ones added
    Patch,
}

impl Repository {
    /// Load the root repository and apply patch overlays in order.
    pub fn load(root: &Path, patches: &[impl AsRef<Path>]) -> DetectResult<Self> {
        let mut repo = Self::default();
        repo.merge_file(root, MergeMode::Root)?;
        for patch in patches {
            repo.merge_file(patch.as_ref(), MergeMode::Patch)?;
        }

        if repo.devices.is_empty() {
            return Err(DetectError::XmlConsistency(
                "repository defines no devices".into(),
            ));
        }
        repo.validate_user_agents()?;

        tracing::info!(
            devices = repo.devices.len(),
            capabilities = repo.universe.len(),
            patches = patches.len(),
            "repository loaded"
        );
        Ok(repo)
    }

    fn merge_file(&mut self, path: &Path, mode: MergeMode) -> DetectResult<()> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(DetectError::FileNotFound(path.to_path_buf()))
            }
            Err(err) => return Err(DetectError::InputOutputFailure(err)),
        };

        let doc = xml::parse(&text)?;
        if mode == MergeMode::Root {
            self.version = doc.version;
        }
        for (capability, group) in doc.groups {
            self.groups.entry(capability).or_insert(group);
        }

        let mut seen_in_file = BTreeSet::new();
        for rec in doc.devices {
            if !seen_in_file.insert(rec.id.clone()) {
                return Err(DetectError::DeviceAlreadyDefined(rec.id));
            }
            self.universe.extend(rec.capabilities.keys().cloned());

            match self.devices.entry(rec.id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(rec);
                }
                Entry::Occupied(mut slot) => {
                    if mode == MergeMode::Root {
                        return Err(DetectError::DeviceAlreadyDefined(rec.id));
                    }
                    merge_patch_record(slot.get_mut(), rec);
                }
            }
        }
        Ok(())
    }

    /// Non-empty user-agent patterns must be unique across the final set.
    fn validate_user_agents(&self) -> DetectResult<()> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (id, rec) in &self.devices {
            if rec.user_agent.is_empty() {
                continue;
            }
            if let Some(owner) = seen.insert(&rec.user_agent, id) {
                tracing::warn!(
                    user_agent = %rec.user_agent,
                    first = owner,
                    second = %id,
                    "duplicate user-agent pattern"
                );
                return Err(DetectError::UserAgentAlreadyDefined(rec.user_agent.clone()));
            }
        }
        Ok(())
    }
}

/// Overlay a patch record onto an existing device: capability overrides
/// are merged with the patch winning, parent and user-agent are replaced
/// only when the patch specifies them.
fn merge_patch_record(base: &mut DeviceRecord, patch: DeviceRecord) {
    if let Some(parent) = patch.parent {
        base.parent = Some(parent);
    }
    if !patch.user_agent.is_empty() {
        base.user_agent = patch.user_agent;
    }
    if patch.actual_device_root {
        base.actual_device_root = true;
    }
    base.capabilities.extend(patch.capabilities);
}
