//! Engine façade
//!
//! Owns the load-once lifecycle: configuration calls are only valid
//! before `load()`, queries only after. Once loaded, the engine is safe
//! for concurrent lookups: hierarchy, matcher and registry are immutable
//! and the cache stages guard their own recency order.

use crate::cache::{CacheConfig, CacheProvider, LookupCache};
use crate::device::Device;
use crate::hierarchy::HierarchyStore;
use crate::matcher::UserAgentMatcher;
use crate::registry::CapabilityRegistry;
use devc_common::{AtomicCounter, DetectError, DetectResult, MANDATORY_CAPABILITIES};
use devc_repo::Repository;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Accuracy/performance trade-off for user-agent matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineTarget {
    /// Enable the slower longest-common-prefix tier for near-miss user
    /// agents
    HighAccuracy,
    /// Exact and substring matching only
    #[default]
    HighPerformance,
}

impl FromStr for EngineTarget {
    type Err = DetectError;

    fn from_str(s: &str) -> DetectResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high_accuracy" | "high-accuracy" | "accuracy" => Ok(Self::HighAccuracy),
            "high_performance" | "high-performance" | "performance" => Ok(Self::HighPerformance),
            other => Err(DetectError::InvalidEngineTarget(other.to_string())),
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Fresh engine; no repository root configured
    Created,
    /// Root configured; ready to load
    RootSet,
    /// Repository loaded; query surface live
    Loaded,
}

/// Everything built by a successful `load()`. Shared with the device
/// handles the engine gives out, so a handle stays valid on its own.
pub(crate) struct LoadedRepository {
    pub(crate) hierarchy: HierarchyStore,
    pub(crate) matcher: UserAgentMatcher,
    pub(crate) registry: CapabilityRegistry,
    pub(crate) cache: LookupCache,
    pub(crate) info: String,
}

/// The device-detection engine.
///
/// ```no_run
/// use devc_engine::{DetectResult, Engine};
///
/// # fn main() -> DetectResult<()> {
/// let mut engine = Engine::new();
/// engine.set_root("/usr/share/devicecore/devices.xml")?;
/// engine.load()?;
///
/// let device = engine.lookup_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8)")?;
/// println!("{} -> {}", device.id(), device.capability("brand_name")?);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    state: EngineState,
    root: Option<PathBuf>,
    patches: Vec<PathBuf>,
    target: EngineTarget,
    cache_config: CacheConfig,
    requested: BTreeSet<String>,
    loaded: Option<Arc<LoadedRepository>>,

    lookups: AtomicCounter,
    user_agent_cache_hits: AtomicCounter,
    device_cache_hits: AtomicCounter,
}

impl Engine {
    /// Create an engine in the `Created` state with the default cache
    /// provider (two-stage LRU, 10000/3000) and the default
    /// `HighPerformance` target.
    pub fn new() -> Self {
        Self {
            state: EngineState::Created,
            root: None,
            patches: Vec::new(),
            target: EngineTarget::default(),
            cache_config: CacheConfig::default(),
            requested: BTreeSet::new(),
            loaded: None,
            lookups: AtomicCounter::new(0),
            user_agent_cache_hits: AtomicCounter::new(0),
            device_cache_hits: AtomicCounter::new(0),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Point the engine at the repository root file. Valid until the
    /// first successful `load()`; re-pointing after a failed load is
    /// allowed.
    pub fn set_root(&mut self, path: impl AsRef<Path>) -> DetectResult<()> {
        self.ensure_not_loaded()?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DetectError::InvalidParameter("empty root path".into()));
        }
        self.root = Some(path.to_path_buf());
        self.state = EngineState::RootSet;
        Ok(())
    }

    /// Queue a patch overlay, applied over the root in call order at
    /// `load()` time.
    pub fn add_patch(&mut self, path: impl AsRef<Path>) -> DetectResult<()> {
        self.ensure_not_loaded()?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DetectError::InvalidParameter("empty patch path".into()));
        }
        self.patches.push(path.to_path_buf());
        Ok(())
    }

    /// Select the matching accuracy/performance trade-off
    pub fn set_engine_target(&mut self, target: EngineTarget) -> DetectResult<()> {
        self.ensure_not_loaded()?;
        self.target = target;
        Ok(())
    }

    /// Currently configured engine target
    pub fn engine_target(&self) -> EngineTarget {
        self.target
    }

    /// Select the caching strategy. See [`CacheConfig::new`] for the
    /// size rules.
    pub fn set_cache_provider(
        &mut self,
        provider: CacheProvider,
        sizes: &[i64],
    ) -> DetectResult<()> {
        self.ensure_not_loaded()?;
        self.cache_config = CacheConfig::new(provider, sizes)?;
        Ok(())
    }

    /// Add a capability to the requested set. With a non-empty requested
    /// set, `load()` keeps only the requested and mandatory capabilities
    /// in memory.
    pub fn request_capability(&mut self, name: &str) -> DetectResult<()> {
        self.ensure_not_loaded()?;
        if name.is_empty() {
            return Err(DetectError::InvalidParameter("empty capability name".into()));
        }
        self.requested.insert(name.to_string());
        Ok(())
    }

    /// Add several capabilities to the requested set
    pub fn request_capabilities<I, S>(&mut self, names: I) -> DetectResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.request_capability(name.as_ref())?;
        }
        Ok(())
    }

    /// Load the repository and freeze the configuration.
    ///
    /// On failure the engine stays in `RootSet` with its configuration
    /// intact, so the caller can fix the input and try again.
    pub fn load(&mut self) -> DetectResult<()> {
        match self.state {
            EngineState::Created => {
                return Err(DetectError::InvalidParameter(
                    "repository root not set".into(),
                ))
            }
            EngineState::Loaded => return Err(DetectError::AlreadyLoaded),
            EngineState::RootSet => {}
        }
        let root = self
            .root
            .clone()
            .ok_or_else(|| DetectError::Unknown("no root in RootSet state".into()))?;

        let repo = Repository::load(&root, &self.patches)?;
        let (registry, filter) =
            CapabilityRegistry::build(self.requested.clone(), repo.universe, repo.groups);

        let mut devices = repo.devices;
        if !filter.is_empty() {
            for rec in devices.values_mut() {
                rec.capabilities.retain(|name, _| filter.contains(name));
            }
        }

        let hierarchy = HierarchyStore::build(devices)?;
        let default_id = hierarchy
            .default_id()
            .map(str::to_string)
            .ok_or_else(|| DetectError::DeviceNotFound("generic".into()))?;
        let matcher = UserAgentMatcher::build(
            hierarchy.records(),
            default_id,
            self.target == EngineTarget::HighAccuracy,
        )?;
        let cache = LookupCache::from_config(&self.cache_config);

        let info = format!(
            "devicecore repository {} ({} devices, {} capabilities)",
            repo.version.as_deref().unwrap_or("unversioned"),
            hierarchy.len(),
            registry.loaded_len(),
        );
        tracing::info!(
            devices = hierarchy.len(),
            capabilities = registry.loaded_len(),
            target = ?self.target,
            provider = ?self.cache_config.provider(),
            "engine loaded"
        );

        self.loaded = Some(Arc::new(LoadedRepository {
            hierarchy,
            matcher,
            registry,
            cache,
            info,
        }));
        self.state = EngineState::Loaded;
        Ok(())
    }

    /// Release the loaded repository and queued configuration.
    /// Idempotent, and safe after a failed `load()`. A never-loaded
    /// engine returns to `Created`; a loaded engine is spent afterwards,
    /// so create a new one to load again.
    pub fn close(&mut self) {
        self.loaded = None;
        self.root = None;
        self.patches.clear();
        self.requested.clear();
        if self.state != EngineState::Loaded {
            self.state = EngineState::Created;
        }
    }

    /// Repository version banner
    pub fn info(&self) -> DetectResult<&str> {
        Ok(self.shared()?.info.as_str())
    }

    /// Whether the capability was kept in memory by the load. Always
    /// `false` before `load()`.
    pub fn has_capability(&self, name: &str) -> bool {
        self.loaded
            .as_ref()
            .map(|shared| shared.registry.is_loaded(name))
            .unwrap_or(false)
    }

    /// Whether the capability name appears anywhere in the loaded
    /// repository, kept in memory or not
    pub fn is_capability_known(&self, name: &str) -> bool {
        self.loaded
            .as_ref()
            .map(|shared| shared.registry.is_known(name))
            .unwrap_or(false)
    }

    /// The fixed, version-stable list of always-loaded capabilities
    pub fn mandatory_capabilities(&self) -> &'static [&'static str] {
        &MANDATORY_CAPABILITIES
    }

    /// All loaded capability names, sorted
    pub fn capabilities(&self) -> DetectResult<Vec<String>> {
        Ok(self
            .shared()?
            .registry
            .loaded_names()
            .map(str::to_string)
            .collect())
    }

    /// All capability names declared under a group, sorted
    pub fn capabilities_in_group(&self, group: &str) -> DetectResult<Vec<String>> {
        self.shared()?.registry.capabilities_in_group(group)
    }

    /// Resolve the best-matching device for a user agent.
    ///
    /// The returned handle is a snapshot: it stays valid however the
    /// engine is used afterwards.
    pub fn lookup_user_agent(&self, user_agent: &str) -> DetectResult<Device> {
        let shared = self.shared()?;
        let user_agent = user_agent.trim();
        if user_agent.is_empty() {
            return Err(DetectError::InvalidParameter("empty user agent".into()));
        }

        self.lookups.inc();
        let (resolved, hits) = shared.cache.get_or_compute(
            user_agent,
            |ua| shared.matcher.match_user_agent(ua).map(str::to_string),
            |id| {
                shared
                    .hierarchy
                    .resolve(id, &BTreeSet::new())
                    .map(Arc::new)
            },
        )?;
        if hits.user_agent_stage {
            self.user_agent_cache_hits.inc();
        }
        if hits.device_stage {
            self.device_cache_hits.inc();
        }

        Ok(Device::new(
            resolved.id,
            resolved.capabilities,
            Arc::clone(shared),
        ))
    }

    /// Fetch a device directly by id, bypassing the matcher
    pub fn lookup_device_id(&self, device_id: &str) -> DetectResult<Device> {
        let shared = self.shared()?;
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(DetectError::EmptyId);
        }
        if !shared.hierarchy.contains(device_id) {
            return Err(DetectError::DeviceNotFound(device_id.to_string()));
        }

        let capabilities = shared.cache.device_capabilities(device_id, |id| {
            shared
                .hierarchy
                .resolve(id, &BTreeSet::new())
                .map(Arc::new)
        })?;
        Ok(Device::new(
            device_id.to_string(),
            capabilities,
            Arc::clone(shared),
        ))
    }

    /// Lookup and cache counters since load
    pub fn stats(&self) -> EngineStats {
        let (user_agent_cache_entries, device_cache_entries) = self
            .loaded
            .as_ref()
            .map(|shared| shared.cache.lens())
            .unwrap_or((0, 0));

        EngineStats {
            lookups: self.lookups.get(),
            user_agent_cache_hits: self.user_agent_cache_hits.get(),
            device_cache_hits: self.device_cache_hits.get(),
            user_agent_cache_entries,
            device_cache_entries,
            devices_loaded: self
                .loaded
                .as_ref()
                .map(|shared| shared.hierarchy.len())
                .unwrap_or(0),
            capabilities_loaded: self
                .loaded
                .as_ref()
                .map(|shared| shared.registry.loaded_len())
                .unwrap_or(0),
        }
    }

    fn shared(&self) -> DetectResult<&Arc<LoadedRepository>> {
        self.loaded.as_ref().ok_or(DetectError::NotLoaded)
    }

    fn ensure_not_loaded(&self) -> DetectResult<()> {
        if self.state == EngineState::Loaded {
            return Err(DetectError::AlreadyLoaded);
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine counters, serializable for observability endpoints
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    /// Lookups since load
    pub lookups: u64,
    /// Stage-1 cache hits
    pub user_agent_cache_hits: u64,
    /// Stage-2 cache hits
    pub device_cache_hits: u64,
    /// Current stage-1 entry count
    pub user_agent_cache_entries: usize,
    /// Current stage-2 entry count
    pub device_cache_entries: usize,
    /// Devices in the hierarchy
    pub devices_loaded: usize,
    /// Capability names kept in memory
    pub capabilities_loaded: usize,
}
