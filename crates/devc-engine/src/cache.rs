//! Lookup caches with strict least-recently-used eviction
//!
//! Stage 1 maps normalized user agents to device ids; stage 2 maps device
//! ids to resolved capability sets. Many distinct user agents collapse
//! onto few devices, so the second stage amortizes far better per unit of
//! memory. Each stage sits behind its own `Mutex`, keeping
//! get + promote and insert atomic with respect to the recency order.

use devc_common::{Capabilities, DetectError, DetectResult};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

/// Default stage-1 (user agent to device id) capacity
pub const DEFAULT_USER_AGENT_CACHE_SIZE: usize = 10_000;
/// Default stage-2 (device id to capabilities) capacity
pub const DEFAULT_DEVICE_CACHE_SIZE: usize = 3_000;

/// Cache eviction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheProvider {
    /// No caching; every lookup re-runs matching and resolution
    None,
    /// One map from user agent directly to the resolved device
    Lru,
    /// Two stages: user agent to device id, device id to capabilities
    #[default]
    DoubleLru,
}

impl FromStr for CacheProvider {
    type Err = DetectError;

    fn from_str(s: &str) -> DetectResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lru" => Ok(Self::Lru),
            "double_lru" | "double-lru" | "doublelru" => Ok(Self::DoubleLru),
            other => Err(DetectError::InvalidParameter(format!(
                "unrecognized cache provider {other:?}"
            ))),
        }
    }
}

/// Validated cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    provider: CacheProvider,
    user_agent_entries: NonZeroUsize,
    device_entries: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: CacheProvider::default(),
            user_agent_entries: nonzero(DEFAULT_USER_AGENT_CACHE_SIZE),
            device_entries: nonzero(DEFAULT_DEVICE_CACHE_SIZE),
        }
    }
}

impl CacheConfig {
    /// Validate a provider/sizes combination.
    ///
    /// `None` ignores sizes entirely. `Lru` uses the first size and
    /// defaults to 10000 when none is given. `DoubleLru` uses the first
    /// two sizes and falls back to the defaults (10000, 3000) unless both
    /// are given. An explicitly passed size that is zero or negative
    /// fails with `InvalidCacheSize`.
    pub fn new(provider: CacheProvider, sizes: &[i64]) -> DetectResult<Self> {
        let (user_agent_entries, device_entries) = match provider {
            CacheProvider::None => (
                nonzero(DEFAULT_USER_AGENT_CACHE_SIZE),
                nonzero(DEFAULT_DEVICE_CACHE_SIZE),
            ),
            CacheProvider::Lru => {
                let first = match sizes.first() {
                    None => nonzero(DEFAULT_USER_AGENT_CACHE_SIZE),
                    Some(&size) => checked_size(size)?,
                };
                (first, nonzero(DEFAULT_DEVICE_CACHE_SIZE))
            }
            CacheProvider::DoubleLru => {
                if sizes.len() < 2 {
                    (
                        nonzero(DEFAULT_USER_AGENT_CACHE_SIZE),
                        nonzero(DEFAULT_DEVICE_CACHE_SIZE),
                    )
                } else {
                    (checked_size(sizes[0])?, checked_size(sizes[1])?)
                }
            }
        };

        Ok(Self {
            provider,
            user_agent_entries,
            device_entries,
        })
    }

    /// Configured eviction policy
    pub fn provider(&self) -> CacheProvider {
        self.provider
    }
}

fn checked_size(size: i64) -> DetectResult<NonZeroUsize> {
    usize::try_from(size)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or(DetectError::InvalidCacheSize(size))
}

fn nonzero(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// Cached result of a full lookup.
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    /// Matched device id
    pub id: String,
    /// Effective capability set at lookup time
    pub capabilities: Arc<Capabilities>,
}

/// Which cache stages answered a lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheHits {
    /// Stage 1 (or the single stage) already knew the user agent
    pub user_agent_stage: bool,
    /// Stage 2 already held the device's capability set
    pub device_stage: bool,
}

/// The configured cache stages.
pub enum LookupCache {
    /// No caching
    None,
    /// Single stage: user agent to resolved device
    Single(Mutex<LruCache<String, ResolvedDevice>>),
    /// Two stages: user agent to id, id to capabilities
    Double {
        /// Stage 1
        user_agents: Mutex<LruCache<String, String>>,
        /// Stage 2
        devices: Mutex<LruCache<String, Arc<Capabilities>>>,
    },
}

impl LookupCache {
    /// Instantiate the stages for a validated configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.provider {
            CacheProvider::None => Self::None,
            CacheProvider::Lru => Self::Single(Mutex::new(LruCache::new(config.user_agent_entries))),
            CacheProvider::DoubleLru => Self::Double {
                user_agents: Mutex::new(LruCache::new(config.user_agent_entries)),
                devices: Mutex::new(LruCache::new(config.device_entries)),
            },
        }
    }

    /// Run one lookup through the configured stages, invoking `match_ua`
    /// and `resolve` only on misses.
    pub fn get_or_compute(
        &self,
        user_agent: &str,
        match_ua: impl FnOnce(&str) -> DetectResult<String>,
        resolve: impl FnOnce(&str) -> DetectResult<Arc<Capabilities>>,
    ) -> DetectResult<(ResolvedDevice, CacheHits)> {
        match self {
            Self::None => {
                let id = match_ua(user_agent)?;
                let capabilities = resolve(&id)?;
                Ok((ResolvedDevice { id, capabilities }, CacheHits::default()))
            }
            Self::Single(stage) => {
                if let Some(hit) = stage.lock().get(user_agent).cloned() {
                    let hits = CacheHits {
                        user_agent_stage: true,
                        device_stage: true,
                    };
                    return Ok((hit, hits));
                }
                let id = match_ua(user_agent)?;
                let capabilities = resolve(&id)?;
                let resolved = ResolvedDevice { id, capabilities };
                stage.lock().put(user_agent.to_string(), resolved.clone());
                Ok((resolved, CacheHits::default()))
            }
            Self::Double {
                user_agents,
                devices,
            } => {
                let mut hits = CacheHits::default();

                let cached_id = user_agents.lock().get(user_agent).cloned();
                let id = match cached_id {
                    Some(id) => {
                        hits.user_agent_stage = true;
                        id
                    }
                    None => {
                        let id = match_ua(user_agent)?;
                        user_agents.lock().put(user_agent.to_string(), id.clone());
                        id
                    }
                };

                let cached_caps = devices.lock().get(&id).cloned();
                let capabilities = match cached_caps {
                    Some(capabilities) => {
                        hits.device_stage = true;
                        capabilities
                    }
                    None => {
                        let capabilities = resolve(&id)?;
                        devices.lock().put(id.clone(), capabilities.clone());
                        capabilities
                    }
                };

                Ok((ResolvedDevice { id, capabilities }, hits))
            }
        }
    }

    /// Resolve a device's capability set through the device stage when
    /// one exists. Device-id lookups bypass the user-agent stage.
    pub fn device_capabilities(
        &self,
        device_id: &str,
        resolve: impl FnOnce(&str) -> DetectResult<Arc<Capabilities>>,
    ) -> DetectResult<Arc<Capabilities>> {
        match self {
            Self::Double { devices, .. } => {
                if let Some(capabilities) = devices.lock().get(device_id).cloned() {
                    return Ok(capabilities);
                }
                let capabilities = resolve(device_id)?;
                devices
                    .lock()
                    .put(device_id.to_string(), capabilities.clone());
                Ok(capabilities)
            }
            _ => resolve(device_id),
        }
    }

    /// Entry counts per stage: `(user-agent stage, device stage)`
    pub fn lens(&self) -> (usize, usize) {
        match self {
            Self::None => (0, 0),
            Self::Single(stage) => (stage.lock().len(), 0),
            Self::Double {
                user_agents,
                devices,
            } => (user_agents.lock().len(), devices.lock().len()),
        }
    }
}
