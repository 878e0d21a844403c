//! DeviceCore Detection Engine
//!
//! Resolves a textual user agent to the best-matching device profile and
//! its capability set, over a repository of tens of thousands of device
//! definitions with parent-chain capability inheritance.
//!
//! # Architecture
//!
//! ```text
//! lookup_user_agent(ua)
//!        │
//!        ▼
//! ┌─────────────┐  miss  ┌─────────────┐        ┌────────────────┐
//! │ UA cache    │───────►│   Matcher   │───────►│ Device cache    │
//! │ (ua -> id)  │        │ (3 tiers)   │   id   │ (id -> caps)    │
//! └─────────────┘        └─────────────┘        └────────────────┘
//!        │ hit                                          │ miss
//!        ▼                                              ▼
//!    [Device] ◄───────── snapshot ◄──────── Hierarchy resolve walk
//! ```
//!
//! Configuration (`set_root`, `set_cache_provider`, `request_capability`,
//! `set_engine_target`) happens on a single thread before `load()`; after
//! that the engine takes concurrent lookups without further locking
//! outside the cache stages.

#![warn(missing_docs)]

pub mod cache;
pub mod device;
pub mod engine;
pub mod hierarchy;
pub mod matcher;
pub mod registry;
mod virtuals;

pub use cache::{
    CacheConfig, CacheProvider, DEFAULT_DEVICE_CACHE_SIZE, DEFAULT_USER_AGENT_CACHE_SIZE,
};
pub use device::Device;
pub use engine::{Engine, EngineState, EngineStats, EngineTarget};
pub use hierarchy::HierarchyStore;
pub use matcher::UserAgentMatcher;
pub use registry::CapabilityRegistry;

pub use devc_common::{
    is_mandatory, Capabilities, DetectError, DetectResult, DeviceRecord, MANDATORY_CAPABILITIES,
};
