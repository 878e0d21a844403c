//! Error types for DeviceCore

use std::path::PathBuf;
use thiserror::Error;

/// DeviceCore error type.
///
/// A closed set of error kinds, so callers can match exhaustively instead
/// of comparing against sentinel codes.
#[derive(Error, Debug)]
pub enum DetectError {
    /// Caller passed an invalid argument
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Cache size was zero or negative
    #[error("invalid cache size: {0}")]
    InvalidCacheSize(i64),

    /// Operation is only valid before the repository is loaded
    #[error("repository already loaded")]
    AlreadyLoaded,

    /// Operation requires a loaded repository
    #[error("repository not loaded")]
    NotLoaded,

    /// Unrecognized engine target
    #[error("invalid engine target: {0:?}")]
    InvalidEngineTarget(String),

    /// Repository root or patch file is missing
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Truncated or malformed repository input
    #[error("unexpected end of file or parse error: {0}")]
    UnexpectedEndOfFile(String),

    /// I/O failure while reading the repository
    #[error("I/O failure: {0}")]
    InputOutputFailure(#[from] std::io::Error),

    /// Structurally inconsistent repository, e.g. a device that falls
    /// back to an id that is never defined
    #[error("repository consistency error: {0}")]
    XmlConsistency(String),

    /// Cycle in the device parent chain
    #[error("circular reference in device hierarchy at {0:?}")]
    DeviceHierarchyCircularReference(String),

    /// Device id defined more than once
    #[error("device already defined: {0:?}")]
    DeviceAlreadyDefined(String),

    /// Non-empty user-agent pattern claimed by more than one device
    #[error("user agent already defined: {0:?}")]
    UserAgentAlreadyDefined(String),

    /// Device id not present in the hierarchy
    #[error("device not found: {0:?}")]
    DeviceNotFound(String),

    /// Capability not present for the device
    #[error("capability not found: {0:?}")]
    CapabilityNotFound(String),

    /// Capability value could not be converted to the requested type
    #[error("invalid value {value:?} for capability {name:?}")]
    InvalidCapabilityValue {
        /// Capability name
        name: String,
        /// The stored value that failed conversion
        value: String,
    },

    /// No compute function registered for the virtual capability
    #[error("virtual capability not found: {0:?}")]
    VirtualCapabilityNotFound(String),

    /// Capability group not present in the repository
    #[error("capability group not found: {0:?}")]
    CapabilityGroupNotFound(String),

    /// Capability exists but belongs to a different group
    #[error("capability {name:?} is not in group {group:?}")]
    CapabilityGroupMismatch {
        /// Requested group id
        group: String,
        /// Capability name
        name: String,
    },

    /// Empty id passed to a device lookup
    #[error("missing id in device lookup")]
    EmptyId,

    /// Anything not otherwise classified
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Result type for DeviceCore
pub type DetectResult<T> = Result<T, DetectError>;
