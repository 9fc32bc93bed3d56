//! Error types for the privileges engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type for privileges operations
pub type Result<T> = std::result::Result<T, PrivilegesError>;

/// Main error type for the privileges engine
#[derive(Error, Debug)]
pub enum PrivilegesError {
    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Permission resolution errors
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Command-level errors (reported to the invoker, never fatal)
    #[error("{0}")]
    Command(#[from] CommandError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document load/save errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {kind} document: {message}")]
    Parse { kind: &'static str, message: String },

    #[error("Failed to serialize {kind} document: {message}")]
    Serialize { kind: &'static str, message: String },
}

/// Errors surfaced by the inheritance-tree walk
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A group reaches itself through its own inheritance chain. This is a
    /// configuration error in the groups document, not a crash.
    #[error("inheritance cycle at group '{group}' (via {})", path.join(" -> "))]
    InheritanceCycle { group: String, path: Vec<String> },
}

/// User-facing operation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown world: {0}")]
    UnknownWorld(String),

    #[error("Malformed node argument: {0}")]
    MalformedNode(String),

    #[error("Group '{0}' is the default group and cannot be removed or renamed")]
    DefaultGroupProtected(String),

    #[error("A group named '{0}' already exists")]
    GroupExists(String),

    #[error("Group '{group}' is still referenced by: {}", referents.join(", "))]
    GroupReferenced {
        group: String,
        referents: Vec<String>,
    },

    #[error("No group ranked above '{0}'")]
    NoHigherRank(String),

    #[error("No group ranked below '{0}'")]
    NoLowerRank(String),

    #[error("'{requester}' does not outrank group '{group}'")]
    InsufficientRank { requester: String, group: String },
}
