//! Privileges Core Library
//!
//! Role-based permission resolution for multi-world game servers: group
//! inheritance trees, node merging with revocation semantics, live session
//! attachments, and the promote/demote rank ladder.
//!
//! The engine is host-agnostic; servers embed it by implementing
//! [`PermissionHost`] and feeding join/world-change/quit events to
//! [`Privileges`].

pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod host;
pub mod ladder;
pub mod node;
pub mod resolver;
pub mod session;
pub mod store;
pub mod user;

// Re-exports for convenience
pub use config::{PrivilegesConfig, ReferenceCheck};
pub use engine::Privileges;
pub use error::*;
pub use group::{Group, GroupRegistry};
pub use host::PermissionHost;
pub use node::ScopedNode;
pub use resolver::PermissionResolver;
pub use session::{RegisterOutcome, ReloadOutcome, Session, SessionManager};
pub use store::{DocumentStore, GroupsDoc, MemoryStore, UsersDoc, YamlStore};
pub use user::{User, UserRegistry};
