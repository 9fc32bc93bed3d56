//! Live session management
//!
//! One session exists per connected user. Registering a user resolves their
//! group, builds a fresh attachment, and applies two master tokens scoped to
//! the user's current world: the group master and the user's personal master.
//! The host expands those tokens to the resolved node sets registered against
//! them, so the applied permission state always tracks the documents as long
//! as sessions are refreshed after edits.

use crate::error::ResolveError;
use crate::group::GroupRegistry;
use crate::host::PermissionHost;
use crate::node;
use crate::resolver::PermissionResolver;
use crate::user::{User, UserRegistry};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Binding between a connected user and their applied master tokens.
#[derive(Debug, Clone)]
pub struct Session {
    /// Display name of the user.
    pub user: String,
    /// Group the user resolved to at registration time.
    pub group: String,
    /// World the master tokens are currently scoped to.
    pub world: String,
    attachment: Vec<String>,
}

impl Session {
    /// Master tokens currently granted through this session, in grant order.
    pub fn attachment(&self) -> &[String] {
        &self.attachment
    }
}

/// Result of a single registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Whether a session was (re)created. `false` means the user was offline.
    pub registered: bool,
    /// Whether the user registry changed (lazy creation or group fallback)
    /// and the users document should be persisted.
    pub users_dirty: bool,
}

/// Result of a bulk re-registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub registered: usize,
    pub users_dirty: bool,
}

/// Tracks every connected user's session. Owned state; the manager's
/// lifecycle is the engine's lifecycle.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

fn key(user: &str) -> String {
    user.trim().to_lowercase()
}

/// Master-token definitions for a user on one world.
///
/// The group master expands to the group-layer grant set. The personal master
/// expands to the user's full effective set, plus an explicit `false` child
/// for every group-granted token the user layers revoke, so that it cancels
/// the group master's grants when applied after it.
fn master_definitions(
    groups: &GroupRegistry,
    user: &User,
    world: &str,
) -> Result<[(String, HashMap<String, bool>); 2], ResolveError> {
    let resolver = PermissionResolver::new(groups);
    let group_set = resolver.resolve_group_nodes(&user.group, Some(world))?;
    let full_set = resolver.resolve_nodes(user, Some(world))?;

    let group_children: HashMap<String, bool> =
        group_set.iter().map(|n| (n.clone(), true)).collect();

    let mut user_children: HashMap<String, bool> =
        full_set.iter().map(|n| (n.clone(), true)).collect();
    for revoked in group_set.difference(&full_set) {
        user_children.insert(revoked.clone(), false);
    }

    Ok([
        (node::group_master(&user.group, world), group_children),
        (node::user_master(&user.name, world), user_children),
    ])
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, user: &str) -> Option<&Session> {
        self.sessions.get(&key(user))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a connected user: resolve their group (correcting a dangling
    /// assignment to the default group), clear stale applied entries, and
    /// apply fresh master tokens for the user's current world.
    ///
    /// Offline users are skipped with a debug log and a negative result.
    /// Registration is idempotent: a second call rebuilds the same state.
    pub fn register(
        &mut self,
        host: &mut dyn PermissionHost,
        groups: &GroupRegistry,
        users: &mut UserRegistry,
        user: &str,
    ) -> Result<RegisterOutcome, ResolveError> {
        let skipped = RegisterOutcome {
            registered: false,
            users_dirty: false,
        };
        if !host.is_online(user) {
            debug!("attempted registration of offline or unknown user '{}'", user);
            return Ok(skipped);
        }
        let Some(world) = host.current_world(user) else {
            debug!("user '{}' is online but has no world, skipping", user);
            return Ok(skipped);
        };

        let default_group = groups.default_group().name.clone();
        let known_worlds = host.worlds();
        let (record, created) = users.ensure(user, &default_group, &known_worlds);
        let mut users_dirty = created;
        if groups.get(&record.group).is_none() {
            warn!(
                "user '{}' was assigned to missing group '{}', falling back to '{}'",
                user, record.group, default_group
            );
            record.group = default_group;
            users_dirty = true;
        }
        let record = &*record;

        // Resolve before touching the host so a configuration error leaves
        // the previous attachment intact.
        let definitions = master_definitions(groups, record, &world)?;

        for stale in host.applied(user) {
            host.revoke(user, &stale);
        }

        let mut attachment = Vec::with_capacity(definitions.len());
        for (token, children) in definitions {
            host.define(&token, children);
            host.grant(user, &token);
            attachment.push(token);
        }

        self.sessions.insert(
            key(user),
            Session {
                user: record.name.clone(),
                group: record.group.clone(),
                world,
                attachment,
            },
        );
        Ok(RegisterOutcome {
            registered: true,
            users_dirty,
        })
    }

    /// Re-scope the user's master tokens from their old world to `new_world`.
    ///
    /// Panics if the user has no session: a world change without a prior
    /// successful registration is a bug in the embedding server, not a
    /// recoverable state.
    pub fn change_world(
        &mut self,
        host: &mut dyn PermissionHost,
        groups: &GroupRegistry,
        users: &UserRegistry,
        user: &str,
        new_world: &str,
    ) -> Result<(), ResolveError> {
        let session = self
            .sessions
            .get_mut(&key(user))
            .expect("world change for a user without a session; register must run first");
        let record = users
            .get(user)
            .expect("registered session without a user record");

        let definitions = master_definitions(groups, record, new_world)?;

        for token in &session.attachment {
            host.revoke(user, token);
        }
        let mut attachment = Vec::with_capacity(definitions.len());
        for (token, children) in definitions {
            host.define(&token, children);
            host.grant(user, &token);
            attachment.push(token);
        }

        session.group = record.group.clone();
        session.world = new_world.to_string();
        session.attachment = attachment;
        Ok(())
    }

    /// Remove the user's session and attachment, and drop their personal
    /// master token definitions for every known world so nothing dangles in
    /// the ambient permission system.
    pub fn unregister(&mut self, host: &mut dyn PermissionHost, user: &str) -> bool {
        match self.sessions.remove(&key(user)) {
            Some(session) => {
                for token in &session.attachment {
                    host.revoke(user, token);
                }
                for world in host.worlds() {
                    host.undefine(&node::user_master(&session.user, &world));
                }
                debug!("'{}' was unregistered", user);
                true
            }
            None => {
                debug!("'{}' was already unregistered", user);
                false
            }
        }
    }

    /// Re-register every connected user. Used after bulk data changes to
    /// force recomputation of applied permissions.
    pub fn reload(
        &mut self,
        host: &mut dyn PermissionHost,
        groups: &GroupRegistry,
        users: &mut UserRegistry,
    ) -> Result<ReloadOutcome, ResolveError> {
        let mut outcome = ReloadOutcome {
            registered: 0,
            users_dirty: false,
        };
        for name in host.online_users() {
            let result = self.register(host, groups, users, &name)?;
            if result.registered {
                outcome.registered += 1;
            }
            outcome.users_dirty |= result.users_dirty;
        }
        Ok(outcome)
    }

    /// Unregister every tracked session. Used at shutdown.
    pub fn disable(&mut self, host: &mut dyn PermissionHost) {
        let names: Vec<String> = self.sessions.values().map(|s| s.user.clone()).collect();
        for name in names {
            self.unregister(host, &name);
        }
    }
}
