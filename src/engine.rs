//! Engine facade
//!
//! `Privileges` wires the document store, the group and user registries, the
//! resolver, and the session manager into the operations the command surface
//! and the host's event hooks invoke. Mutating operations follow the same
//! shape throughout: mutate in memory, persist the affected document (a
//! failed save is logged and the in-memory state kept), then refresh the
//! affected live sessions.

use crate::config::{PrivilegesConfig, ReferenceCheck};
use crate::error::{CommandError, Result, StoreError};
use crate::group::{Group, GroupRegistry};
use crate::host::PermissionHost;
use crate::ladder;
use crate::node::{self, ScopedNode};
use crate::resolver::PermissionResolver;
use crate::session::SessionManager;
use crate::store::{DocumentStore, GroupsDoc, UsersDoc};
use crate::user::UserRegistry;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// The permission engine. One instance per hosted server; lifecycle spans
/// enable to disable.
pub struct Privileges {
    store: Box<dyn DocumentStore>,
    config: PrivilegesConfig,
    groups: GroupRegistry,
    users: UserRegistry,
    sessions: SessionManager,
}

impl Privileges {
    /// Load all documents from the store and build the engine.
    pub async fn load(store: Box<dyn DocumentStore>) -> Result<Self> {
        let config = store.load_config().await?;
        config.validate().map_err(|message| StoreError::Parse {
            kind: "config",
            message,
        })?;
        let groups_doc = store.load_groups().await?;
        let users_doc = store.load_users().await?;
        let groups = GroupRegistry::from_doc(groups_doc.groups, &config.default_group);
        let users = UserRegistry::from_doc(users_doc.users);
        info!(
            "loaded {} groups, {} users (default group '{}')",
            groups.len(),
            users.iter().count(),
            config.default_group
        );
        Ok(Self {
            store,
            config,
            groups,
            users,
            sessions: SessionManager::new(),
        })
    }

    pub fn config(&self) -> &PrivilegesConfig {
        &self.config
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ---- persistence -----------------------------------------------------

    /// Persist the groups document. A failed save is logged, not rolled back:
    /// persistence is at-most-eventually-consistent, not transactional.
    async fn persist_groups(&self) {
        let doc = GroupsDoc {
            groups: self.groups.to_doc(),
        };
        if let Err(e) = self.store.save_groups(&doc).await {
            warn!("failed to save groups document: {}", e);
        }
    }

    async fn persist_users(&self) {
        let doc = UsersDoc {
            users: self.users.to_doc(),
        };
        if let Err(e) = self.store.save_users(&doc).await {
            warn!("failed to save users document: {}", e);
        }
    }

    async fn refresh_sessions(&mut self, host: &mut dyn PermissionHost) -> Result<()> {
        let outcome = self.sessions.reload(host, &self.groups, &mut self.users)?;
        if outcome.users_dirty {
            self.persist_users().await;
        }
        Ok(())
    }

    // ---- host events -----------------------------------------------------

    /// A user connected: create their session. Returns `false` when the host
    /// reports them offline.
    pub async fn handle_join(
        &mut self,
        host: &mut dyn PermissionHost,
        user: &str,
    ) -> Result<bool> {
        let outcome = self
            .sessions
            .register(host, &self.groups, &mut self.users, user)?;
        if outcome.users_dirty {
            self.persist_users().await;
        }
        if self.config.debug {
            if let Some(session) = self.sessions.session(user) {
                debug!(
                    "'{}' registered in '{}' as '{}'",
                    session.user, session.world, session.group
                );
            }
        }
        Ok(outcome.registered)
    }

    /// A registered user moved between worlds: re-scope their master tokens.
    pub fn handle_world_change(
        &mut self,
        host: &mut dyn PermissionHost,
        user: &str,
        new_world: &str,
    ) -> Result<()> {
        self.sessions
            .change_world(host, &self.groups, &self.users, user, new_world)?;
        Ok(())
    }

    /// A user disconnected: tear down their session.
    pub fn handle_quit(&mut self, host: &mut dyn PermissionHost, user: &str) -> bool {
        self.sessions.unregister(host, user)
    }

    /// Re-read every document from the store wholesale, then re-register all
    /// connected users against the fresh data.
    pub async fn reload(&mut self, host: &mut dyn PermissionHost) -> Result<usize> {
        let config = self.store.load_config().await?;
        config.validate().map_err(|message| StoreError::Parse {
            kind: "config",
            message,
        })?;
        let groups_doc = self.store.load_groups().await?;
        let users_doc = self.store.load_users().await?;
        self.groups = GroupRegistry::from_doc(groups_doc.groups, &config.default_group);
        self.users = UserRegistry::from_doc(users_doc.users);
        self.config = config;

        let outcome = self.sessions.reload(host, &self.groups, &mut self.users)?;
        if outcome.users_dirty {
            self.persist_users().await;
        }
        info!("reloaded documents, re-registered {} users", outcome.registered);
        Ok(outcome.registered)
    }

    /// Unregister every session. Called at shutdown.
    pub fn disable(&mut self, host: &mut dyn PermissionHost) {
        self.sessions.disable(host);
        info!("session manager disabled");
    }

    // ---- group operations ------------------------------------------------

    /// Materialize an empty group. Idempotent; returns whether it was created.
    pub async fn group_create(&mut self, name: &str) -> Result<bool> {
        let created = self.groups.create(name);
        if created {
            self.persist_groups().await;
        }
        Ok(created)
    }

    pub async fn group_set_rank(&mut self, name: &str, rank: i32) -> Result<()> {
        self.groups.set_rank(name, rank)?;
        self.persist_groups().await;
        Ok(())
    }

    pub async fn group_add_inheritance(
        &mut self,
        host: &mut dyn PermissionHost,
        name: &str,
        parent: &str,
    ) -> Result<()> {
        self.groups.add_inheritance(name, parent)?;
        self.persist_groups().await;
        self.refresh_sessions(host).await
    }

    pub async fn group_remove_inheritance(
        &mut self,
        host: &mut dyn PermissionHost,
        name: &str,
        parent: &str,
    ) -> Result<()> {
        self.groups.remove_inheritance(name, parent)?;
        self.persist_groups().await;
        self.refresh_sessions(host).await
    }

    /// Set a node on a group. `arg` uses command syntax: `node` or
    /// `world:node`, with an optional leading `-` on the node for revocation.
    pub async fn group_perm_set(
        &mut self,
        host: &mut dyn PermissionHost,
        group: &str,
        arg: &str,
    ) -> Result<ScopedNode> {
        let scoped = node::parse_scoped(arg, &host.worlds())?;
        self.groups
            .set_node(group, &scoped.node, scoped.world.as_deref())?;
        self.persist_groups().await;
        self.refresh_sessions(host).await?;
        Ok(scoped)
    }

    pub async fn group_perm_remove(
        &mut self,
        host: &mut dyn PermissionHost,
        group: &str,
        arg: &str,
    ) -> Result<ScopedNode> {
        let scoped = node::parse_scoped(arg, &host.worlds())?;
        self.groups
            .remove_node(group, &scoped.node, scoped.world.as_deref())?;
        self.persist_groups().await;
        self.refresh_sessions(host).await?;
        Ok(scoped)
    }

    /// Rename a group. References to the old name elsewhere are not
    /// rewritten; the configured reference policy decides whether dangling
    /// referents block the operation.
    pub async fn group_rename(
        &mut self,
        host: &mut dyn PermissionHost,
        old: &str,
        new: &str,
    ) -> Result<()> {
        if self.groups.get(old).is_none() {
            return Err(CommandError::UnknownGroup(old.to_string()).into());
        }
        let mut referents = self.groups.referencing_groups(old);
        referents.extend(
            self.users
                .assigned_to(old)
                .into_iter()
                .map(|u| format!("user:{}", u)),
        );
        self.check_references(old, referents)?;
        self.groups.rename(old, new)?;
        self.persist_groups().await;
        self.refresh_sessions(host).await
    }

    /// Remove a group. Other groups' inheritance lists are patched in the
    /// same session; users assigned to it fall back to the default group at
    /// next resolution, subject to the reference policy.
    pub async fn group_remove(
        &mut self,
        host: &mut dyn PermissionHost,
        name: &str,
    ) -> Result<Group> {
        if self.groups.get(name).is_none() {
            return Err(CommandError::UnknownGroup(name.to_string()).into());
        }
        let referents = self
            .users
            .assigned_to(name)
            .into_iter()
            .map(|u| format!("user:{}", u))
            .collect();
        self.check_references(name, referents)?;
        let removed = self.groups.remove(name)?;
        self.persist_groups().await;
        self.refresh_sessions(host).await?;
        Ok(removed)
    }

    fn check_references(&self, group: &str, referents: Vec<String>) -> Result<()> {
        if referents.is_empty() {
            return Ok(());
        }
        match self.config.reference_check {
            ReferenceCheck::Allow => Ok(()),
            ReferenceCheck::Warn => {
                for referent in &referents {
                    warn!("group '{}' is still referenced by {}", group, referent);
                }
                Ok(())
            }
            ReferenceCheck::Block => Err(CommandError::GroupReferenced {
                group: group.to_string(),
                referents,
            }
            .into()),
        }
    }

    // ---- user operations -------------------------------------------------

    /// Assign a user to a group and refresh their session if connected.
    pub async fn user_set_group(
        &mut self,
        host: &mut dyn PermissionHost,
        user: &str,
        group: &str,
    ) -> Result<()> {
        let canonical = self
            .groups
            .get(group)
            .map(|g| g.name.clone())
            .ok_or_else(|| CommandError::UnknownGroup(group.to_string()))?;
        let default_group = self.groups.default_group().name.clone();
        self.users.ensure(user, &default_group, &host.worlds());
        self.users.set_group(user, &canonical)?;
        self.persist_users().await;
        self.sessions
            .register(host, &self.groups, &mut self.users, user)?;
        Ok(())
    }

    /// Set a node on a user, creating their record if needed.
    pub async fn user_perm_set(
        &mut self,
        host: &mut dyn PermissionHost,
        user: &str,
        arg: &str,
    ) -> Result<ScopedNode> {
        let scoped = node::parse_scoped(arg, &host.worlds())?;
        let default_group = self.groups.default_group().name.clone();
        self.users.ensure(user, &default_group, &host.worlds());
        self.users
            .set_node(user, &scoped.node, scoped.world.as_deref())?;
        self.persist_users().await;
        self.refresh_sessions(host).await?;
        Ok(scoped)
    }

    /// Remove a node from a user. Unlike set, this requires an existing
    /// record: there is nothing to remove from an unknown user.
    pub async fn user_perm_remove(
        &mut self,
        host: &mut dyn PermissionHost,
        user: &str,
        arg: &str,
    ) -> Result<ScopedNode> {
        if !self.users.contains(user) {
            return Err(CommandError::UnknownUser(user.to_string()).into());
        }
        let scoped = node::parse_scoped(arg, &host.worlds())?;
        self.users
            .remove_node(user, &scoped.node, scoped.world.as_deref())?;
        self.persist_users().await;
        self.refresh_sessions(host).await?;
        Ok(scoped)
    }

    /// Reset a user to the default group with no nodes of their own.
    pub async fn user_reset(&mut self, host: &mut dyn PermissionHost, user: &str) -> Result<()> {
        if !self.users.contains(user) {
            return Err(CommandError::UnknownUser(user.to_string()).into());
        }
        let default_group = self.groups.default_group().name.clone();
        self.users.reset(user, &default_group, &host.worlds())?;
        self.persist_users().await;
        self.sessions
            .register(host, &self.groups, &mut self.users, user)?;
        Ok(())
    }

    // ---- ladder ----------------------------------------------------------

    /// Move the target to the group with the nearest rank above their
    /// current one. Fails without mutating anything when no such group
    /// exists or the requester does not outrank the destination.
    pub async fn promote(
        &mut self,
        host: &mut dyn PermissionHost,
        requester: Option<&str>,
        target: &str,
    ) -> Result<String> {
        let next_name = {
            let current = self.current_group_of(target);
            let next = ladder::next_up(&self.groups, current)
                .ok_or_else(|| CommandError::NoHigherRank(current.name.clone()))?;
            self.authorize_rank(requester, next)?;
            next.name.clone()
        };
        self.user_set_group(host, target, &next_name).await?;
        info!("'{}' promoted to '{}'", target, next_name);
        Ok(next_name)
    }

    /// Move the target to the group with the nearest rank below their
    /// current one.
    pub async fn demote(
        &mut self,
        host: &mut dyn PermissionHost,
        requester: Option<&str>,
        target: &str,
    ) -> Result<String> {
        let next_name = {
            let current = self.current_group_of(target);
            self.authorize_rank(requester, current)?;
            let next = ladder::next_down(&self.groups, current)
                .ok_or_else(|| CommandError::NoLowerRank(current.name.clone()))?;
            next.name.clone()
        };
        self.user_set_group(host, target, &next_name).await?;
        info!("'{}' demoted to '{}'", target, next_name);
        Ok(next_name)
    }

    /// The group the user currently resolves to: their assigned group when it
    /// exists, otherwise the default group.
    pub fn current_group_of(&self, user: &str) -> &Group {
        self.users
            .get(user)
            .and_then(|u| self.groups.get(&u.group))
            .unwrap_or_else(|| self.groups.default_group())
    }

    /// A requester (when present) must outrank the group in question. The
    /// console passes `None` and is unrestricted.
    fn authorize_rank(&self, requester: Option<&str>, group: &Group) -> Result<()> {
        let Some(name) = requester else {
            return Ok(());
        };
        let requester_rank = self.current_group_of(name).rank;
        if requester_rank > group.rank {
            Ok(())
        } else {
            Err(CommandError::InsufficientRank {
                requester: name.to_string(),
                group: group.name.clone(),
            }
            .into())
        }
    }

    // ---- queries ---------------------------------------------------------

    /// Effective node set for a user in a world (or globally). Users without
    /// a record resolve as fresh members of the default group.
    pub fn resolve(&self, user: &str, world: Option<&str>) -> Result<BTreeSet<String>> {
        let resolver = PermissionResolver::new(&self.groups);
        let set = match self.users.get(user) {
            Some(record) => resolver.resolve_nodes(record, world)?,
            None => resolver.resolve_group_nodes(&self.groups.default_group().name, world)?,
        };
        if self.config.debug {
            debug!(
                "resolved {} nodes for '{}' in {}",
                set.len(),
                user,
                world.unwrap_or("<global>")
            );
        }
        Ok(set)
    }

    /// Effective node set contributed by a group's layers alone.
    pub fn resolve_group(&self, group: &str, world: Option<&str>) -> Result<BTreeSet<String>> {
        let resolver = PermissionResolver::new(&self.groups);
        Ok(resolver.resolve_group_nodes(group, world)?)
    }

    /// Whether the user currently holds `node` according to the ambient
    /// permission system.
    pub fn check(&self, host: &dyn PermissionHost, user: &str, node: &str) -> bool {
        host.has(user, node)
    }

    /// All groups ordered by rank, for ladder listings.
    pub fn ladder(&self) -> Vec<&Group> {
        let mut groups: Vec<&Group> = self.groups.iter().collect();
        groups.sort_by(|a, b| (a.rank, &a.name).cmp(&(b.rank, &b.name)));
        groups
    }
}
