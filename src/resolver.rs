//! Permission resolution
//!
//! Two computations live here. `resolve_tree` expands a group's inheritance
//! into an ordered sequence of group names, ancestors first, target last.
//! `resolve_nodes` folds the node lists of those groups plus the user's own
//! lists into the final effective grant set.
//!
//! Layer order is load-bearing: ancestor groups, then the target group, then
//! user global nodes, then user world nodes. A revocation from a later layer
//! must be able to cancel a grant from an earlier one and vice versa, so
//! layers are never reordered or batched.

use crate::error::ResolveError;
use crate::group::GroupRegistry;
use crate::node;
use crate::user::User;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Computes inheritance trees and effective node sets against a group
/// registry snapshot.
pub struct PermissionResolver<'a> {
    groups: &'a GroupRegistry,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(groups: &'a GroupRegistry) -> Self {
        Self { groups }
    }

    /// Ordered inheritance tree for `group`: ancestors strictly before their
    /// descendants, the target group exactly once at the tail.
    ///
    /// A group listing itself directly in its own inheritance is skipped.
    /// Indirect cycles are detected with a recursion-path guard and reported
    /// as a configuration error. The guard tracks only the current chain, so
    /// diamond inheritance still contributes a group once per path; the merge
    /// step tolerates the duplicates.
    pub fn resolve_tree(&self, group: &str) -> Result<Vec<String>, ResolveError> {
        let mut tree = Vec::new();
        let mut path = vec![group.to_lowercase()];
        for parent in self.inheritance_of(group) {
            if parent.eq_ignore_ascii_case(group) {
                continue;
            }
            self.backward(&parent, &mut path, &mut tree)?;
        }
        tree.push(self.canonical(group));
        Ok(tree)
    }

    /// Depth-first expansion of `group` and its ancestors, ancestors first.
    fn backward(
        &self,
        group: &str,
        path: &mut Vec<String>,
        tree: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        let k = group.to_lowercase();
        if path.contains(&k) {
            let mut cycle = path.clone();
            cycle.push(k);
            return Err(ResolveError::InheritanceCycle {
                group: group.to_string(),
                path: cycle,
            });
        }
        path.push(k);
        for parent in self.inheritance_of(group) {
            if parent.eq_ignore_ascii_case(group) {
                continue;
            }
            self.backward(&parent, path, tree)?;
        }
        path.pop();
        tree.push(self.canonical(group));
        Ok(())
    }

    fn inheritance_of(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|g| g.inheritance.clone())
            .unwrap_or_default()
    }

    fn canonical(&self, group: &str) -> String {
        self.groups
            .get(group)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| group.to_string())
    }

    /// Effective grant set contributed by the group layers alone. This is
    /// what the group master token expands to for a given world.
    pub fn resolve_group_nodes(
        &self,
        group: &str,
        world: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        let mut set = BTreeSet::new();
        for name in self.resolve_tree(group)? {
            let Some(g) = self.groups.get(&name) else {
                debug!("group '{}' in tree is not configured, skipping", name);
                continue;
            };
            for token in &g.permissions {
                node::apply(&mut set, token);
            }
            // World nodes override the same group's global nodes.
            if let Some(w) = world {
                for token in g.world_nodes(w) {
                    node::apply(&mut set, token);
                }
            }
        }
        Ok(set)
    }

    /// Full effective grant set for a user: group layers, then the user's
    /// global nodes, then the user's world nodes. Revocation tokens never
    /// appear in the result.
    ///
    /// A user assigned to a missing group resolves against the default group;
    /// correcting the stored record is the session manager's job.
    pub fn resolve_nodes(
        &self,
        user: &User,
        world: Option<&str>,
    ) -> Result<BTreeSet<String>, ResolveError> {
        let assigned = match self.groups.get(&user.group) {
            Some(g) => g.name.clone(),
            None => {
                warn!(
                    "user '{}' is assigned to unknown group '{}', resolving against default",
                    user.name, user.group
                );
                self.groups.default_group().name.clone()
            }
        };
        let mut set = self.resolve_group_nodes(&assigned, world)?;
        for token in &user.permissions {
            node::apply(&mut set, token);
        }
        if let Some(w) = world {
            for token in user.world_nodes(w) {
                node::apply(&mut set, token);
            }
        }
        Ok(set)
    }
}
