//! Users and the user registry
//!
//! A user record carries the assigned group plus the user's own global and
//! per-world node lists. Records are created lazily on first lookup with the
//! configured default group and are never deleted, only reset.

use crate::error::CommandError;
use crate::node::set_in_list;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A single user record, as persisted in the users document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct User {
    /// Display name. Not serialized; the document keys users by name.
    #[serde(skip)]
    pub name: String,
    /// Assigned group.
    #[serde(default)]
    pub group: String,
    /// Global node list.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// World name -> world-scoped node list.
    #[serde(default)]
    pub worlds: HashMap<String, Vec<String>>,
}

impl User {
    fn fresh(name: &str, default_group: &str, worlds: &[String]) -> Self {
        Self {
            name: name.to_string(),
            group: default_group.to_string(),
            permissions: Vec::new(),
            worlds: worlds.iter().map(|w| (w.clone(), Vec::new())).collect(),
        }
    }

    /// World-scoped node list for `world`, empty if none is stored.
    pub fn world_nodes(&self, world: &str) -> &[String] {
        self.worlds
            .iter()
            .find(|(w, _)| w.eq_ignore_ascii_case(world))
            .map(|(_, nodes)| nodes.as_slice())
            .unwrap_or(&[])
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Owns all known user records, keyed by lowercased name.
#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: HashMap<String, User>,
}

impl UserRegistry {
    pub fn from_doc(doc: HashMap<String, User>) -> Self {
        let mut users: HashMap<String, User> = HashMap::new();
        for (name, mut user) in doc {
            user.name = name.clone();
            users.insert(key(&name), user);
        }
        Self { users }
    }

    pub fn to_doc(&self) -> HashMap<String, User> {
        self.users
            .values()
            .map(|u| (u.name.clone(), u.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&User> {
        self.users.get(&key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.contains_key(&key(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Get the record for `name`, creating it with the default group and an
    /// empty node list per known world if absent. Returns whether a new record
    /// was created so the caller can persist the document.
    pub fn ensure(
        &mut self,
        name: &str,
        default_group: &str,
        worlds: &[String],
    ) -> (&mut User, bool) {
        let k = key(name);
        let created = !self.users.contains_key(&k);
        if created {
            debug!(
                "new user record for '{}' with default group '{}'",
                name, default_group
            );
        }
        let user = self
            .users
            .entry(k)
            .or_insert_with(|| User::fresh(name, default_group, worlds));
        (user, created)
    }

    pub fn set_group(&mut self, name: &str, group: &str) -> Result<(), CommandError> {
        let user = self
            .users
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
        user.group = group.to_string();
        Ok(())
    }

    /// Set a node on the user, replacing any stored token of the opposite
    /// polarity.
    pub fn set_node(
        &mut self,
        name: &str,
        node: &str,
        world: Option<&str>,
    ) -> Result<(), CommandError> {
        let user = self
            .users
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
        let list = match world {
            Some(w) => user.worlds.entry(w.to_string()).or_default(),
            None => &mut user.permissions,
        };
        set_in_list(list, node, Some(node));
        Ok(())
    }

    /// Remove a node from the user. Both the grant and revocation forms are
    /// dropped.
    pub fn remove_node(
        &mut self,
        name: &str,
        node: &str,
        world: Option<&str>,
    ) -> Result<(), CommandError> {
        let user = self
            .users
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
        let list = match world {
            Some(w) => user.worlds.entry(w.to_string()).or_default(),
            None => &mut user.permissions,
        };
        set_in_list(list, node, None);
        Ok(())
    }

    /// Reset the user to defaults: default group, no nodes.
    pub fn reset(
        &mut self,
        name: &str,
        default_group: &str,
        worlds: &[String],
    ) -> Result<(), CommandError> {
        let user = self
            .users
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownUser(name.to_string()))?;
        let display = user.name.clone();
        *user = User::fresh(&display, default_group, worlds);
        Ok(())
    }

    /// Display names of users assigned to `group`.
    pub fn assigned_to(&self, group: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .users
            .values()
            .filter(|u| u.group.eq_ignore_ascii_case(group))
            .map(|u| u.name.clone())
            .collect();
        names.sort();
        names
    }
}
