//! Groups and the group registry
//!
//! A group is a named role with a rank, an ordered list of inherited parent
//! groups, a global node list, and per-world node lists. The registry keys
//! groups by lowercased name; lookups are case-insensitive everywhere.

use crate::error::CommandError;
use crate::node::set_in_list;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A single group record, as persisted in the groups document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Group {
    /// Display name. Not serialized; the document keys groups by name.
    #[serde(skip)]
    pub name: String,
    /// Ladder position. Used only for promote/demote ordering; ranks are not
    /// required to be unique.
    #[serde(default)]
    pub rank: i32,
    /// Parent groups, applied in listed order during resolution.
    #[serde(default)]
    pub inheritance: Vec<String>,
    /// Global node list.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// World name -> world-scoped node list.
    #[serde(default)]
    pub worlds: HashMap<String, Vec<String>>,
}

impl Group {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// World-scoped node list for `world`, empty if none is configured.
    pub fn world_nodes(&self, world: &str) -> &[String] {
        self.worlds
            .iter()
            .find(|(w, _)| w.eq_ignore_ascii_case(world))
            .map(|(_, nodes)| nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Whether this group lists `parent` in its inheritance.
    pub fn inherits(&self, parent: &str) -> bool {
        self.inheritance.iter().any(|p| p.eq_ignore_ascii_case(parent))
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Owns the set of groups and the identity of the default group.
///
/// The default group is materialized at construction and protected from
/// removal and rename, so it always resolves.
#[derive(Debug, Clone)]
pub struct GroupRegistry {
    groups: HashMap<String, Group>,
    default_key: String,
}

impl GroupRegistry {
    /// Build the registry from a loaded groups document. Missing default group
    /// is materialized; dangling inheritance references are logged.
    pub fn from_doc(doc: HashMap<String, Group>, default_group: &str) -> Self {
        let mut groups: HashMap<String, Group> = HashMap::new();
        for (name, mut group) in doc {
            group.name = name.clone();
            groups.insert(key(&name), group);
        }

        let default_key = key(default_group);
        if !groups.contains_key(&default_key) {
            debug!("materializing missing default group '{}'", default_group);
            groups.insert(default_key.clone(), Group::named(default_group));
        }

        let registry = Self { groups, default_key };
        for group in registry.groups.values() {
            for parent in &group.inheritance {
                if registry.get(parent).is_none() {
                    warn!(
                        "group '{}' inherits unknown group '{}'",
                        group.name, parent
                    );
                }
            }
        }
        registry
    }

    /// Export the registry as a persistable document tree.
    pub fn to_doc(&self) -> HashMap<String, Group> {
        self.groups
            .values()
            .map(|g| (g.name.clone(), g.clone()))
            .collect()
    }

    /// Look up a group. Absence is a valid result, not an error.
    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(&key(name))
    }

    /// The always-present default group.
    pub fn default_group(&self) -> &Group {
        self.groups
            .get(&self.default_key)
            .expect("default group is materialized at construction")
    }

    /// All groups, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Materialize an empty group. Idempotent: returns `false` if the group
    /// already exists.
    pub fn create(&mut self, name: &str) -> bool {
        let k = key(name);
        if self.groups.contains_key(&k) {
            return false;
        }
        self.groups.insert(k, Group::named(name));
        true
    }

    pub fn set_rank(&mut self, name: &str, rank: i32) -> Result<(), CommandError> {
        let group = self
            .groups
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        group.rank = rank;
        Ok(())
    }

    /// Append `parent` to the group's inheritance list. No cycle detection is
    /// performed here; cycles are surfaced by the resolver as configuration
    /// errors.
    pub fn add_inheritance(&mut self, name: &str, parent: &str) -> Result<(), CommandError> {
        let group = self
            .groups
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        if !group.inherits(parent) {
            group.inheritance.push(parent.to_string());
        }
        Ok(())
    }

    pub fn remove_inheritance(&mut self, name: &str, parent: &str) -> Result<(), CommandError> {
        let group = self
            .groups
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        group.inheritance.retain(|p| !p.eq_ignore_ascii_case(parent));
        Ok(())
    }

    /// Set a node on the group, replacing any stored token of the opposite
    /// polarity. `world` scopes the node to that world's list.
    pub fn set_node(
        &mut self,
        name: &str,
        node: &str,
        world: Option<&str>,
    ) -> Result<(), CommandError> {
        let group = self
            .groups
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        let list = match world {
            Some(w) => group.worlds.entry(w.to_string()).or_default(),
            None => &mut group.permissions,
        };
        set_in_list(list, node, Some(node));
        Ok(())
    }

    /// Remove a node from the group. Both the grant and revocation forms of
    /// the token are dropped.
    pub fn remove_node(
        &mut self,
        name: &str,
        node: &str,
        world: Option<&str>,
    ) -> Result<(), CommandError> {
        let group = self
            .groups
            .get_mut(&key(name))
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        let list = match world {
            Some(w) => group.worlds.entry(w.to_string()).or_default(),
            None => &mut group.permissions,
        };
        set_in_list(list, node, None);
        Ok(())
    }

    /// Move the group record to a new name. References elsewhere (inheritance
    /// lists, user assignments) are not rewritten; the engine applies the
    /// configured reference policy before calling this.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), CommandError> {
        let old_key = key(old);
        if old_key == self.default_key {
            return Err(CommandError::DefaultGroupProtected(old.to_string()));
        }
        if !self.groups.contains_key(&old_key) {
            return Err(CommandError::UnknownGroup(old.to_string()));
        }
        let new_key = key(new);
        if new_key != old_key && self.groups.contains_key(&new_key) {
            return Err(CommandError::GroupExists(new.to_string()));
        }
        let mut group = self
            .groups
            .remove(&old_key)
            .ok_or_else(|| CommandError::UnknownGroup(old.to_string()))?;
        group.name = new.to_string();
        self.groups.insert(new_key, group);
        Ok(())
    }

    /// Delete the group and patch every other group's inheritance list that
    /// referenced it. Users assigned to it keep their assignment and fall back
    /// to the default group at next resolution.
    pub fn remove(&mut self, name: &str) -> Result<Group, CommandError> {
        let k = key(name);
        if k == self.default_key {
            return Err(CommandError::DefaultGroupProtected(name.to_string()));
        }
        let removed = self
            .groups
            .remove(&k)
            .ok_or_else(|| CommandError::UnknownGroup(name.to_string()))?;
        for group in self.groups.values_mut() {
            group.inheritance.retain(|p| !p.eq_ignore_ascii_case(name));
        }
        Ok(removed)
    }

    /// Display names of groups whose inheritance lists reference `name`.
    pub fn referencing_groups(&self, name: &str) -> Vec<String> {
        let mut referents: Vec<String> = self
            .groups
            .values()
            .filter(|g| g.inherits(name))
            .map(|g| g.name.clone())
            .collect();
        referents.sort();
        referents
    }
}
