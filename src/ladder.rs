//! Rank ladder
//!
//! Promote and demote move a user between adjacent ranks across the entire
//! group set, independent of inheritance structure.

use crate::group::{Group, GroupRegistry};
use std::cmp::Reverse;

/// The group with the nearest rank strictly above `current`, if any.
/// Ties on rank break by name so the choice is deterministic.
pub fn next_up<'a>(groups: &'a GroupRegistry, current: &Group) -> Option<&'a Group> {
    groups
        .iter()
        .filter(|g| g.rank > current.rank)
        .min_by(|a, b| (a.rank, &a.name).cmp(&(b.rank, &b.name)))
}

/// The group with the nearest rank strictly below `current`, if any.
pub fn next_down<'a>(groups: &'a GroupRegistry, current: &Group) -> Option<&'a Group> {
    groups
        .iter()
        .filter(|g| g.rank < current.rank)
        .max_by(|a, b| (a.rank, Reverse(&a.name)).cmp(&(b.rank, Reverse(&b.name))))
}
