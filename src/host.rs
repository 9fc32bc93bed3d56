//! Host runtime boundary
//!
//! The engine does not implement permission checks, world bookkeeping, or
//! player tracking itself; it drives the hosting server's ambient permission
//! system through this trait. The host is expected to treat a defined token's
//! children map the way attachment-based permission systems do: granting the
//! token grants every child mapped to `true` and forces every child mapped to
//! `false` off, with later-granted tokens overriding earlier ones.

use std::collections::{BTreeSet, HashMap};

/// Surface the hosting server exposes to the engine: online-player
/// enumeration, the world registry, and the ambient permission system.
pub trait PermissionHost {
    /// Whether the named user is currently connected.
    fn is_online(&self, user: &str) -> bool;

    /// World the user is currently in, if connected.
    fn current_world(&self, user: &str) -> Option<String>;

    /// Names of all currently connected users.
    fn online_users(&self) -> Vec<String>;

    /// Names of all known worlds.
    fn worlds(&self) -> Vec<String>;

    /// Register (or replace) a permission token definition whose children
    /// expand when the token is granted.
    fn define(&mut self, token: &str, children: HashMap<String, bool>);

    /// Remove a permission token definition entirely.
    fn undefine(&mut self, token: &str);

    /// Grant `token` to the user's live attachment.
    fn grant(&mut self, user: &str, token: &str);

    /// Remove `token` from the user's live attachment.
    fn revoke(&mut self, user: &str, token: &str);

    /// Tokens currently applied to the user's attachment, in grant order.
    fn applied(&self, user: &str) -> Vec<String>;

    /// Full grant set the user currently holds, after expanding applied
    /// token definitions in grant order.
    fn effective(&self, user: &str) -> BTreeSet<String>;

    /// Whether the user currently holds `node`.
    fn has(&self, user: &str, node: &str) -> bool {
        self.effective(user).contains(node)
    }
}
