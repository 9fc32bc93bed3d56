//! Permission node tokens
//!
//! A node is a plain string capability token. A leading `-` marks a revocation
//! of the bare token rather than a grant. Command arguments may carry a
//! `world:node` prefix, which is split into world and node before storage.

use crate::error::CommandError;
use std::collections::BTreeSet;

/// Whether the token revokes rather than grants.
pub fn is_revocation(token: &str) -> bool {
    token.starts_with('-')
}

/// The token without its revocation marker, if any.
pub fn bare(token: &str) -> &str {
    token.strip_prefix('-').unwrap_or(token)
}

/// Apply one token to an accumulating grant set: a revocation removes the bare
/// token, a grant inserts it. Later layers call this after earlier ones, so a
/// grant can re-add a previously revoked token and vice versa.
pub fn apply(set: &mut BTreeSet<String>, token: &str) {
    match token.strip_prefix('-') {
        Some(stripped) => {
            set.remove(stripped);
        }
        None => {
            set.insert(token.to_string());
        }
    }
}

/// Replace any stored polarity of `node` in a persisted node list with the
/// given token, or drop both forms when `replacement` is `None`.
pub(crate) fn set_in_list(list: &mut Vec<String>, node: &str, replacement: Option<&str>) {
    let stripped = node.strip_prefix('-').unwrap_or(node);
    list.retain(|n| {
        let b = n.strip_prefix('-').unwrap_or(n);
        !b.eq_ignore_ascii_case(stripped)
    });
    if let Some(token) = replacement {
        list.push(token.to_string());
    }
}

/// A node argument with an optional world scope, as parsed from command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedNode {
    pub world: Option<String>,
    pub node: String,
}

/// Parse a `world:node` or bare `node` command argument.
///
/// The world part must name a known world; the node part must be non-empty.
/// The revocation marker stays attached to the node part, so `world:-a.b`
/// stores `-a.b` under `world`.
pub fn parse_scoped(arg: &str, worlds: &[String]) -> Result<ScopedNode, CommandError> {
    match arg.split_once(':') {
        None => {
            if arg.is_empty() {
                return Err(CommandError::MalformedNode(arg.to_string()));
            }
            Ok(ScopedNode {
                world: None,
                node: arg.to_string(),
            })
        }
        Some((world, node)) => {
            if world.is_empty() || node.is_empty() {
                return Err(CommandError::MalformedNode(arg.to_string()));
            }
            let known = worlds.iter().find(|w| w.eq_ignore_ascii_case(world));
            match known {
                Some(w) => Ok(ScopedNode {
                    world: Some(w.clone()),
                    node: node.to_string(),
                }),
                None => Err(CommandError::UnknownWorld(world.to_string())),
            }
        }
    }
}

/// Master token granted to every member of a group on a given world. The
/// ambient permission system expands it to the group's resolved node set.
pub fn group_master(group: &str, world: &str) -> String {
    format!(
        "privileges.group.{}.{}",
        group.to_lowercase(),
        world.to_lowercase()
    )
}

/// Per-user master token for a given world; expands to the user's full
/// effective node set.
pub fn user_master(user: &str, world: &str) -> String {
    format!(
        "privileges.user.{}.{}",
        user.to_lowercase(),
        world.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worlds() -> Vec<String> {
        vec!["world".to_string(), "nether".to_string()]
    }

    #[test]
    fn test_apply_grant_and_revoke() {
        let mut set = BTreeSet::new();
        apply(&mut set, "example.use");
        assert!(set.contains("example.use"));

        apply(&mut set, "-example.use");
        assert!(!set.contains("example.use"));

        // Re-grant after revoke.
        apply(&mut set, "example.use");
        assert!(set.contains("example.use"));
    }

    #[test]
    fn test_revocation_of_absent_token_is_noop() {
        let mut set = BTreeSet::new();
        apply(&mut set, "-never.granted");
        assert!(set.is_empty());
    }

    #[test]
    fn test_parse_scoped_bare() {
        let parsed = parse_scoped("example.node", &worlds()).unwrap();
        assert_eq!(parsed.world, None);
        assert_eq!(parsed.node, "example.node");
    }

    #[test]
    fn test_parse_scoped_with_world() {
        let parsed = parse_scoped("nether:example.node", &worlds()).unwrap();
        assert_eq!(parsed.world.as_deref(), Some("nether"));
        assert_eq!(parsed.node, "example.node");

        // World names compare case-insensitively and canonicalize to the
        // registered spelling.
        let parsed = parse_scoped("NETHER:example.node", &worlds()).unwrap();
        assert_eq!(parsed.world.as_deref(), Some("nether"));
    }

    #[test]
    fn test_parse_scoped_keeps_revocation_marker() {
        let parsed = parse_scoped("world:-example.node", &worlds()).unwrap();
        assert_eq!(parsed.node, "-example.node");
    }

    #[test]
    fn test_parse_scoped_rejects_bad_input() {
        assert_eq!(
            parse_scoped("moon:example.node", &worlds()),
            Err(CommandError::UnknownWorld("moon".to_string()))
        );
        assert!(matches!(
            parse_scoped(":example.node", &worlds()),
            Err(CommandError::MalformedNode(_))
        ));
        assert!(matches!(
            parse_scoped("world:", &worlds()),
            Err(CommandError::MalformedNode(_))
        ));
        assert!(matches!(
            parse_scoped("", &worlds()),
            Err(CommandError::MalformedNode(_))
        ));
    }

    #[test]
    fn test_master_tokens_lowercase() {
        assert_eq!(
            group_master("Admin", "Nether"),
            "privileges.group.admin.nether"
        );
        assert_eq!(user_master("Alice", "world"), "privileges.user.alice.world");
    }
}
