//! Engine configuration
//!
//! Typed configuration for the permission engine. Defaults are applied once at
//! deserialization; callers never see partially-populated values.

use serde::{Deserialize, Serialize};

/// How rename/remove operations treat dangling references to a group
/// (other groups inheriting it, users assigned to it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceCheck {
    /// Proceed without looking at referents.
    Allow,
    /// Proceed, but log each dangling referent.
    #[default]
    Warn,
    /// Refuse the operation and report the referents to the invoker.
    Block,
}

/// Engine configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegesConfig {
    /// Group assigned to users that have no record yet, and the fallback when
    /// a user's assigned group no longer exists.
    #[serde(default = "default_group")]
    pub default_group: String,
    /// Emit per-operation resolution traces at debug level.
    #[serde(default)]
    pub debug: bool,
    /// Reference handling for group rename/remove.
    #[serde(default)]
    pub reference_check: ReferenceCheck,
}

impl Default for PrivilegesConfig {
    fn default() -> Self {
        Self {
            default_group: default_group(),
            debug: false,
            reference_check: ReferenceCheck::default(),
        }
    }
}

fn default_group() -> String {
    "default".to_string()
}

impl PrivilegesConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_group.trim().is_empty() {
            return Err("default_group must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrivilegesConfig::default();
        assert_eq!(config.default_group, "default");
        assert!(!config.debug);
        assert_eq!(config.reference_check, ReferenceCheck::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PrivilegesConfig::default();
        config.default_group = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reference_check_parsing() {
        let yaml = "default_group: default\ndebug: true\nreference_check: block\n";
        let config: PrivilegesConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.debug);
        assert_eq!(config.reference_check, ReferenceCheck::Block);

        // Missing fields fall back to defaults.
        let config: PrivilegesConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.default_group, "default");
        assert!(!config.debug);
    }

    #[test]
    fn test_config_round_trips() {
        let config = PrivilegesConfig {
            debug: true,
            reference_check: ReferenceCheck::Allow,
            ..PrivilegesConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("debug: true"));

        let parsed: PrivilegesConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.debug);
        assert_eq!(parsed.reference_check, ReferenceCheck::Allow);
    }
}
