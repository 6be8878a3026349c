//! Validation configuration
//!
//! Projects tune the pipeline through a TOML file (conventionally
//! `weave.toml`): suppressions, severity overrides, and selector-driven
//! custom validators.
//!
//! ```toml
//! [[suppressions]]
//! id = "MissingDocumentation"
//! namespace = "example.internal"
//! reason = "internal shapes are documented elsewhere"
//!
//! [severity_overrides]
//! UnreferencedShape = "WARNING"
//!
//! [[custom_validators]]
//! id = "NoBlobInputs"
//! selector = "operation -[input]-> structure > member > blob"
//! severity = "ERROR"
//! message = "operation inputs must not contain raw blobs ({id})"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ModelError, Result};
use crate::selector::Selector;
use crate::validation::validators::{default_validators, EmitEachSelectorValidator};
use crate::validation::{Severity, Suppression, Validator};

/// Pipeline configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Suppression rules applied on top of the model's metadata ones
    pub suppressions: Vec<Suppression>,
    /// Event id -> replacement severity for non-structural events
    pub severity_overrides: BTreeMap<String, Severity>,
    /// Selector-driven validators defined by the project
    pub custom_validators: Vec<CustomValidatorConfig>,
}

/// One `[[custom_validators]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomValidatorConfig {
    pub id: String,
    pub selector: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_severity() -> Severity {
    Severity::Warning
}

fn default_message() -> String {
    "shape {id} matched a forbidden pattern".to_string()
}

impl ValidationConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text, &path.display().to_string())
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ModelError::InvalidDocument {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// The full validator set: defaults plus the configured custom
    /// validators. Fails if a configured selector does not parse.
    pub fn build_validators(&self) -> Result<Vec<Box<dyn Validator>>> {
        let mut validators = default_validators();
        for custom in &self.custom_validators {
            let selector = Selector::parse(&custom.selector)?;
            validators.push(Box::new(EmitEachSelectorValidator::new(
                custom.id.clone(),
                selector,
                custom.severity,
                custom.message.clone(),
            )));
        }
        Ok(validators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ValidationConfig::from_toml(
            r#"
            [[suppressions]]
            id = "MissingDocumentation"
            namespace = "example.internal"
            reason = "documented elsewhere"

            [severity_overrides]
            UnreferencedShape = "WARNING"

            [[custom_validators]]
            id = "NoErrors"
            selector = "structure [trait|error]"
            severity = "ERROR"
            message = "no error shapes allowed ({id})"
            "#,
            "weave.toml",
        )
        .unwrap();

        assert_eq!(config.suppressions.len(), 1);
        assert_eq!(
            config.severity_overrides.get("UnreferencedShape"),
            Some(&Severity::Warning)
        );
        assert_eq!(config.custom_validators[0].severity, Severity::Error);

        let validators = config.build_validators().unwrap();
        assert!(validators.iter().any(|v| v.name() == "NoErrors"));
    }

    #[test]
    fn test_defaults() {
        let config = ValidationConfig::from_toml("", "weave.toml").unwrap();
        assert!(config.suppressions.is_empty());
        assert!(config.custom_validators.is_empty());
        // Built-ins are always present.
        assert!(!config.build_validators().unwrap().is_empty());
    }

    #[test]
    fn test_custom_validator_defaults() {
        let config = ValidationConfig::from_toml(
            r#"
            [[custom_validators]]
            id = "X"
            selector = "*"
            "#,
            "weave.toml",
        )
        .unwrap();
        assert_eq!(config.custom_validators[0].severity, Severity::Warning);
    }

    #[test]
    fn test_invalid_selector_is_rejected_at_build() {
        let config = ValidationConfig::from_toml(
            r#"
            [[custom_validators]]
            id = "X"
            selector = ":bogus(*)"
            "#,
            "weave.toml",
        )
        .unwrap();
        assert!(config.build_validators().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ValidationConfig::from_toml("nonsense = true", "weave.toml").is_err());
    }
}
