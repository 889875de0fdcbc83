// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Provider configuration document.
//
// The top-level shape is `{"databases": [{type, config, name?}, ...],
// "token": "..."?}`. Each entry's `config` is handed verbatim to the
// backend factory, which validates it and fills in defaults.

use polystore_core::{KvError, KvResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One database to open, as it appears in the provider config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// The backend type tag, e.g. `"map"` or `"redb"`.
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Backend-specific configuration.
    #[serde(default)]
    pub config: Value,
    /// Optional human name, resolvable through `find_by_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The provider's startup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Databases opened at startup.
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
    /// Admin security token. When set, admin requests must present it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ProviderConfig {
    /// Parse a configuration from its JSON text.
    pub fn from_str(text: &str) -> KvResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| KvError::InvalidConfig(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a configuration from a JSON value.
    pub fn from_value(value: Value) -> KvResult<Self> {
        if !value.is_object() {
            return Err(KvError::InvalidConfig(
                "provider config must be a JSON object".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| KvError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_config() {
        let cfg = ProviderConfig::from_str(
            r#"{
                "databases": [
                    {"type": "map", "config": {"use_lock": false}, "name": "first"},
                    {"type": "unordered_set", "config": {}}
                ],
                "token": "secret"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.databases.len(), 2);
        assert_eq!(cfg.databases[0].backend_type, "map");
        assert_eq!(cfg.databases[0].name.as_deref(), Some("first"));
        assert_eq!(cfg.databases[1].config, json!({}));
        assert_eq!(cfg.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_fields_default() {
        let cfg = ProviderConfig::from_str("{}").unwrap();
        assert!(cfg.databases.is_empty());
        assert!(cfg.token.is_none());
    }

    #[test]
    fn test_malformed_json_is_invalid_config() {
        assert!(matches!(
            ProviderConfig::from_str("{ab434"),
            Err(KvError::InvalidConfig(_))
        ));
        assert!(matches!(
            ProviderConfig::from_value(json!([1, 2, 3])),
            Err(KvError::InvalidConfig(_))
        ));
        // An entry without a type is malformed.
        assert!(matches!(
            ProviderConfig::from_value(json!({"databases": [{"config": {}}]})),
            Err(KvError::InvalidConfig(_))
        ));
    }
}
