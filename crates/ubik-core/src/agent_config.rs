// Resolved agent configuration
//
// Agent settings cascade organization -> team -> employee. The backend merges
// the levels; clients only display the merged result.

use serde::{Deserialize, Serialize};

/// Fully resolved configuration of one agent for one employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAgentConfig {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub provider: String,

    /// Merged configuration (employee overrides team overrides organization)
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    /// System prompts of all levels, concatenated
    #[serde(default)]
    pub system_prompt: String,

    /// False when any level disables the agent
    pub is_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,
}

impl ResolvedAgentConfig {
    /// Flatten the merged config into sorted `dotted.key = value` pairs
    pub fn config_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        for (key, value) in &self.config {
            flatten_into(key, value, &mut entries);
        }
        entries.sort();
        entries
    }
}

fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(&format!("{}.{}", prefix, key), nested, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

/// Response of the resolved-configs endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfigsResponse {
    #[serde(default)]
    pub configs: Vec<ResolvedAgentConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entries_flatten_nested_objects() {
        let resolved: ResolvedAgentConfig = serde_json::from_value(json!({
            "agent_id": "a1",
            "agent_name": "Claude Code",
            "agent_type": "cli",
            "provider": "anthropic",
            "config": {
                "model": "sonnet",
                "limits": {"max_tokens": 4096, "tools": {"bash": false}},
                "empty": {}
            },
            "system_prompt": "Org prompt\n\nTeam prompt",
            "is_enabled": true
        }))
        .unwrap();

        let entries = resolved.config_entries();
        assert_eq!(
            entries,
            vec![
                ("empty".to_string(), "{}".to_string()),
                ("limits.max_tokens".to_string(), "4096".to_string()),
                ("limits.tools.bash".to_string(), "false".to_string()),
                ("model".to_string(), "sonnet".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolved_response_defaults() {
        let response: ResolvedConfigsResponse = serde_json::from_str("{}").unwrap();
        assert!(response.configs.is_empty());

        let response: ResolvedConfigsResponse = serde_json::from_value(json!({
            "configs": [{"agent_id": "a1", "agent_name": "A", "is_enabled": false}]
        }))
        .unwrap();
        assert!(!response.configs[0].is_enabled);
        assert!(response.configs[0].sync_token.is_none());
    }
}
