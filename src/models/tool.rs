// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A connector's advertised tool shape and the metadata describing a
//! whole connector, as surfaced by `GET /connectors/available`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonSchema;

use super::oauth::OAuthVersion;

/// A simple requests-per-window rate limit a provider imposes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum number of requests allowed per window.
    pub requests: u32,
    /// Window length, in seconds.
    pub window_seconds: u32,
}

/// One invocable capability a connector exposes to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorTool {
    /// Stable tool id, unique within its connector.
    pub id: String,
    /// Human-readable name shown to the agent/user.
    pub name: String,
    /// Description of what invoking this tool does.
    pub description: String,
    /// JSON Schema describing this tool's expected arguments.
    pub parameters_schema: JsonSchema,
    /// Whether invoking this tool requires an authenticated token
    /// (true for essentially every connector tool today, but declared
    /// explicitly rather than assumed).
    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,
    /// An optional rate limit specific to this tool.
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

fn default_requires_auth() -> bool {
    true
}

/// Metadata describing an entire connector: its identity, OAuth shape,
/// and the tools it advertises. Returned by
/// `Registry::list_system_connectors` and joined with per-user state by
/// `Manager::list_user_connectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorMetadata {
    /// Stable provider id.
    pub provider_id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Short description of the connector.
    pub description: String,
    /// Optional icon URL for UI presentation.
    #[serde(default)]
    pub icon_url: Option<String>,
    /// OAuth protocol version this connector speaks.
    pub oauth_version: OAuthVersion,
    /// Tools currently advertised by this connector.
    pub available_tools: Vec<ConnectorTool>,
    /// Scopes that must be granted for the connector to function at
    /// all.
    pub required_scopes: Vec<String>,
    /// Scopes that unlock additional tools but are not mandatory.
    #[serde(default)]
    pub optional_scopes: Vec<String>,
    /// A connector-wide rate limit, if the provider imposes one.
    #[serde(default)]
    pub rate_limits: Option<RateLimit>,
}

/// A system connector's metadata joined with one user's configuration
/// and derived status, as returned by `GET /connectors/user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConnectorView {
    /// The connector's static metadata.
    pub metadata: ConnectorMetadata,
    /// The user's configuration for this connector, if one exists.
    pub config: Option<super::connector_config::UserConnectorConfig>,
    /// The connector's status, derived at the moment this view was
    /// built.
    pub status: super::connector_config::ConnectorStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r4_tool_schema_round_trips_required_and_properties() {
        let tool = ConnectorTool {
            id: "create_issue".into(),
            name: "Create Issue".into(),
            description: "Creates a Jira issue".into(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "project": {"type": "string"},
                },
                "required": ["summary", "project"],
            }),
            requires_auth: true,
            rate_limit: None,
        };

        let json = serde_json::to_string(&tool).unwrap();
        let restored: ConnectorTool = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.parameters_schema["required"],
            serde_json::json!(["summary", "project"])
        );
        assert_eq!(
            restored.parameters_schema["properties"]["summary"]["type"],
            serde_json::json!("string")
        );
    }

    #[test]
    fn requires_auth_defaults_true() {
        let json = serde_json::json!({
            "id": "t",
            "name": "T",
            "description": "d",
            "parameters_schema": {},
        });
        let tool: ConnectorTool = serde_json::from_value(json).unwrap();
        assert!(tool.requires_auth);
    }
}
