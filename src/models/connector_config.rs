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

//! A user's per-provider connector configuration: whether it is enabled,
//! which tools the user has chosen, and whether it should surface in
//! chat. `status` is always a derived projection, never ground truth.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connector's status, always computed from current token state at
/// read time. Never persisted as the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    /// No token record exists for this user/provider pair.
    NotConfigured,
    /// A valid, non-expired token exists.
    Connected,
    /// The user has disabled or disconnected this connector.
    Disconnected,
    /// The token is expired with no way to refresh it, or another
    /// terminal failure occurred.
    Error,
    /// The token is expired and has no refresh token, or a declared
    /// rotating provider's refresh omitted a new refresh token.
    Expired,
    /// A refresh is currently believed to be in flight. Reserved for
    /// callers that want to reflect mid-refresh state in a UI; the
    /// Manager itself never blocks a read on this status.
    Refreshing,
}

/// A user's configuration for one connector, persisted at
/// `user:{user_id}:connector:{provider_id}:config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConnectorConfig {
    /// The user this configuration belongs to.
    pub user_id: String,
    /// The provider this configuration is for.
    pub provider_id: String,
    /// Whether the user has enabled this connector at all.
    #[serde(default)]
    pub enabled: bool,
    /// Whether this connector's tools should be visible to the chat
    /// agent. Independent of `enabled` so a user can keep a connection
    /// alive (e.g. for a dashboard) without exposing its tools to chat.
    #[serde(default = "default_true")]
    pub enabled_in_chat: bool,
    /// The subset of the connector's advertised tool ids the user has
    /// chosen to enable.
    #[serde(default)]
    pub enabled_tools: HashSet<String>,
    /// Arbitrary per-user, per-connector settings (e.g. a default
    /// project key for a Jira connector).
    #[serde(default)]
    pub custom_settings: HashMap<String, serde_json::Value>,
    /// When the user first completed authorization for this connector.
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    /// When a tool from this connector was last invoked.
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// Last known status. Advisory only — callers must re-derive status
    /// from token state rather than trust this field for decisions.
    #[serde(default = "default_status")]
    pub status: ConnectorStatus,
}

fn default_true() -> bool {
    true
}

fn default_status() -> ConnectorStatus {
    ConnectorStatus::NotConfigured
}

impl UserConnectorConfig {
    /// A fresh, disabled configuration for a user/provider pair that has
    /// no prior record.
    pub fn new(user_id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            provider_id: provider_id.into(),
            enabled: false,
            enabled_in_chat: true,
            enabled_tools: HashSet::new(),
            custom_settings: HashMap::new(),
            connected_at: None,
            last_used: None,
            status: ConnectorStatus::NotConfigured,
        }
    }

    /// Whether a connector in this config state should contribute tools
    /// to `tools_for`: enabled, and not hidden from chat.
    pub fn visible_in_chat(&self) -> bool {
        self.enabled && self.enabled_in_chat
    }
}
