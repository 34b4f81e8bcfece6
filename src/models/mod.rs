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

//! Data models for the connector runtime: OAuth configuration, tokens,
//! per-user connector configuration, advertised tools, and MCP-specific
//! shapes.

pub mod connector_config;
pub mod mcp;
pub mod oauth;
pub mod oauth_state;
pub mod token;
pub mod tool;

pub use connector_config::{ConnectorStatus, UserConnectorConfig};
pub use mcp::{parse_mcp_transport, McpToolDefinition, McpToolsListResponse, McpTransport, UserMcpConnectorConfig};
pub use oauth::{GrantType, OAuthConfig, OAuthVersion};
pub use oauth_state::{OAuthTransientState, OAUTH_STATE_TTL_SECONDS};
pub use token::UserOAuthToken;
pub use tool::{ConnectorMetadata, ConnectorTool, RateLimit, UserConnectorView};
