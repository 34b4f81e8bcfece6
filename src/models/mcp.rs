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

//! Data shapes for remote, HTTP-reachable MCP servers: the transport a
//! user-registered server declares, the tool shape it advertises over
//! `GET /mcp/v1/tools`, and the connector definition persisted when a
//! user registers a custom MCP server.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonSchema;

/// A remote MCP server's transport, after normalization. `stdio` (local
/// process spawning) is out of scope for this runtime and is rejected
/// at registration rather than represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    /// Server-sent events transport.
    Sse,
    /// Any of the `http` / `streamable-http` / `streamable_http`
    /// spellings, normalized to this single variant.
    StreamableHttp,
}

/// Parses a user- or config-supplied transport string into a
/// [`McpTransport`]. The three HTTP-ish spellings all normalize to
/// [`McpTransport::StreamableHttp`]; `stdio` and anything unrecognized
/// are rejected.
pub fn parse_mcp_transport(raw: &str) -> Result<McpTransport, crate::error::ConnectorError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "sse" => Ok(McpTransport::Sse),
        "http" | "streamable-http" | "streamable_http" => Ok(McpTransport::StreamableHttp),
        "stdio" => Err(crate::error::ConnectorError::Configuration(
            "stdio transport is not supported: MCP servers must be reachable over HTTP".into(),
        )),
        other => Err(crate::error::ConnectorError::Configuration(format!(
            "unknown MCP transport '{other}'"
        ))),
    }
}

/// One tool definition as returned by `GET {base}/mcp/v1/tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDefinition {
    /// Tool name, unique within the server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for this tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonSchema,
}

/// Response envelope for `GET {base}/mcp/v1/tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolsListResponse {
    /// The tools this server currently advertises.
    pub tools: Vec<McpToolDefinition>,
}

/// A user-registered custom MCP connector, persisted at
/// `user:{user_id}:custom_mcp:{provider_id}`. Once loaded into the
/// registry it behaves identically to a system MCP connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMcpConnectorConfig {
    /// The user who registered this connector.
    pub user_id: String,
    /// Synthetic provider id assigned to this custom connector
    /// (typically derived from its display name).
    pub provider_id: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Base URL of the remote MCP server, e.g. `https://mcp.example.com`.
    pub base_url: String,
    /// Declared transport, already normalized.
    pub transport: McpTransport,
    /// OAuth client id for this server's authorization server, once
    /// discovered or user-supplied.
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret for this server's authorization server.
    #[serde(default)]
    pub client_secret: Option<secrecy::Secret<String>>,
}
