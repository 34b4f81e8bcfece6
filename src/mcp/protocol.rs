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

//! JSON-RPC 2.0 envelope types.
//!
//! This runtime's MCP adapter only ever talks to remote HTTP MCP servers
//! and works on raw `serde_json::Value` for `tools/list`/`tools/call`
//! payloads; this module holds just the transport-level JSON-RPC 2.0
//! request/response/error/id types every call is wrapped in.
//! Reference: https://modelcontextprotocol.io/specification/2025-06-18

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP Protocol version supported by this implementation
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Application name used in MCP client info
pub const MCP_CLIENT_NAME: &str = "connector-runtime";

/// Application version used in MCP client info
pub const MCP_CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// JSON-RPC 2.0 Core Types
// =============================================================================

/// JSON-RPC request ID
///
/// Can be a number, string, or null according to the JSON-RPC 2.0 spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Numeric ID
    Number(i64),
    /// String ID
    String(String),
    /// Null ID (for notifications)
    #[default]
    Null,
}

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Method name to invoke
    pub method: String,
    /// Optional method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request ID for correlation
    pub id: JsonRpcId,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with a numeric ID
    pub fn new(method: &str, params: Option<Value>, id: i64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: JsonRpcId::Number(id),
        }
    }

    /// Creates a new JSON-RPC notification (no ID, no response expected)
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: JsonRpcId::Null,
        }
    }
}

/// JSON-RPC 2.0 Response
///
/// Note: In JSON-RPC 2.0, notifications (server-to-client messages) may not have an `id` field.
/// We make it optional with a default value to handle such cases gracefully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request ID for correlation (optional for notifications)
    #[serde(default)]
    pub id: Option<JsonRpcId>,
}

impl JsonRpcResponse {
    /// Checks if the response is an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning an error if present
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Optional additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes
impl JsonRpcError {
    /// Parse error (-32700)
    pub fn parse_error(message: &str) -> Self {
        Self {
            code: -32700,
            message: message.to_string(),
            data: None,
        }
    }

    /// Invalid Request (-32600)
    pub fn invalid_request(message: &str) -> Self {
        Self {
            code: -32600,
            message: message.to_string(),
            data: None,
        }
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method '{}' not found", method),
            data: None,
        }
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }

    /// Internal error (-32603)
    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: message.to_string(),
            data: None,
        }
    }
}
