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

//! Support types for the MCP Adapter ([`crate::connector::mcp`]): circuit
//! breaking for a remote MCP server's reachability, and the JSON-RPC 2.0
//! envelope it speaks. There is no local server lifecycle here — every MCP
//! server this crate talks to is a remote HTTP endpoint the user points at,
//! not a spawned subprocess.
//!
//! - [`circuit_breaker`]: per-server failure tracking and trip/cooldown state
//! - [`protocol`]: JSON-RPC 2.0 request/response/error types

pub mod circuit_breaker;
pub mod protocol;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use protocol::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, MCP_CLIENT_NAME, MCP_CLIENT_VERSION, MCP_PROTOCOL_VERSION};
