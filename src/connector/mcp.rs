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

//! The MCP Adapter: a [`Connector`] over a remote, HTTP-reachable MCP
//! server. Unlike [`super::rest::RestConnector`], its tool catalog is
//! discovered at runtime rather than declared at registration, and its
//! OAuth endpoints are themselves discovered per RFC 9728 / RFC 8414
//! rather than configured.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::ConnectorError;
use crate::mcp::circuit_breaker::CircuitBreaker;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::models::{
    ConnectorMetadata, ConnectorTool, GrantType, McpToolDefinition, McpToolsListResponse, McpTransport, OAuthConfig,
    OAuthVersion, UserOAuthToken,
};
use crate::tool::ExecutableTool;

use super::policy::ProviderPolicy;
use super::Connector;

/// Timeout for OAuth/MCP metadata discovery calls, per §5.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a tool execution call, per §5.
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_REQUEST_ID: AtomicI64 = AtomicI64::new(1);

fn next_request_id() -> i64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// A remote MCP server connector. Its tool catalog is fetched fresh on
/// every `build_tools`/`build_tool` call (the Manager's cache, not this
/// type, is what bounds how often that happens); the last-fetched
/// catalog is kept in `metadata` purely for introspection.
pub struct McpConnector {
    metadata: std::sync::Mutex<ConnectorMetadata>,
    oauth_config: OAuthConfig,
    policy: ProviderPolicy,
    base_url: String,
    /// The RFC 8707 `resource` value returned by protected-resource
    /// discovery, echoed on every authorize URL.
    resource: String,
    transport: McpTransport,
    http: reqwest::Client,
    circuit_breaker: Arc<AsyncMutex<CircuitBreaker>>,
}

impl McpConnector {
    /// Builds an MCP connector by running OAuth discovery (RFC 9728 /
    /// RFC 8414) against `base_url`. `provider_id` is caller-assigned —
    /// for system connectors a fixed id, for user-registered ones
    /// typically derived from the server's display name.
    pub async fn discover(
        provider_id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        base_url: impl Into<String>,
        transport: McpTransport,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
        http: reqwest::Client,
    ) -> Result<Self, ConnectorError> {
        let base_url = base_url.into();
        let provider_id = provider_id.into();

        let (authorization_server, resource) = discover_protected_resource(&http, &base_url).await?;
        let (authorize_endpoint, token_endpoint) = discover_authorization_server(&http, &authorization_server).await?;

        let oauth_config = OAuthConfig {
            provider_id: provider_id.clone(),
            client_id: client_id.into(),
            client_secret,
            authorize_url: authorize_endpoint,
            token_url: token_endpoint,
            redirect_uri: redirect_uri.into(),
            scopes: scopes.clone(),
            oauth_version: OAuthVersion::V2,
            use_pkce: true,
            grant_type: GrantType::AuthorizationCode,
            additional_params: HashMap::new(),
            revoke_url: None,
            userinfo_url: None,
        };

        let metadata = ConnectorMetadata {
            provider_id: provider_id.clone(),
            display_name: display_name.into(),
            description: description.into(),
            icon_url: None,
            oauth_version: OAuthVersion::V2,
            available_tools: Vec::new(),
            required_scopes: scopes,
            optional_scopes: Vec::new(),
            rate_limits: None,
        };

        Ok(Self {
            metadata: std::sync::Mutex::new(metadata),
            oauth_config,
            policy: ProviderPolicy::default(),
            base_url,
            resource,
            transport,
            http,
            circuit_breaker: Arc::new(AsyncMutex::new(CircuitBreaker::with_defaults(provider_id))),
        })
    }

    /// A lightweight reachability probe independent of fetching tools,
    /// used by the "test before enabling" affordance. Reuses the same
    /// circuit-breaker-guarded HTTP plumbing as catalog fetch and tool
    /// invocation.
    pub async fn test_connection(&self, token: &UserOAuthToken) -> Result<bool, ConnectorError> {
        let url = format!("{}/mcp/v1/tools", self.base_url.trim_end_matches('/'));
        let request = self
            .http
            .get(&url)
            .bearer_auth(token.access_token.expose_secret())
            .timeout(DISCOVERY_TIMEOUT);
        match guarded_send(&self.circuit_breaker, &url, request).await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn fetch_catalog(&self, token: &UserOAuthToken) -> Result<Vec<McpToolDefinition>, ConnectorError> {
        let url = format!("{}/mcp/v1/tools", self.base_url.trim_end_matches('/'));
        let request = self
            .http
            .get(&url)
            .bearer_auth(token.access_token.expose_secret())
            .timeout(DISCOVERY_TIMEOUT);

        let response = guarded_send(&self.circuit_breaker, &url, request).await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ConnectorError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: McpToolsListResponse = serde_json::from_str(&body).map_err(|e| ConnectorError::UpstreamRequest {
            target: url,
            message: format!("malformed tools catalog: {e}"),
        })?;

        let catalog_tools: Vec<ConnectorTool> = parsed
            .tools
            .iter()
            .map(|t| ConnectorTool {
                id: t.name.clone(),
                name: t.name.clone(),
                description: t.description.clone(),
                parameters_schema: t.input_schema.clone(),
                requires_auth: true,
                rate_limit: None,
            })
            .collect();
        self.metadata.lock().unwrap().available_tools = catalog_tools;

        Ok(parsed.tools)
    }

    fn build_executable(&self, def: McpToolDefinition, token: &UserOAuthToken) -> ExecutableTool {
        let access_token = token.access_token.expose_secret().clone();
        let base_url = self.base_url.clone();
        let transport = self.transport;
        let http = self.http.clone();
        let circuit_breaker = self.circuit_breaker.clone();
        let tool_name = def.name.clone();
        let provider_id = self.oauth_config.provider_id.clone();

        ExecutableTool::new(
            def.name.clone(),
            format!("{provider_id}_{}", def.name),
            def.description.clone(),
            def.input_schema.clone(),
            move |args| {
                let access_token = access_token.clone();
                let base_url = base_url.clone();
                let http = http.clone();
                let circuit_breaker = circuit_breaker.clone();
                let tool_name = tool_name.clone();
                async move {
                    invoke_mcp_tool(&http, &circuit_breaker, &base_url, transport, &access_token, &tool_name, args).await
                }
            },
        )
    }
}

#[async_trait]
impl Connector for McpConnector {
    fn provider_id(&self) -> &str {
        &self.oauth_config.provider_id
    }

    fn metadata(&self) -> ConnectorMetadata {
        self.metadata.lock().unwrap().clone()
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth_config
    }

    fn policy(&self) -> ProviderPolicy {
        self.policy
    }

    fn authorize_extra_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("resource".to_string(), self.resource.clone());
        params
    }

    async fn build_tools(
        &self,
        token: &UserOAuthToken,
        enabled_tools: &HashSet<String>,
    ) -> Result<Vec<ExecutableTool>, ConnectorError> {
        let catalog = self.fetch_catalog(token).await?;
        Ok(catalog
            .into_iter()
            .filter(|def| enabled_tools.contains(&def.name))
            .map(|def| self.build_executable(def, token))
            .collect())
    }

    async fn build_tool(&self, tool_id: &str, token: &UserOAuthToken) -> Result<ExecutableTool, ConnectorError> {
        let catalog = self.fetch_catalog(token).await?;
        let def = catalog
            .into_iter()
            .find(|def| def.name == tool_id)
            .ok_or_else(|| ConnectorError::InvalidTool {
                provider_id: self.oauth_config.provider_id.clone(),
                tool_id: tool_id.to_string(),
            })?;
        Ok(self.build_executable(def, token))
    }
}

/// Sends `request`, gating on the circuit breaker and recording the
/// outcome. Shared by catalog fetch, tool invocation, and
/// `test_connection` so all three observe (and contribute to) the same
/// server-health signal.
async fn guarded_send(
    circuit_breaker: &Arc<AsyncMutex<CircuitBreaker>>,
    target: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ConnectorError> {
    if !circuit_breaker.lock().await.allow_request() {
        return Err(ConnectorError::UpstreamRequest {
            target: target.to_string(),
            message: "circuit breaker open for this MCP server".to_string(),
        });
    }

    match request.send().await {
        Ok(response) => {
            let mut breaker = circuit_breaker.lock().await;
            if response.status().is_success() {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
            Ok(response)
        }
        Err(err) => {
            circuit_breaker.lock().await.record_failure();
            Err(ConnectorError::UpstreamRequest {
                target: target.to_string(),
                message: err.to_string(),
            })
        }
    }
}

/// Invokes `tool_name` over JSON-RPC `tools/call`, per §4.5. Upstream
/// and protocol-level failures are folded into an in-band
/// `{success:false, error}` payload rather than propagated as `Err` —
/// only a circuit-breaker rejection or this function's own construction
/// failures would do that, and neither occurs here.
async fn invoke_mcp_tool(
    http: &reqwest::Client,
    circuit_breaker: &Arc<AsyncMutex<CircuitBreaker>>,
    base_url: &str,
    transport: McpTransport,
    access_token: &str,
    tool_name: &str,
    args: Value,
) -> Result<String, ConnectorError> {
    let endpoint = match transport {
        McpTransport::Sse => format!("{}/execute", base_url.trim_end_matches('/')),
        McpTransport::StreamableHttp => format!("{}/mcp/v1/invoke", base_url.trim_end_matches('/')),
    };

    let envelope = JsonRpcRequest::new(
        "tools/call",
        Some(serde_json::json!({ "name": tool_name, "arguments": args })),
        next_request_id(),
    );

    let request = http
        .post(&endpoint)
        .bearer_auth(access_token)
        .json(&envelope)
        .timeout(TOOL_TIMEOUT);

    let response = match guarded_send(circuit_breaker, &endpoint, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(endpoint = %endpoint, error = %err, "mcp tool invocation failed to reach upstream");
            return Ok(failure_payload(&err.to_string()));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Ok(failure_payload(&format!("HTTP {}: {}", status.as_u16(), body)));
    }

    let rpc: JsonRpcResponse = match serde_json::from_str(&body) {
        Ok(rpc) => rpc,
        Err(err) => return Ok(failure_payload(&format!("malformed JSON-RPC response: {err}"))),
    };

    match rpc.into_result() {
        Ok(result) => Ok(render_result(&result)),
        Err(err) => Ok(failure_payload(&err.message)),
    }
}

fn render_result(result: &Value) -> String {
    let candidate = result
        .as_object()
        .and_then(|obj| obj.get("content").or_else(|| obj.get("text")).or_else(|| obj.get("message")));
    match candidate {
        Some(value) => value_to_display_string(value),
        None => value_to_display_string(result),
    }
}

fn value_to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", value_to_display_string(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn failure_payload(message: &str) -> String {
    serde_json::json!({ "success": false, "error": message }).to_string()
}

async fn fetch_json(http: &reqwest::Client, url: &str) -> Result<Value, ConnectorError> {
    let response = http
        .get(url)
        .timeout(DISCOVERY_TIMEOUT)
        .send()
        .await
        .map_err(|e| ConnectorError::UpstreamRequest { target: url.to_string(), message: e.to_string() })?;
    if !response.status().is_success() {
        return Err(ConnectorError::UpstreamStatus { status: response.status().as_u16(), body: String::new() });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| ConnectorError::UpstreamRequest { target: url.to_string(), message: e.to_string() })
}

fn well_known_resource_urls(mcp_server_url: &str) -> Result<(String, String), ConnectorError> {
    let url = url::Url::parse(mcp_server_url)
        .map_err(|e| ConnectorError::Configuration(format!("invalid MCP server URL: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ConnectorError::Configuration("MCP server URL has no host".to_string()))?;
    let origin = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };
    let path = url.path().trim_end_matches('/');
    let with_path = format!("{origin}/.well-known/oauth-protected-resource{path}");
    let without_path = format!("{origin}/.well-known/oauth-protected-resource");
    Ok((with_path, without_path))
}

/// RFC 9728 step: discovers the authorization server and resource
/// identifier for an MCP server.
async fn discover_protected_resource(http: &reqwest::Client, mcp_server_url: &str) -> Result<(String, String), ConnectorError> {
    let (with_path, without_path) = well_known_resource_urls(mcp_server_url)?;
    let body = match fetch_json(http, &with_path).await {
        Ok(body) => body,
        Err(_) => fetch_json(http, &without_path).await?,
    };

    let authorization_server = body
        .get("authorization_servers")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConnectorError::Upstream("oauth-protected-resource metadata missing authorization_servers[0]".into()))?
        .to_string();
    let resource = body
        .get("resource")
        .and_then(|v| v.as_str())
        .unwrap_or(mcp_server_url)
        .to_string();

    Ok((authorization_server, resource))
}

/// RFC 8414 step, with the RFC 8414 §3.1 OpenID Connect Discovery
/// compatibility fallback.
async fn discover_authorization_server(http: &reqwest::Client, authorization_server: &str) -> Result<(String, String), ConnectorError> {
    let base = authorization_server.trim_end_matches('/');
    let primary = format!("{base}/.well-known/oauth-authorization-server");
    let fallback = format!("{base}/.well-known/openid-configuration");

    let body = match fetch_json(http, &primary).await {
        Ok(body) => body,
        Err(_) => fetch_json(http, &fallback).await?,
    };

    let authorize = body
        .get("authorization_endpoint")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConnectorError::Upstream("authorization server metadata missing authorization_endpoint".into()))?
        .to_string();
    let token = body
        .get("token_endpoint")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConnectorError::Upstream("authorization server metadata missing token_endpoint".into()))?
        .to_string();

    Ok((authorize, token))
}

// ---------------------------------------------------------------------
// Input coercion ladder (§4.5). A pure function, independently testable
// without any network or store dependency.
// ---------------------------------------------------------------------

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());
static BAREWORD_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").unwrap());
static KV_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)\s*[:=]\s*("([^"]*)"|'([^']*)'|[^\s,]+)"#).unwrap());

/// Coerces a raw, possibly non-JSON string into an argument map for a
/// tool whose expected shape is `schema`. Tries each ladder step in
/// order and returns the first success; fails only once every step has
/// been exhausted.
pub fn coerce_input(raw: &str, schema: &Value) -> Result<Map<String, Value>, ConnectorError> {
    let trimmed = raw.trim();

    // a. direct JSON object parse.
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return Ok(map);
        }
    }

    // b. balanced-brace extraction, c. textual fixups.
    if let Some(extracted) = extract_balanced_braces(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(extracted) {
            return Ok(map);
        }
        let fixed = apply_textual_fixups(extracted);
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&fixed) {
            return Ok(map);
        }
    } else {
        let fixed = apply_textual_fixups(trimmed);
        if fixed.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&fixed) {
                return Ok(map);
            }
        }
    }

    // d. loose key=value / key: "value" pairs.
    if let Some(map) = parse_loose_pairs(trimmed) {
        return Ok(map);
    }

    // e. single-property schema wrap.
    if let Some(property) = single_property_name(schema) {
        let mut map = Map::new();
        map.insert(property, Value::String(trimmed.to_string()));
        return Ok(map);
    }

    // f. structured failure.
    Err(ConnectorError::Coercion { summary: schema_summary(schema) })
}

fn extract_balanced_braces(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    for (i, b) in raw.bytes().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn apply_textual_fixups(raw: &str) -> String {
    let no_trailing_commas = TRAILING_COMMA.replace_all(raw, "$1");
    BAREWORD_KEY.replace_all(&no_trailing_commas, "$1\"$2\"$3").into_owned()
}

fn parse_loose_pairs(raw: &str) -> Option<Map<String, Value>> {
    let mut map = Map::new();
    let mut any = false;
    for cap in KV_PAIR.captures_iter(raw) {
        any = true;
        let key = cap[1].to_string();
        let raw_value = if let Some(q) = cap.get(3) {
            q.as_str().to_string()
        } else if let Some(q) = cap.get(4) {
            q.as_str().to_string()
        } else {
            cap[2].to_string()
        };
        map.insert(key, coerce_scalar(&raw_value));
    }
    any.then_some(map)
}

fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

fn single_property_name(schema: &Value) -> Option<String> {
    let props = schema.get("properties")?.as_object()?;
    if props.len() == 1 {
        props.keys().next().cloned()
    } else {
        None
    }
}

fn schema_summary(schema: &Value) -> String {
    let Some(props) = schema.get("properties").and_then(|v| v.as_object()) else {
        return "no declared properties".to_string();
    };
    props
        .iter()
        .map(|(k, v)| {
            let ty = v.get("type").and_then(|t| t.as_str()).unwrap_or("any");
            format!("{k}: {ty}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_direct_json_object_parses() {
        let map = coerce_input(r#"{"a": 1, "b": "x"}"#, &Value::Null).unwrap();
        assert_eq!(map["a"], Value::from(1));
        assert_eq!(map["b"], Value::from("x"));
    }

    #[test]
    fn b_extracts_balanced_braces_from_surrounding_prose() {
        let map = coerce_input(r#"sure, here you go: {"a": 1} thanks"#, &Value::Null).unwrap();
        assert_eq!(map["a"], Value::from(1));
    }

    #[test]
    fn c_trailing_comma_and_bareword_keys_are_fixed_up() {
        let map = coerce_input(r#"{a: 1, b: "x",}"#, &Value::Null).unwrap();
        assert_eq!(map["a"], Value::from(1));
        assert_eq!(map["b"], Value::from("x"));
    }

    #[test]
    fn d_loose_key_value_pairs_parse_with_scalar_coercion() {
        let map = coerce_input(r#"summary="Fix bug", priority=2, urgent=true"#, &Value::Null).unwrap();
        assert_eq!(map["summary"], Value::from("Fix bug"));
        assert_eq!(map["priority"], Value::from(2));
        assert_eq!(map["urgent"], Value::from(true));
    }

    #[test]
    fn b5_single_property_schema_wraps_bare_string() {
        let schema = serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}});
        let map = coerce_input("just a plain string with no structure", &schema).unwrap();
        assert_eq!(map["query"], Value::from("just a plain string with no structure"));
    }

    #[test]
    fn b5_multi_property_schema_with_no_structure_fails_coercion() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
        });
        let err = coerce_input("just a plain string with no structure", &schema).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Coercion);
    }

    #[test]
    fn render_result_prefers_content_then_text_then_message() {
        assert_eq!(render_result(&serde_json::json!({"content": "c", "text": "t"})), "c");
        assert_eq!(render_result(&serde_json::json!({"text": "t", "message": "m"})), "t");
        assert_eq!(render_result(&serde_json::json!({"message": "m"})), "m");
    }

    #[test]
    fn render_result_renders_mapping_as_key_value_lines() {
        let rendered = render_result(&serde_json::json!({"content": {"status": "ok", "id": "42"}}));
        assert_eq!(rendered, "id: 42\nstatus: ok");
    }
}
