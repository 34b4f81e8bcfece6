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

//! The REST Adapter: a [`Connector`] that maps tool ids onto direct
//! third-party REST operations (method + path template), bearer-token
//! authenticated. One `RestConnector` instance is built per registered
//! provider (Jira, Google, ...); the operation table is supplied at
//! construction rather than hardcoded per provider, so registering a new
//! REST-backed provider is a data problem, not a code change.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConnectorError;
use crate::models::{ConnectorMetadata, OAuthConfig, UserOAuthToken};
use crate::tool::ExecutableTool;

use super::policy::ProviderPolicy;
use super::Connector;

/// Default per-call timeout for a REST tool invocation, per §5.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// One tool's REST binding: the HTTP method and a path template whose
/// `{placeholders}` are filled from the tool's input arguments. Any
/// argument not consumed by the path template is forwarded as a query
/// parameter (`GET`/`DELETE`) or as the JSON request body
/// (`POST`/`PUT`/`PATCH`).
#[derive(Debug, Clone)]
pub struct RestOperation {
    /// HTTP method to invoke.
    pub method: reqwest::Method,
    /// Path template relative to the connector's base URL, e.g.
    /// `/rest/api/3/issue/{issue_key}`.
    pub path_template: String,
    /// Per-call timeout, overridable per tool per §5.
    pub timeout: Duration,
}

impl RestOperation {
    /// Builds an operation with the default 30-second timeout.
    pub fn new(method: reqwest::Method, path_template: impl Into<String>) -> Self {
        Self {
            method,
            path_template: path_template.into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Overrides this operation's timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A provider's side endpoint for discovering a tenant/cloud/workspace
/// id that subsequent calls need but the token response doesn't carry,
/// e.g. Jira Cloud's `accessible-resources` endpoint. The response is
/// assumed to be a JSON array; the first element's `id` field is stored
/// into `token.additional_data[field_name]`, matching the single-site
/// case this crate's providers actually need.
#[derive(Debug, Clone)]
pub struct ResourceDiscovery {
    /// Absolute URL of the discovery endpoint.
    pub url: String,
    /// Key to store the discovered id under in `additional_data`.
    pub field_name: String,
}

/// A direct third-party REST API connector.
pub struct RestConnector {
    metadata: ConnectorMetadata,
    oauth_config: OAuthConfig,
    policy: ProviderPolicy,
    base_url: String,
    operations: HashMap<String, RestOperation>,
    http: reqwest::Client,
    offline_access_scope: Option<String>,
    resource_discovery: Option<ResourceDiscovery>,
}

impl RestConnector {
    /// Builds a REST connector over a shared, pooled HTTP client. Per
    /// §4.4, `operations` maps each advertised tool id to its REST
    /// binding; a tool id present in `metadata.available_tools` with no
    /// entry here fails `build_tool` with [`ConnectorError::InvalidTool`].
    pub fn new(
        metadata: ConnectorMetadata,
        oauth_config: OAuthConfig,
        policy: ProviderPolicy,
        base_url: impl Into<String>,
        operations: HashMap<String, RestOperation>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            metadata,
            oauth_config,
            policy,
            base_url: base_url.into(),
            operations,
            http,
            offline_access_scope: None,
            resource_discovery: None,
        }
    }

    /// Declares the scope this provider requires for refresh to work,
    /// so a silently-dropped `refresh_token` on exchange gets logged.
    pub fn with_offline_access_scope(mut self, scope: impl Into<String>) -> Self {
        self.offline_access_scope = Some(scope.into());
        self
    }

    /// Declares a post-exchange resource-discovery endpoint for this
    /// provider.
    pub fn with_resource_discovery(mut self, discovery: ResourceDiscovery) -> Self {
        self.resource_discovery = Some(discovery);
        self
    }
}

#[async_trait]
impl Connector for RestConnector {
    fn provider_id(&self) -> &str {
        &self.metadata.provider_id
    }

    fn metadata(&self) -> ConnectorMetadata {
        self.metadata.clone()
    }

    fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth_config
    }

    fn policy(&self) -> ProviderPolicy {
        self.policy
    }

    fn offline_access_scope(&self) -> Option<&str> {
        self.offline_access_scope.as_deref()
    }

    async fn discover_resource(&self, token: &mut UserOAuthToken) -> Result<(), ConnectorError> {
        let Some(discovery) = &self.resource_discovery else {
            return Ok(());
        };

        let response = self
            .http
            .get(&discovery.url)
            .bearer_auth(token.access_token.expose_secret())
            .timeout(DEFAULT_TOOL_TIMEOUT)
            .send()
            .await
            .map_err(|e| ConnectorError::UpstreamRequest {
                target: discovery.url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ConnectorError::UpstreamStatus {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::UpstreamRequest {
                target: discovery.url.clone(),
                message: e.to_string(),
            })?;

        let id = body
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get("id"))
            .cloned();

        if let Some(id) = id {
            token.additional_data.insert(discovery.field_name.clone(), id);
        }
        Ok(())
    }

    async fn build_tools(
        &self,
        token: &UserOAuthToken,
        enabled_tools: &HashSet<String>,
    ) -> Result<Vec<ExecutableTool>, ConnectorError> {
        let mut tools = Vec::with_capacity(enabled_tools.len());
        for tool_id in enabled_tools {
            tools.push(self.build_tool(tool_id, token).await?);
        }
        Ok(tools)
    }

    async fn build_tool(&self, tool_id: &str, token: &UserOAuthToken) -> Result<ExecutableTool, ConnectorError> {
        let declared = self
            .metadata
            .available_tools
            .iter()
            .find(|t| t.id == tool_id)
            .ok_or_else(|| ConnectorError::InvalidTool {
                provider_id: self.metadata.provider_id.clone(),
                tool_id: tool_id.to_string(),
            })?
            .clone();
        let operation = self
            .operations
            .get(tool_id)
            .ok_or_else(|| ConnectorError::InvalidTool {
                provider_id: self.metadata.provider_id.clone(),
                tool_id: tool_id.to_string(),
            })?
            .clone();

        // Captured once here, per §4.4 — not re-read per invocation.
        let access_token = token.access_token.expose_secret().clone();
        let base_url = self.base_url.clone();
        let http = self.http.clone();
        let provider_id = self.metadata.provider_id.clone();

        Ok(ExecutableTool::new(
            declared.id.clone(),
            format!("{}_{}", provider_id, declared.name),
            declared.description.clone(),
            declared.parameters_schema.clone(),
            move |args| {
                let access_token = access_token.clone();
                let base_url = base_url.clone();
                let http = http.clone();
                let operation = operation.clone();
                let provider_id = provider_id.clone();
                async move { invoke_rest_operation(&http, &base_url, &access_token, &operation, &provider_id, args).await }
            },
        ))
    }
}

/// Substitutes `{placeholder}` tokens in `path_template` from `args`,
/// removing consumed keys, then issues the request with whatever
/// arguments remain as query parameters or a JSON body. Upstream
/// failures never propagate as `Err` — per §7 they are folded into an
/// in-band `{success:false, error}` string payload.
async fn invoke_rest_operation(
    http: &reqwest::Client,
    base_url: &str,
    access_token: &str,
    operation: &RestOperation,
    provider_id: &str,
    args: Value,
) -> Result<String, ConnectorError> {
    let mut remaining = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };

    let path = substitute_path(&operation.path_template, &mut remaining);
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);

    let mut request = http
        .request(operation.method.clone(), &url)
        .bearer_auth(access_token)
        .timeout(operation.timeout);

    request = if matches!(operation.method, reqwest::Method::GET | reqwest::Method::DELETE) {
        let query: Vec<(String, String)> = remaining
            .into_iter()
            .map(|(k, v)| (k, value_to_query_string(&v)))
            .collect();
        request.query(&query)
    } else {
        request.json(&Value::Object(remaining))
    };

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(provider_id, error = %err, "rest tool invocation failed to reach upstream");
            return Ok(failure_payload(&format!("request to {provider_id} failed: {err}")));
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.is_success() {
        Ok(body)
    } else {
        Ok(failure_payload(&format!("HTTP {}: {}", status.as_u16(), body)))
    }
}

fn substitute_path(template: &str, args: &mut Map<String, Value>) -> String {
    let mut path = template.to_string();
    let placeholders: Vec<String> = {
        let mut names = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            if let Some(end) = rest[start..].find('}') {
                names.push(rest[start + 1..start + end].to_string());
                rest = &rest[start + end + 1..];
            } else {
                break;
            }
        }
        names
    };
    for name in placeholders {
        let value = args
            .remove(&name)
            .map(|v| value_to_query_string(&v))
            .unwrap_or_default();
        path = path.replace(&format!("{{{name}}}"), &value);
    }
    path
}

fn value_to_query_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn failure_payload(message: &str) -> String {
    serde_json::json!({ "success": false, "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_path_fills_placeholder_and_removes_key() {
        let mut args = Map::new();
        args.insert("issue_key".into(), Value::String("ABC-1".into()));
        args.insert("comment".into(), Value::String("hi".into()));
        let path = substitute_path("/rest/api/3/issue/{issue_key}/comment", &mut args);
        assert_eq!(path, "/rest/api/3/issue/ABC-1/comment");
        assert!(!args.contains_key("issue_key"));
        assert!(args.contains_key("comment"));
    }

    #[test]
    fn missing_placeholder_value_substitutes_empty_string() {
        let mut args = Map::new();
        let path = substitute_path("/rest/api/3/issue/{issue_key}", &mut args);
        assert_eq!(path, "/rest/api/3/issue/");
    }

    #[test]
    fn failure_payload_is_well_formed_json() {
        let payload = failure_payload("boom");
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["success"], Value::Bool(false));
        assert_eq!(parsed["error"], Value::String("boom".into()));
    }

    fn test_oauth_config() -> OAuthConfig {
        OAuthConfig {
            provider_id: "jira".into(),
            client_id: "client".into(),
            client_secret: secrecy::Secret::new("secret".into()),
            authorize_url: "https://example.com/authorize".into(),
            token_url: "https://example.com/token".into(),
            redirect_uri: "https://runtime.example.com/callback".into(),
            scopes: vec!["read".into(), "offline_access".into()],
            oauth_version: crate::models::OAuthVersion::V2,
            use_pkce: true,
            grant_type: crate::models::GrantType::AuthorizationCode,
            additional_params: HashMap::new(),
            revoke_url: None,
            userinfo_url: None,
        }
    }

    fn test_metadata() -> ConnectorMetadata {
        ConnectorMetadata {
            provider_id: "jira".into(),
            display_name: "Jira".into(),
            description: "d".into(),
            icon_url: None,
            oauth_version: crate::models::OAuthVersion::V2,
            available_tools: Vec::new(),
            required_scopes: Vec::new(),
            optional_scopes: Vec::new(),
            rate_limits: None,
        }
    }

    fn test_token() -> UserOAuthToken {
        UserOAuthToken {
            user_id: "u1".into(),
            provider_id: "jira".into(),
            access_token: secrecy::Secret::new("at".into()),
            token_type: "Bearer".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn discover_resource_stores_first_accessible_resource_id() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/accessible-resources"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "cloud-123", "name": "acme", "url": "https://acme.atlassian.net"},
            ])))
            .mount(&server)
            .await;

        let connector = RestConnector::new(
            test_metadata(),
            test_oauth_config(),
            ProviderPolicy::default(),
            "https://api.atlassian.com",
            HashMap::new(),
            reqwest::Client::new(),
        )
        .with_resource_discovery(ResourceDiscovery {
            url: format!("{}/accessible-resources", server.uri()),
            field_name: "cloud_id".into(),
        });

        let mut token = test_token();
        connector.discover_resource(&mut token).await.unwrap();

        assert_eq!(
            token.additional_data.get("cloud_id"),
            Some(&Value::String("cloud-123".into()))
        );
    }

    #[tokio::test]
    async fn discover_resource_is_a_noop_without_configuration() {
        let connector = RestConnector::new(
            test_metadata(),
            test_oauth_config(),
            ProviderPolicy::default(),
            "https://api.atlassian.com",
            HashMap::new(),
            reqwest::Client::new(),
        );

        let mut token = test_token();
        connector.discover_resource(&mut token).await.unwrap();
        assert!(token.additional_data.is_empty());
    }

    #[test]
    fn offline_access_scope_reflects_builder_configuration() {
        let connector = RestConnector::new(
            test_metadata(),
            test_oauth_config(),
            ProviderPolicy::default(),
            "https://api.atlassian.com",
            HashMap::new(),
            reqwest::Client::new(),
        )
        .with_offline_access_scope("offline_access");

        assert_eq!(connector.offline_access_scope(), Some("offline_access"));
    }
}
