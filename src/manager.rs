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

//! The Manager: the orchestration layer sitting between the agent
//! runtime and the Registry/Connector/CredentialStore primitives. Owns
//! the one piece of mutable per-user state this crate keeps in memory —
//! the TTL tool cache — and every write path that must invalidate it
//! atomically with its own mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connector::mcp::McpConnector;
use crate::connector::{derive_status, Connector, OAuthMachine};
use crate::error::ConnectorError;
use crate::models::{ConnectorStatus, UserConnectorConfig, UserConnectorView, UserMcpConnectorConfig};
use crate::registry::Registry;
use crate::security::Validator;
use crate::store::credential_store::{config_key, custom_mcp_key, token_key};
use crate::store::CredentialStore;
use crate::tool::ExecutableTool;

/// Tool cache entries live for 300 seconds before they are considered
/// stale, per §4.2.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// One cached materialization of a user's tools, either for a single
/// connector or the concatenated `"all"` entry.
struct CacheEntry {
    cached_at: Instant,
    tools: Vec<ExecutableTool>,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < CACHE_TTL
    }
}

/// Per-user shard of the tool cache. Guarded by its own lock so one
/// user's cache traffic never contends with another's.
#[derive(Default)]
struct UserShard {
    entries: HashMap<String, CacheEntry>,
}

/// Orchestrates connector lifecycle (authorize, enable, disable,
/// disconnect), tool materialization, and token refresh on behalf of
/// the agent runtime. Holds no per-user state beyond the tool cache;
/// everything durable lives in the [`CredentialStore`].
pub struct Manager {
    registry: Arc<Registry>,
    store: Arc<CredentialStore>,
    oauth: OAuthMachine,
    http: reqwest::Client,
    /// Base URL this runtime's own OAuth callback endpoint is reachable
    /// at, e.g. `https://agents.example.com/oauth/callback`. Each
    /// user-registered MCP connector gets `/{provider_id}` appended.
    redirect_uri_base: String,
    cache: AsyncMutex<HashMap<String, Arc<AsyncMutex<UserShard>>>>,
    /// Process-wide shutdown signal, per §9 ("tear down on shutdown by
    /// cancelling in-flight tasks"). Every public method below races its
    /// own work against this and returns [`ConnectorError::ShuttingDown`]
    /// the moment it fires, dropping whatever request or store call was
    /// in flight.
    shutdown: CancellationToken,
}

impl Manager {
    /// Builds a manager over an already-populated registry and store,
    /// sharing the same pooled HTTP client every connector uses.
    pub fn new(registry: Arc<Registry>, store: Arc<CredentialStore>, http: reqwest::Client, redirect_uri_base: impl Into<String>) -> Self {
        Self {
            registry,
            store,
            oauth: OAuthMachine::new(http.clone()),
            http,
            redirect_uri_base: redirect_uri_base.into(),
            cache: AsyncMutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Clones this manager's shutdown signal, for an embedding application
    /// that wants to tie its own per-request tasks to the same teardown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signals shutdown. Every operation currently in flight on this
    /// manager — and every one started afterward — resolves to
    /// [`ConnectorError::ShuttingDown`] instead of completing.
    pub fn shutdown(&self) {
        info!("manager shutdown signaled");
        self.shutdown.cancel();
    }

    /// Races `fut` against the shutdown signal.
    async fn cancellable<T>(&self, fut: impl std::future::Future<Output = Result<T, ConnectorError>>) -> Result<T, ConnectorError> {
        tokio::select! {
            result = fut => result,
            _ = self.shutdown.cancelled() => Err(ConnectorError::ShuttingDown),
        }
    }

    async fn shard_for(&self, user_id: &str) -> Arc<AsyncMutex<UserShard>> {
        let mut shards = self.cache.lock().await;
        shards
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(UserShard::default())))
            .clone()
    }

    /// Drops every cached entry for `user_id`, both the per-provider
    /// entries and the concatenated `"all"` entry. Called synchronously
    /// before every mutating operation below returns, per §5.
    async fn invalidate_cache(&self, user_id: &str) {
        let shard = self.shard_for(user_id).await;
        let mut shard = shard.lock().await;
        shard.entries.clear();
    }

    fn connector_or_unknown(&self, user_id: &str, provider_id: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
        self.registry
            .for_user(user_id, provider_id)
            .ok_or_else(|| ConnectorError::UnknownProvider {
                provider_id: provider_id.to_string(),
            })
    }

    async fn load_config(&self, user_id: &str, provider_id: &str) -> Result<Option<UserConnectorConfig>, ConnectorError> {
        let raw = self.store.get(&config_key(user_id, provider_id), user_id).await?;
        match raw {
            None => Ok(None),
            Some(value) => {
                let config: UserConnectorConfig = serde_json::from_value(value)
                    .map_err(|_| ConnectorError::CredentialDecode {
                        key: config_key(user_id, provider_id),
                    })?;
                Ok(Some(config))
            }
        }
    }

    async fn save_config(&self, config: &UserConnectorConfig) -> Result<(), ConnectorError> {
        let value = serde_json::to_value(config)
            .map_err(|e| ConnectorError::Store(format!("failed to serialize connector config: {e}")))?;
        self.store
            .set(&config_key(&config.user_id, &config.provider_id), value, &config.user_id)
            .await
    }

    /// Starts an authorize flow for `user_id` against `provider_id`.
    #[instrument(skip(self), fields(provider_id))]
    pub async fn init_authorize(&self, user_id: &str, provider_id: &str) -> Result<(String, String), ConnectorError> {
        self.cancellable(self.init_authorize_inner(user_id, provider_id)).await
    }

    async fn init_authorize_inner(&self, user_id: &str, provider_id: &str) -> Result<(String, String), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;
        let connector = self.connector_or_unknown(&user_id, &provider_id)?;
        self.oauth.init_authorize(connector.as_ref(), &self.store, &user_id).await
    }

    /// Completes an authorize flow, persists the resulting token, and
    /// flips the user's connector config to enabled. Invalidates the
    /// tool cache atomically with that transition.
    #[instrument(skip(self, code), fields(provider_id))]
    pub async fn handle_callback(
        &self,
        user_id: &str,
        provider_id: &str,
        code: Option<&str>,
        state: &str,
        upstream_error: Option<&str>,
    ) -> Result<(), ConnectorError> {
        self.cancellable(self.handle_callback_inner(user_id, provider_id, code, state, upstream_error))
            .await
    }

    async fn handle_callback_inner(
        &self,
        user_id: &str,
        provider_id: &str,
        code: Option<&str>,
        state: &str,
        upstream_error: Option<&str>,
    ) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;
        let connector = self.connector_or_unknown(&user_id, &provider_id)?;

        self.oauth
            .handle_callback(connector.as_ref(), &self.store, &user_id, code, state, upstream_error)
            .await?;

        let mut config = self
            .load_config(&user_id, &provider_id)
            .await?
            .unwrap_or_else(|| UserConnectorConfig::new(&user_id, &provider_id));
        config.enabled = true;
        config.status = ConnectorStatus::Connected;
        if config.connected_at.is_none() {
            config.connected_at = Some(Utc::now());
        }
        self.save_config(&config).await?;
        self.invalidate_cache(&user_id).await;

        info!(provider_id = provider_id.as_str(), "connector authorized");
        Ok(())
    }

    /// Enables a connector that already has a usable token. Requires
    /// `derive_status` to report [`ConnectorStatus::Connected`]; any
    /// other status leaves no trace — no config record is created or
    /// mutated.
    #[instrument(skip(self), fields(provider_id))]
    pub async fn enable_for_user(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        self.cancellable(self.enable_for_user_inner(user_id, provider_id)).await
    }

    async fn enable_for_user_inner(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;
        let connector = self.connector_or_unknown(&user_id, &provider_id)?;

        let token_result = self.oauth.get_token(connector.as_ref(), &self.store, &user_id, true).await;
        let status = derive_status(Some(&token_result), Utc::now());
        if status != ConnectorStatus::Connected {
            return Err(ConnectorError::NotAuthenticated {
                user_id: user_id.clone(),
                provider_id: provider_id.clone(),
            });
        }

        let mut config = self
            .load_config(&user_id, &provider_id)
            .await?
            .unwrap_or_else(|| UserConnectorConfig::new(&user_id, &provider_id));
        config.enabled = true;
        config.status = status;
        self.save_config(&config).await?;
        self.invalidate_cache(&user_id).await;
        Ok(())
    }

    /// Disables a connector without revoking its token or deleting its
    /// config: a later `enable_for_user` brings it back without a new
    /// authorize round trip.
    #[instrument(skip(self), fields(provider_id))]
    pub async fn disable_for_user(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        self.cancellable(self.disable_for_user_inner(user_id, provider_id)).await
    }

    async fn disable_for_user_inner(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;

        let mut config = self
            .load_config(&user_id, &provider_id)
            .await?
            .ok_or_else(|| ConnectorError::NotAuthenticated {
                user_id: user_id.clone(),
                provider_id: provider_id.clone(),
            })?;
        config.enabled = false;
        self.save_config(&config).await?;
        self.invalidate_cache(&user_id).await;
        Ok(())
    }

    /// Disconnects a connector entirely: best-effort revokes its token
    /// upstream, then unconditionally deletes its token, config, and
    /// (if present) custom-MCP record, then invalidates the cache.
    /// Local cleanup proceeds even if revocation fails.
    #[instrument(skip(self), fields(provider_id))]
    pub async fn disconnect_for_user(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        self.cancellable(self.disconnect_for_user_inner(user_id, provider_id)).await
    }

    async fn disconnect_for_user_inner(&self, user_id: &str, provider_id: &str) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;

        if let Some(connector) = self.registry.for_user(&user_id, &provider_id) {
            if let Ok(token) = self.oauth.get_token(connector.as_ref(), &self.store, &user_id, false).await {
                self.oauth.revoke(connector.as_ref(), &token).await;
            }
        }

        self.store.delete(&token_key(&user_id, &provider_id)).await?;
        self.store.delete(&config_key(&user_id, &provider_id)).await?;
        self.store.delete(&custom_mcp_key(&user_id, &provider_id)).await?;
        self.invalidate_cache(&user_id).await;

        info!(provider_id = provider_id.as_str(), "connector disconnected");
        Ok(())
    }

    /// Replaces a user's enabled-tool set for one connector. Every id
    /// must already be advertised by that connector's metadata;
    /// otherwise nothing is mutated, not even the ids that would have
    /// been valid.
    #[instrument(skip(self, enabled_ids), fields(provider_id))]
    pub async fn update_user_tools(
        &self,
        user_id: &str,
        provider_id: &str,
        enabled_ids: std::collections::HashSet<String>,
    ) -> Result<(), ConnectorError> {
        self.cancellable(self.update_user_tools_inner(user_id, provider_id, enabled_ids)).await
    }

    async fn update_user_tools_inner(
        &self,
        user_id: &str,
        provider_id: &str,
        enabled_ids: std::collections::HashSet<String>,
    ) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;
        let connector = self.connector_or_unknown(&user_id, &provider_id)?;

        let advertised: std::collections::HashSet<String> =
            connector.metadata().available_tools.into_iter().map(|t| t.id).collect();
        for id in &enabled_ids {
            Validator::validate_tool_id(id)?;
            if !advertised.contains(id) {
                return Err(ConnectorError::InvalidTool {
                    provider_id: provider_id.clone(),
                    tool_id: id.clone(),
                });
            }
        }

        let mut config = self
            .load_config(&user_id, &provider_id)
            .await?
            .ok_or_else(|| ConnectorError::NotAuthenticated {
                user_id: user_id.clone(),
                provider_id: provider_id.clone(),
            })?;
        config.enabled_tools = enabled_ids;
        self.save_config(&config).await?;
        self.invalidate_cache(&user_id).await;
        Ok(())
    }

    /// Toggles whether a connector's tools surface to the chat agent,
    /// independent of whether the connector itself is enabled.
    #[instrument(skip(self), fields(provider_id))]
    pub async fn toggle_chat_visibility(&self, user_id: &str, provider_id: &str, visible: bool) -> Result<(), ConnectorError> {
        self.cancellable(self.toggle_chat_visibility_inner(user_id, provider_id, visible)).await
    }

    async fn toggle_chat_visibility_inner(&self, user_id: &str, provider_id: &str, visible: bool) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        let provider_id = Validator::validate_provider_id(provider_id)?;

        let mut config = self
            .load_config(&user_id, &provider_id)
            .await?
            .ok_or_else(|| ConnectorError::NotAuthenticated {
                user_id: user_id.clone(),
                provider_id: provider_id.clone(),
            })?;
        config.enabled_in_chat = visible;
        self.save_config(&config).await?;
        self.invalidate_cache(&user_id).await;
        Ok(())
    }

    /// Idempotently loads `user_id`'s registered custom MCP connectors
    /// into the registry's per-user map, discovering each one's OAuth
    /// shape on first load.
    async fn ensure_user_mcp_connectors_loaded(&self, user_id: &str) -> Result<(), ConnectorError> {
        let raw = match self.store.list_custom_mcp_connectors(user_id).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };

        for (provider_id, value) in raw {
            if self.registry.has_user_connector(user_id, &provider_id) {
                continue;
            }
            let config: UserMcpConnectorConfig = match serde_json::from_value(value) {
                Ok(c) => c,
                Err(_) => {
                    warn!(provider_id = provider_id.as_str(), "failed to decode custom MCP connector config, skipping");
                    continue;
                }
            };
            let client_id = config.client_id.clone().unwrap_or_default();
            let client_secret = config
                .client_secret
                .clone()
                .unwrap_or_else(|| secrecy::Secret::new(String::new()));

            match McpConnector::discover(
                config.provider_id.clone(),
                config.display_name.clone(),
                format!("Custom MCP server: {}", config.display_name),
                config.base_url.clone(),
                config.transport,
                client_id,
                client_secret,
                format!("{}/{}", self.redirect_uri_base.trim_end_matches('/'), config.provider_id),
                Vec::new(),
                self.http.clone(),
            )
            .await
            {
                Ok(connector) => {
                    self.registry
                        .register_user_connector(user_id.to_string(), config.provider_id.clone(), Arc::new(connector));
                }
                Err(err) => {
                    warn!(provider_id = provider_id.as_str(), error = %err, "failed to discover custom MCP connector, skipping");
                }
            }
        }
        Ok(())
    }

    /// Materializes every tool currently available to `user_id`: cache
    /// hit (unless `force_refresh`), then a deterministic walk of every
    /// connector visible to the user, one connector's failure never
    /// aborting the rest.
    #[instrument(skip(self), fields(force_refresh))]
    pub async fn tools_for(&self, user_id: &str, force_refresh: bool) -> Result<Vec<ExecutableTool>, ConnectorError> {
        self.cancellable(self.tools_for_inner(user_id, force_refresh)).await
    }

    async fn tools_for_inner(&self, user_id: &str, force_refresh: bool) -> Result<Vec<ExecutableTool>, ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;

        let shard = self.shard_for(&user_id).await;
        if !force_refresh {
            let guard = shard.lock().await;
            if let Some(entry) = guard.entries.get("all") {
                if entry.is_fresh() {
                    debug!("tool cache hit");
                    return Ok(entry.tools.clone());
                }
            }
        }

        self.ensure_user_mcp_connectors_loaded(&user_id).await?;

        let mut all_tools = Vec::new();
        for (provider_id, connector) in self.registry.ordered_connectors_for(&user_id) {
            let config = match self.load_config(&user_id, &provider_id).await {
                Ok(Some(config)) => config,
                Ok(None) => continue,
                Err(_) => continue,
            };
            if !config.visible_in_chat() {
                continue;
            }

            let token = match self.oauth.get_token(connector.as_ref(), &self.store, &user_id, true).await {
                Ok(token) => token,
                Err(err) => {
                    debug!(provider_id = provider_id.as_str(), error = %err, "skipping connector, no usable token");
                    continue;
                }
            };

            match connector.build_tools(&token, &config.enabled_tools).await {
                Ok(mut tools) => all_tools.append(&mut tools),
                Err(err) => {
                    debug!(
                        provider_id = provider_id.as_str(),
                        error = %err,
                        "batch tool build failed, falling back to per-tool build"
                    );
                    for tool_id in &config.enabled_tools {
                        match connector.build_tool(tool_id, &token).await {
                            Ok(tool) => all_tools.push(tool),
                            Err(err) => {
                                warn!(
                                    provider_id = provider_id.as_str(),
                                    tool_id = tool_id.as_str(),
                                    error = %err,
                                    "failed to build individual tool, omitting"
                                );
                            }
                        }
                    }
                }
            }
        }

        let mut guard = shard.lock().await;
        guard.entries.insert(
            "all".to_string(),
            CacheEntry {
                cached_at: Instant::now(),
                tools: all_tools.clone(),
            },
        );
        Ok(all_tools)
    }

    /// Best-effort refreshes every connector token `user_id` holds that
    /// currently needs refreshing. Tolerates individual failures.
    #[instrument(skip(self))]
    pub async fn refresh_all_user_tokens(&self, user_id: &str) -> Result<(), ConnectorError> {
        self.cancellable(self.refresh_all_user_tokens_inner(user_id)).await
    }

    async fn refresh_all_user_tokens_inner(&self, user_id: &str) -> Result<(), ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        for (provider_id, connector) in self.registry.ordered_connectors_for(&user_id) {
            match self.load_config(&user_id, &provider_id).await {
                Ok(Some(config)) if config.enabled => {}
                _ => continue,
            }
            if let Err(err) = self.oauth.get_token(connector.as_ref(), &self.store, &user_id, true).await {
                debug!(provider_id = provider_id.as_str(), error = %err, "best-effort refresh failed, skipping");
            }
        }
        Ok(())
    }

    /// Lists every connector visible to `user_id` — system connectors
    /// plus that user's own registered MCP connectors, per §4.2 — joined
    /// with their config and derived status, for a settings/connectors-
    /// page view.
    #[instrument(skip(self))]
    pub async fn list_user_connectors(&self, user_id: &str) -> Result<Vec<UserConnectorView>, ConnectorError> {
        self.cancellable(self.list_user_connectors_inner(user_id)).await
    }

    async fn list_user_connectors_inner(&self, user_id: &str) -> Result<Vec<UserConnectorView>, ConnectorError> {
        let user_id = Validator::validate_user_id(user_id)?;
        self.ensure_user_mcp_connectors_loaded(&user_id).await?;

        let mut views = Vec::new();
        for (provider_id, connector) in self.registry.ordered_connectors_for(&user_id) {
            let metadata = connector.metadata();
            let config = self.load_config(&user_id, &provider_id).await?;
            let token_result = self.oauth.get_token(connector.as_ref(), &self.store, &user_id, false).await;
            let status = derive_status(Some(&token_result), Utc::now());
            views.push(UserConnectorView { metadata, config, status });
        }
        Ok(views)
    }

    /// Delegates to the registry: every system connector's static
    /// metadata, independent of any user.
    pub fn list_system_connectors(&self) -> Vec<crate::models::ConnectorMetadata> {
        self.registry.list_system_connectors()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use secrecy::Secret;

    use super::*;
    use crate::models::{ConnectorMetadata, ConnectorTool, GrantType, OAuthConfig, OAuthVersion};

    /// A connector with a fixed, static tool catalog whose `build_tools`
    /// hands back one `ExecutableTool` per enabled, advertised id, in the
    /// connector's declared order — enough to exercise the Manager's
    /// materialization and cache-invalidation paths without any network
    /// traffic.
    struct StubConnector {
        provider_id: String,
        tools: Vec<ConnectorTool>,
        oauth_config: OAuthConfig,
    }

    impl StubConnector {
        fn new(provider_id: &str, tool_ids: &[&str]) -> Self {
            let tools = tool_ids
                .iter()
                .map(|id| ConnectorTool {
                    id: id.to_string(),
                    name: id.to_string(),
                    description: "stub tool".into(),
                    parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
                    requires_auth: true,
                    rate_limit: None,
                })
                .collect();
            Self {
                provider_id: provider_id.to_string(),
                tools,
                oauth_config: OAuthConfig {
                    provider_id: provider_id.to_string(),
                    client_id: "client".into(),
                    client_secret: Secret::new("secret".into()),
                    authorize_url: "https://example.com/authorize".into(),
                    token_url: "https://example.com/token".into(),
                    redirect_uri: "https://runtime.example.com/callback".into(),
                    scopes: vec!["read".into()],
                    oauth_version: OAuthVersion::V2,
                    use_pkce: true,
                    grant_type: GrantType::AuthorizationCode,
                    additional_params: Default::default(),
                    revoke_url: None,
                    userinfo_url: None,
                },
            }
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        fn provider_id(&self) -> &str {
            &self.provider_id
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                provider_id: self.provider_id.clone(),
                display_name: self.provider_id.clone(),
                description: "stub connector".into(),
                icon_url: None,
                oauth_version: OAuthVersion::V2,
                available_tools: self.tools.clone(),
                required_scopes: Vec::new(),
                optional_scopes: Vec::new(),
                rate_limits: None,
            }
        }

        fn oauth_config(&self) -> &OAuthConfig {
            &self.oauth_config
        }

        async fn build_tools(
            &self,
            _token: &crate::models::UserOAuthToken,
            enabled_tools: &HashSet<String>,
        ) -> Result<Vec<ExecutableTool>, ConnectorError> {
            Ok(self
                .tools
                .iter()
                .filter(|t| enabled_tools.contains(&t.id))
                .map(|t| {
                    ExecutableTool::new(t.id.clone(), t.name.clone(), t.description.clone(), t.parameters_schema.clone(), |_args| async move {
                        Ok("ok".to_string())
                    })
                })
                .collect())
        }

        async fn build_tool(&self, tool_id: &str, _token: &crate::models::UserOAuthToken) -> Result<ExecutableTool, ConnectorError> {
            Err(ConnectorError::InvalidTool {
                provider_id: self.provider_id.clone(),
                tool_id: tool_id.to_string(),
            })
        }
    }

    async fn test_manager() -> (Manager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").to_string_lossy().to_string();
        let db = Arc::new(crate::db::DBClient::new(&path).await.unwrap());
        db.initialize_schema().await.unwrap();
        let cipher = crate::crypto::MasterCipher::from_base64_key(&crate::crypto::MasterCipher::generate_base64_key()).unwrap();
        let store = Arc::new(CredentialStore::new(db, cipher));
        let registry = Arc::new(Registry::new());
        let http = reqwest::Client::new();
        let manager = Manager::new(registry, store, http, "https://runtime.example.com/oauth/callback");
        (manager, dir)
    }

    async fn seed_connected_token(manager: &Manager, user_id: &str, provider_id: &str) {
        let token = crate::models::UserOAuthToken {
            user_id: user_id.to_string(),
            provider_id: provider_id.to_string(),
            access_token: Secret::new("at".into()),
            token_type: "Bearer".into(),
            refresh_token: Some(Secret::new("rt".into())),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: Utc::now(),
        };
        manager
            .store
            .set(
                &token_key(user_id, provider_id),
                serde_json::to_value(&token).unwrap(),
                user_id,
            )
            .await
            .unwrap();
    }

    /// E3 — enabling a provider with no stored token fails with
    /// `NotAuthenticated`, and no config record is created.
    #[tokio::test]
    async fn e3_enable_without_auth_fails_and_creates_no_config() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("notion", Arc::new(StubConnector::new("notion", &["search"])));

        let err = manager.enable_for_user("u2", "notion").await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotAuthenticated { .. }));

        let config = manager.load_config("u2", "notion").await.unwrap();
        assert!(config.is_none());
    }

    /// R2 — disable then re-enable restores visibility without a new
    /// OAuth round trip, provided the token is still valid.
    #[tokio::test]
    async fn r2_disable_then_enable_restores_visibility() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("google", Arc::new(StubConnector::new("google", &["gmail_search"])));
        seed_connected_token(&manager, "u1", "google").await;
        manager.enable_for_user("u1", "google").await.unwrap();

        manager.disable_for_user("u1", "google").await.unwrap();
        let disabled = manager.load_config("u1", "google").await.unwrap().unwrap();
        assert!(!disabled.enabled);

        manager.enable_for_user("u1", "google").await.unwrap();
        let reenabled = manager.load_config("u1", "google").await.unwrap().unwrap();
        assert!(reenabled.enabled);
    }

    /// R3 — disconnect deletes the config, so a later listing reports
    /// not-configured for that provider.
    #[tokio::test]
    async fn r3_disconnect_reports_not_configured() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("google", Arc::new(StubConnector::new("google", &["gmail_search"])));
        seed_connected_token(&manager, "u1", "google").await;
        manager.enable_for_user("u1", "google").await.unwrap();

        manager.disconnect_for_user("u1", "google").await.unwrap();

        let views = manager.list_user_connectors("u1").await.unwrap();
        let google = views.iter().find(|v| v.metadata.provider_id == "google").unwrap();
        assert_eq!(google.status, ConnectorStatus::NotConfigured);
        assert!(google.config.is_none());
    }

    /// E4 — tool materialization honors the chat-visibility gate: an
    /// enabled-in-chat=false connector contributes nothing, while an
    /// enabled one contributes its tools in declared order.
    #[tokio::test]
    async fn e4_tools_for_respects_chat_visibility_gate() {
        let (manager, _dir) = test_manager().await;
        manager
            .registry
            .register("google", Arc::new(StubConnector::new("google", &["gmail_search", "gmail_send"])));
        manager.registry.register("drive", Arc::new(StubConnector::new("drive", &["drive_list"])));

        seed_connected_token(&manager, "u3", "google").await;
        manager.enable_for_user("u3", "google").await.unwrap();
        manager
            .update_user_tools("u3", "google", HashSet::from(["gmail_search".to_string(), "gmail_send".to_string()]))
            .await
            .unwrap();

        seed_connected_token(&manager, "u3", "drive").await;
        manager.enable_for_user("u3", "drive").await.unwrap();
        manager.toggle_chat_visibility("u3", "drive", false).await.unwrap();

        let tools = manager.tools_for("u3", false).await.unwrap();
        let ids: Vec<&str> = tools.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["gmail_search", "gmail_send"]);
    }

    /// E5 — narrowing the enabled-tool set invalidates the cache so the
    /// very next `tools_for` call reflects the new set, not the stale
    /// cached list.
    #[tokio::test]
    async fn e5_update_user_tools_invalidates_cache() {
        let (manager, _dir) = test_manager().await;
        manager
            .registry
            .register("google", Arc::new(StubConnector::new("google", &["gmail_search", "gmail_send"])));
        seed_connected_token(&manager, "u3", "google").await;
        manager.enable_for_user("u3", "google").await.unwrap();
        manager
            .update_user_tools("u3", "google", HashSet::from(["gmail_search".to_string(), "gmail_send".to_string()]))
            .await
            .unwrap();

        let first = manager.tools_for("u3", false).await.unwrap();
        assert_eq!(first.len(), 2);

        manager
            .update_user_tools("u3", "google", HashSet::from(["gmail_search".to_string()]))
            .await
            .unwrap();

        let second = manager.tools_for("u3", false).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "gmail_search");
    }

    /// R4 — two consecutive `tools_for` calls within the TTL return the
    /// same materialized list without re-walking connectors (observed
    /// indirectly: the cached copy survives even after the underlying
    /// config is mutated without going through an invalidating path).
    #[tokio::test]
    async fn r4_consecutive_tools_for_calls_hit_the_cache() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("google", Arc::new(StubConnector::new("google", &["gmail_search"])));
        seed_connected_token(&manager, "u5", "google").await;
        manager.enable_for_user("u5", "google").await.unwrap();
        manager
            .update_user_tools("u5", "google", HashSet::from(["gmail_search".to_string()]))
            .await
            .unwrap();

        let first = manager.tools_for("u5", false).await.unwrap();

        // Mutate the config directly in the store, bypassing the
        // Manager's invalidating API, to prove the second read is served
        // from cache rather than recomputed.
        let mut config = manager.load_config("u5", "google").await.unwrap().unwrap();
        config.enabled_tools.clear();
        manager.save_config(&config).await.unwrap();

        let second = manager.tools_for("u5", false).await.unwrap();
        assert_eq!(second.len(), first.len());
        assert_eq!(second[0].id, first[0].id);
    }

    /// B4 — `update_user_tools` with an unknown id fails and performs no
    /// mutation at all, not even a partial one.
    #[tokio::test]
    async fn b4_update_user_tools_with_unknown_id_mutates_nothing() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("google", Arc::new(StubConnector::new("google", &["gmail_search"])));
        seed_connected_token(&manager, "u6", "google").await;
        manager.enable_for_user("u6", "google").await.unwrap();

        let err = manager
            .update_user_tools("u6", "google", HashSet::from(["ghost_tool".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidTool { .. }));

        let config = manager.load_config("u6", "google").await.unwrap().unwrap();
        assert!(config.enabled_tools.is_empty());
    }

    /// `update_user_tools` rejects a tool id containing characters that
    /// would be unsafe spliced into a credential-store key, even if the
    /// id happens to match the connector's advertised set.
    #[tokio::test]
    async fn update_user_tools_rejects_invalid_tool_id() {
        let (manager, _dir) = test_manager().await;
        manager
            .registry
            .register("google", Arc::new(StubConnector::new("google", &["gmail search"])));
        seed_connected_token(&manager, "u7", "google").await;
        manager.enable_for_user("u7", "google").await.unwrap();

        let err = manager
            .update_user_tools("u7", "google", HashSet::from(["gmail search".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Input);

        let config = manager.load_config("u7", "google").await.unwrap().unwrap();
        assert!(config.enabled_tools.is_empty());
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected_before_touching_the_store() {
        let (manager, _dir) = test_manager().await;
        let err = manager.enable_for_user("u1", "ghost").await.unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownProvider { .. }));
    }

    /// A manager that has already been told to shut down rejects any new
    /// call instead of touching the registry or store.
    #[tokio::test]
    async fn shutdown_rejects_subsequent_calls() {
        let (manager, _dir) = test_manager().await;
        manager.registry.register("google", Arc::new(StubConnector::new("google", &["gmail_search"])));

        manager.shutdown();

        let err = manager.tools_for("u1", false).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ShuttingDown));

        let err = manager.list_user_connectors("u1").await.unwrap_err();
        assert!(matches!(err, ConnectorError::ShuttingDown));
    }

    /// The cloned shutdown token observes the same cancellation the
    /// manager itself triggers, so an embedding application can tie its
    /// own tasks to it.
    #[tokio::test]
    async fn shutdown_token_reflects_manager_shutdown() {
        let (manager, _dir) = test_manager().await;
        let token = manager.shutdown_token();
        assert!(!token.is_cancelled());
        manager.shutdown();
        assert!(token.is_cancelled());
    }
}
