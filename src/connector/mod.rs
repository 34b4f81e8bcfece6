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

//! The `Connector` trait and the shared OAuth state machine every
//! concrete connector (REST or MCP) is driven through.
//!
//! Dynamic dispatch is via a trait object — there is exactly one level
//! of polymorphism here, not an inheritance hierarchy. The OAuth
//! state machine (PKCE, authorize URL construction, callback handling,
//! refresh/rotation, derived status) is shared behavior that does not
//! belong to either concrete adapter, so it lives in [`OAuthMachine`]
//! instead of being duplicated by each `impl Connector`.

pub mod policy;
pub mod mcp;
pub mod rest;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::error::ConnectorError;
use crate::models::{
    ConnectorMetadata, ConnectorStatus, OAuthConfig, OAuthTransientState, UserOAuthToken,
    OAUTH_STATE_TTL_SECONDS,
};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::security::validation::Validator;
use crate::store::credential_store::{oauth_state_key, token_key};
use crate::store::CredentialStore;
use crate::tool::ExecutableTool;
use policy::ProviderPolicy;

/// A polymorphic adapter between this runtime and one third-party
/// OAuth-protected service. All methods are effectively pure functions
/// of `(config, token)` — a connector holds no mutable per-user state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable provider id this connector answers for.
    fn provider_id(&self) -> &str;

    /// Static metadata describing this connector and its advertised
    /// tools.
    fn metadata(&self) -> ConnectorMetadata;

    /// This connector's system-level OAuth configuration.
    fn oauth_config(&self) -> &OAuthConfig;

    /// Declarative rotating-refresh/forced-consent policy for this
    /// connector's provider.
    fn policy(&self) -> ProviderPolicy {
        ProviderPolicy::default()
    }

    /// Extra query parameters this connector needs on every authorize
    /// URL beyond the standard OAuth/PKCE set, e.g. MCP's
    /// `resource={mcp_server_url}` per RFC 8707. Empty by default.
    fn authorize_extra_params(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Extra form parameters this connector needs on the token exchange
    /// request beyond the standard set. Empty by default.
    fn token_extra_params(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// The scope this connector expects to have been granted in order
    /// for refresh to work (an offline-access equivalent). `None` if the
    /// provider has no such requirement. Used only to decide whether a
    /// missing `refresh_token` on exchange is worth a warning.
    fn offline_access_scope(&self) -> Option<&str> {
        None
    }

    /// Best-effort post-exchange resource discovery: fills in
    /// tenant/cloud/workspace identifiers a provider requires on every
    /// subsequent call but only hands out via a side endpoint (e.g.
    /// Jira's accessible-resources). No-op by default. Failures are
    /// logged and otherwise ignored by the caller — the token itself is
    /// still usable without the discovered fields.
    async fn discover_resource(&self, _token: &mut UserOAuthToken) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Builds every enabled tool for this user in one batch. Adapters
    /// that cannot batch should return `Err` so the caller falls back
    /// to [`Connector::build_tool`] per id.
    async fn build_tools(
        &self,
        token: &UserOAuthToken,
        enabled_tools: &HashSet<String>,
    ) -> Result<Vec<ExecutableTool>, ConnectorError>;

    /// Builds a single tool by id, used as the batch fallback path.
    async fn build_tool(&self, tool_id: &str, token: &UserOAuthToken) -> Result<ExecutableTool, ConnectorError>;
}

/// PKCE verifier/challenge pair plus the opaque state that correlates
/// an authorize request with its callback.
pub struct PkceChallenge {
    /// The raw verifier, kept secret and persisted transiently.
    pub code_verifier: Secret<String>,
    /// SHA-256(code_verifier), base64url, no padding.
    pub code_challenge: String,
    /// 32 random bytes, base64url, no padding.
    pub state: String,
}

/// Generates a fresh PKCE verifier/challenge pair and an opaque state
/// token, per RFC 7636.
pub fn generate_pkce() -> PkceChallenge {
    let mut verifier_bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut verifier_bytes);
    let code_verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    let mut state_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut state_bytes);
    let state = URL_SAFE_NO_PAD.encode(state_bytes);

    PkceChallenge {
        code_verifier: Secret::new(code_verifier),
        code_challenge,
        state,
    }
}

/// The shared OAuth state machine every connector is driven through:
/// authorize-URL construction, callback handling, and auto-refreshing
/// token reads. Holds no per-connector state of its own — it is
/// parameterized by a [`Connector`] and a [`CredentialStore`] on every
/// call.
pub struct OAuthMachine {
    http: reqwest::Client,
}

impl OAuthMachine {
    /// Builds a machine over a shared, pooled HTTP client. Per §9, the
    /// client is process-wide, not rebuilt per call.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Starts an authorize flow: generates PKCE + state, persists the
    /// transient state record, and returns the URL the user should be
    /// redirected to plus the state token the caller echoes back to
    /// its own session.
    #[instrument(skip(self, connector, store), fields(provider_id = connector.provider_id()))]
    pub async fn init_authorize(
        &self,
        connector: &dyn Connector,
        store: &CredentialStore,
        user_id: &str,
    ) -> Result<(String, String), ConnectorError> {
        let config = connector.oauth_config();
        config.validate()?;

        let pkce = generate_pkce();

        let transient = OAuthTransientState {
            user_id: user_id.to_string(),
            provider_id: connector.provider_id().to_string(),
            code_verifier: pkce.code_verifier,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&transient)
            .map_err(|e| ConnectorError::Store(format!("failed to serialize oauth state: {e}")))?;
        store
            .setex(&oauth_state_key(&pkce.state), OAUTH_STATE_TTL_SECONDS, value)
            .await?;

        let mut url = url::Url::parse(&config.authorize_url)
            .map_err(|e| ConnectorError::Configuration(format!("invalid authorize_url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &config.client_id);
            pairs.append_pair("redirect_uri", &config.redirect_uri);
            pairs.append_pair("response_type", "code");
            pairs.append_pair("scope", &config.scope_string());
            pairs.append_pair("state", &pkce.state);
            if config.use_pkce {
                pairs.append_pair("code_challenge", &pkce.code_challenge);
                pairs.append_pair("code_challenge_method", "S256");
            }
            if connector.policy().force_consent {
                pairs.append_pair("prompt", "consent");
            }
            for (key, value) in &config.additional_params {
                pairs.append_pair(key, value);
            }
            for (key, value) in connector.authorize_extra_params() {
                pairs.append_pair(&key, &value);
            }
        }

        Ok((url.to_string(), pkce.state))
    }

    /// Completes an authorize flow: validates and consumes the
    /// transient state, exchanges the code for a token, persists it,
    /// and returns it. Does not itself flip the user's connector
    /// config to `enabled` — the Manager owns that transition so it
    /// can invalidate the tool cache atomically with it.
    #[instrument(skip(self, connector, store, code), fields(provider_id = connector.provider_id()))]
    pub async fn handle_callback(
        &self,
        connector: &dyn Connector,
        store: &CredentialStore,
        expected_user_id: &str,
        code: Option<&str>,
        state: &str,
        upstream_error: Option<&str>,
    ) -> Result<UserOAuthToken, ConnectorError> {
        if let Some(error) = upstream_error {
            return Err(ConnectorError::Upstream(error.to_string()));
        }

        let state = Validator::validate_oauth_state(state)?;
        let consumed = store
            .consume(&oauth_state_key(&state))
            .await?
            .ok_or(ConnectorError::InvalidState)?;
        let transient: OAuthTransientState =
            serde_json::from_value(consumed).map_err(|_| ConnectorError::InvalidState)?;

        if transient.user_id != expected_user_id {
            return Err(ConnectorError::StateUserMismatch);
        }
        if transient.provider_id != connector.provider_id() {
            return Err(ConnectorError::InvalidState);
        }

        let code = code.ok_or_else(|| ConnectorError::InvalidInput("missing authorization code".into()))?;
        let config = connector.oauth_config();

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), config.redirect_uri.clone()),
            ("client_id".to_string(), config.client_id.clone()),
            ("client_secret".to_string(), config.client_secret.expose_secret().clone()),
        ];
        if config.use_pkce {
            form.push((
                "code_verifier".to_string(),
                transient.code_verifier.expose_secret().clone(),
            ));
        }
        for (key, value) in connector.token_extra_params() {
            form.push((key, value));
        }

        let response = self.post_token_endpoint(&config.token_url, &form).await?;
        let mut token = token_from_response(expected_user_id, connector.provider_id(), &response, Utc::now())?;

        if let Some(scope) = connector.offline_access_scope() {
            let requested = config.scopes.iter().any(|s| s == scope);
            if requested && token.refresh_token.is_none() {
                warn!(
                    provider_id = connector.provider_id(),
                    scope, "token exchange omitted a refresh_token despite the offline-access scope being requested"
                );
            }
        }

        if let Err(err) = connector.discover_resource(&mut token).await {
            warn!(provider_id = connector.provider_id(), error = %err, "best-effort resource discovery failed");
        }

        store
            .set(
                &token_key(expected_user_id, connector.provider_id()),
                serde_json::to_value(&token)
                    .map_err(|e| ConnectorError::Store(format!("failed to serialize token: {e}")))?,
                expected_user_id,
            )
            .await?;

        Ok(token)
    }

    /// Loads the user's token for `connector`, refreshing it first if
    /// `auto_refresh` is true and the token needs it. A refresh's own
    /// internal reads never recurse into another refresh:
    /// `refresh_token` always calls this with `auto_refresh = false`.
    #[instrument(skip(self, connector, store), fields(provider_id = connector.provider_id(), auto_refresh))]
    pub async fn get_token(
        &self,
        connector: &dyn Connector,
        store: &CredentialStore,
        user_id: &str,
        auto_refresh: bool,
    ) -> Result<UserOAuthToken, ConnectorError> {
        let key = token_key(user_id, connector.provider_id());
        let raw = store
            .get(&key, user_id)
            .await?
            .ok_or_else(|| ConnectorError::NotAuthenticated {
                user_id: user_id.to_string(),
                provider_id: connector.provider_id().to_string(),
            })?;
        let token: UserOAuthToken = serde_json::from_value(raw)
            .map_err(|_| ConnectorError::CredentialDecode { key: key.clone() })?;

        if auto_refresh && token.needs_refresh(Utc::now()) {
            return self.refresh_token(connector, store, user_id).await;
        }
        Ok(token)
    }

    /// Refreshes the user's token for `connector`. Upstream errors that
    /// indicate the refresh token itself is dead mark the stored token
    /// `refresh_invalid`/`needs_reauth`; any other upstream failure
    /// (timeout, 5xx, network error) leaves the stored token untouched
    /// and is simply retried on the next access.
    #[instrument(skip(self, connector, store), fields(provider_id = connector.provider_id()))]
    async fn refresh_token(
        &self,
        connector: &dyn Connector,
        store: &CredentialStore,
        user_id: &str,
    ) -> Result<UserOAuthToken, ConnectorError> {
        let current = self.get_token(connector, store, user_id, false).await?;
        let Some(refresh_token) = &current.refresh_token else {
            return Ok(current);
        };

        let config = connector.oauth_config();
        let form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.expose_secret().clone()),
            ("client_id".to_string(), config.client_id.clone()),
            ("client_secret".to_string(), config.client_secret.expose_secret().clone()),
        ];

        let response = match self.post_token_endpoint(&config.token_url, &form).await {
            Ok(response) => response,
            Err(err) => {
                if is_invalid_grant(&err) {
                    let mut invalidated = current;
                    invalidated.mark_refresh_invalid();
                    store
                        .set(
                            &token_key(user_id, connector.provider_id()),
                            serde_json::to_value(&invalidated)
                                .map_err(|e| ConnectorError::Store(e.to_string()))?,
                            user_id,
                        )
                        .await?;
                    warn!(provider_id = connector.provider_id(), "refresh token rejected by provider");
                }
                return Err(err);
            }
        };

        let mut refreshed = token_from_response(user_id, connector.provider_id(), &response, Utc::now())?;
        refreshed.last_refreshed = Some(Utc::now());

        if refreshed.refresh_token.is_none() {
            if connector.policy().rotating_refresh {
                refreshed.refresh_token = None;
                refreshed.mark_refresh_invalid();
                warn!(
                    provider_id = connector.provider_id(),
                    "rotating-refresh provider omitted a new refresh token; marking NeedsReauth"
                );
            } else {
                // Non-rotating provider: keep the existing refresh token.
                refreshed.refresh_token = current.refresh_token.clone();
            }
        }
        if refreshed.additional_data.is_empty() {
            refreshed.additional_data = current.additional_data.clone();
        }
        refreshed.created_at = current.created_at;

        store
            .set(
                &token_key(user_id, connector.provider_id()),
                serde_json::to_value(&refreshed).map_err(|e| ConnectorError::Store(e.to_string()))?,
                user_id,
            )
            .await?;

        debug!(provider_id = connector.provider_id(), "token refreshed");
        Ok(refreshed)
    }

    /// Best-effort token revocation: failures are logged, never
    /// propagated, since the caller (disconnect) must clean up local
    /// state regardless.
    #[instrument(skip(self, connector, token), fields(provider_id = connector.provider_id()))]
    pub async fn revoke(&self, connector: &dyn Connector, token: &UserOAuthToken) {
        let Some(revoke_url) = connector.oauth_config().revoke_url.clone() else {
            return;
        };
        let config = connector.oauth_config();
        let form = vec![
            ("token".to_string(), token.access_token.expose_secret().clone()),
            ("client_id".to_string(), config.client_id.clone()),
            ("client_secret".to_string(), config.client_secret.expose_secret().clone()),
        ];
        if let Err(err) = self.http.post(&revoke_url).form(&form).send().await {
            warn!(provider_id = connector.provider_id(), error = %err, "best-effort token revocation failed");
        }
    }

    async fn post_token_endpoint(&self, url: &str, form: &[(String, String)]) -> Result<Value, ConnectorError> {
        let http = &self.http;
        let response = retry_with_backoff(
            RetryConfig::default(),
            || async {
                http.post(url)
                    .form(form)
                    .send()
                    .await
                    .map_err(|e| ConnectorError::UpstreamRequest {
                        target: url.to_string(),
                        message: e.to_string(),
                    })
            },
            |err: &ConnectorError| matches!(err, ConnectorError::UpstreamRequest { .. }),
        )
        .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectorError::UpstreamRequest { target: url.to_string(), message: e.to_string() })?;

        if !status.is_success() {
            return Err(ConnectorError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ConnectorError::UpstreamRequest { target: url.to_string(), message: e.to_string() })
    }
}

fn is_invalid_grant(err: &ConnectorError) -> bool {
    match err {
        ConnectorError::UpstreamStatus { status, body } => {
            *status == 400 || *status == 401 || body.contains("invalid_grant")
        }
        _ => false,
    }
}

fn token_from_response(
    user_id: &str,
    provider_id: &str,
    response: &Value,
    now: DateTime<Utc>,
) -> Result<UserOAuthToken, ConnectorError> {
    let access_token = response
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConnectorError::UpstreamRequest {
            target: provider_id.to_string(),
            message: "token response missing access_token".to_string(),
        })?;

    let expires_at = response
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|secs| now + ChronoDuration::seconds(secs));

    Ok(UserOAuthToken {
        user_id: user_id.to_string(),
        provider_id: provider_id.to_string(),
        access_token: Secret::new(access_token.to_string()),
        token_type: response
            .get("token_type")
            .and_then(|v| v.as_str())
            .unwrap_or("Bearer")
            .to_string(),
        refresh_token: response
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(|s| Secret::new(s.to_string())),
        expires_at,
        scope: response.get("scope").and_then(|v| v.as_str()).map(String::from),
        id_token: response
            .get("id_token")
            .and_then(|v| v.as_str())
            .map(|s| Secret::new(s.to_string())),
        additional_data: HashMap::new(),
        last_refreshed: None,
        created_at: now,
    })
}

/// Computes a connector's derived status from the current token state.
/// Never itself stored as ground truth — always recomputed at read
/// time.
pub fn derive_status(token: Option<&Result<UserOAuthToken, ConnectorError>>, now: DateTime<Utc>) -> ConnectorStatus {
    match token {
        None => ConnectorStatus::NotConfigured,
        Some(Err(_)) => ConnectorStatus::NotConfigured,
        Some(Ok(token)) => {
            if token.needs_reauth() {
                return ConnectorStatus::Error;
            }
            if !token.is_expired(now) {
                return ConnectorStatus::Connected;
            }
            if token.refresh_token.is_some() {
                ConnectorStatus::Connected
            } else {
                ConnectorStatus::Error
            }
        }
    }
}

/// Derives status directly from a raw, possibly-undecodable store
/// value. Implements the defensive tolerant-decrypt policy: a record
/// that fails to parse but whose raw `access_token` field is non-empty
/// is still reported `Connected`, logged at `warn!` so the condition is
/// observable without changing the returned status.
pub fn derive_status_from_raw(raw: Option<&Value>, now: DateTime<Utc>) -> ConnectorStatus {
    let Some(raw) = raw else {
        return ConnectorStatus::NotConfigured;
    };
    match serde_json::from_value::<UserOAuthToken>(raw.clone()) {
        Ok(token) => derive_status(Some(&Ok(token)), now),
        Err(_) => {
            let has_access_token = raw
                .get("access_token")
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if has_access_token {
                warn!("token record failed to parse but carries a non-empty access_token; reporting Connected defensively");
                ConnectorStatus::Connected
            } else {
                ConnectorStatus::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::models::{ConnectorMetadata, GrantType, OAuthConfig, OAuthVersion};
    use crate::tool::ExecutableTool;

    struct RotatingConnector {
        oauth_config: OAuthConfig,
    }

    impl RotatingConnector {
        fn new(token_url: String) -> Self {
            Self {
                oauth_config: OAuthConfig {
                    provider_id: "rotating".into(),
                    client_id: "client".into(),
                    client_secret: Secret::new("secret".into()),
                    authorize_url: "https://example.com/authorize".into(),
                    token_url,
                    redirect_uri: "https://runtime.example.com/callback".into(),
                    scopes: vec!["read".into()],
                    oauth_version: OAuthVersion::V2,
                    use_pkce: true,
                    grant_type: GrantType::AuthorizationCode,
                    additional_params: HashMap::new(),
                    revoke_url: None,
                    userinfo_url: None,
                },
            }
        }
    }

    #[async_trait]
    impl Connector for RotatingConnector {
        fn provider_id(&self) -> &str {
            "rotating"
        }

        fn metadata(&self) -> ConnectorMetadata {
            ConnectorMetadata {
                provider_id: "rotating".into(),
                display_name: "rotating".into(),
                description: "d".into(),
                icon_url: None,
                oauth_version: OAuthVersion::V2,
                available_tools: Vec::new(),
                required_scopes: Vec::new(),
                optional_scopes: Vec::new(),
                rate_limits: None,
            }
        }

        fn oauth_config(&self) -> &OAuthConfig {
            &self.oauth_config
        }

        fn policy(&self) -> ProviderPolicy {
            ProviderPolicy {
                rotating_refresh: true,
                force_consent: false,
            }
        }

        async fn build_tools(
            &self,
            _token: &UserOAuthToken,
            _enabled_tools: &HashSet<String>,
        ) -> Result<Vec<ExecutableTool>, ConnectorError> {
            Ok(Vec::new())
        }

        async fn build_tool(&self, tool_id: &str, _token: &UserOAuthToken) -> Result<ExecutableTool, ConnectorError> {
            Err(ConnectorError::InvalidTool {
                provider_id: "rotating".into(),
                tool_id: tool_id.to_string(),
            })
        }
    }

    async fn test_store() -> (CredentialStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").to_string_lossy().to_string();
        let db = std::sync::Arc::new(crate::db::DBClient::new(&path).await.unwrap());
        db.initialize_schema().await.unwrap();
        let cipher =
            crate::crypto::MasterCipher::from_base64_key(&crate::crypto::MasterCipher::generate_base64_key()).unwrap();
        (CredentialStore::new(db, cipher), dir)
    }

    /// E2 — a rotating-refresh provider that omits a new `refresh_token`
    /// on refresh leaves the stored token marked both `refresh_invalid`
    /// and `needs_reauth`, not just `needs_reauth`.
    #[tokio::test]
    async fn e2_rotating_refresh_without_new_token_marks_refresh_invalid() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/token"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access-token",
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let (store, _dir) = test_store().await;
        let connector = RotatingConnector::new(format!("{}/token", server.uri()));
        let machine = OAuthMachine::new(reqwest::Client::new());

        let expired = UserOAuthToken {
            user_id: "u1".into(),
            provider_id: "rotating".into(),
            access_token: Secret::new("old-access-token".into()),
            token_type: "Bearer".into(),
            refresh_token: Some(Secret::new("old-refresh-token".into())),
            expires_at: Some(Utc::now() - ChronoDuration::seconds(10)),
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: Utc::now(),
        };
        store
            .set(
                &token_key("u1", "rotating"),
                serde_json::to_value(&expired).unwrap(),
                "u1",
            )
            .await
            .unwrap();

        let refreshed = machine.get_token(&connector, &store, "u1", true).await.unwrap();

        assert_eq!(
            refreshed.additional_data.get("refresh_invalid"),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            refreshed.additional_data.get("needs_reauth"),
            Some(&Value::Bool(true))
        );
        assert!(refreshed.refresh_token.is_none());
    }

    #[test]
    fn r3_pkce_verifier_challenge_round_trips() {
        let pkce = generate_pkce();
        let mut hasher = Sha256::new();
        hasher.update(pkce.code_verifier.expose_secret().as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(pkce.code_challenge, expected);
    }

    #[test]
    fn pkce_state_and_verifier_are_distinct_and_nonempty() {
        let pkce = generate_pkce();
        assert!(!pkce.state.is_empty());
        assert_ne!(pkce.state, *pkce.code_verifier.expose_secret());
    }

    #[test]
    fn two_pkce_generations_never_collide() {
        let a = generate_pkce();
        let b = generate_pkce();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_challenge, b.code_challenge);
    }

    #[test]
    fn derive_status_no_token_is_not_configured() {
        assert_eq!(derive_status(None, Utc::now()), ConnectorStatus::NotConfigured);
    }

    #[test]
    fn derive_status_expired_with_refresh_is_connected() {
        let now = Utc::now();
        let token = UserOAuthToken {
            user_id: "u1".into(),
            provider_id: "jira".into(),
            access_token: Secret::new("at".into()),
            token_type: "Bearer".into(),
            refresh_token: Some(Secret::new("rt".into())),
            expires_at: Some(now - ChronoDuration::seconds(1000)),
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: now,
        };
        assert_eq!(derive_status(Some(&Ok(token)), now), ConnectorStatus::Connected);
    }

    #[test]
    fn derive_status_expired_without_refresh_is_error() {
        let now = Utc::now();
        let token = UserOAuthToken {
            user_id: "u1".into(),
            provider_id: "jira".into(),
            access_token: Secret::new("at".into()),
            token_type: "Bearer".into(),
            refresh_token: None,
            expires_at: Some(now - ChronoDuration::seconds(1000)),
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: now,
        };
        assert_eq!(derive_status(Some(&Ok(token)), now), ConnectorStatus::Error);
    }

    #[test]
    fn derive_status_from_raw_defensive_path_reports_connected() {
        let raw = serde_json::json!({"access_token": "still-here", "garbage_field": {"nested": true}});
        assert_eq!(derive_status_from_raw(Some(&raw), Utc::now()), ConnectorStatus::Connected);
    }

    #[test]
    fn derive_status_from_raw_with_empty_access_token_is_error() {
        let raw = serde_json::json!({"access_token": ""});
        assert_eq!(derive_status_from_raw(Some(&raw), Utc::now()), ConnectorStatus::Error);
    }
}
