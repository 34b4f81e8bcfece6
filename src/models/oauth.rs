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

//! System-level OAuth configuration: immutable once a provider is
//! registered with the [`crate::registry::Registry`].

use std::collections::HashMap;

use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// OAuth protocol version a provider speaks. Only `V2` is implemented;
/// `V1` exists so a misconfigured provider fails loudly at registration
/// rather than silently behaving like OAuth2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OAuthVersion {
    /// OAuth 1.0a. Declared for forward compatibility; not implemented.
    #[serde(rename = "1.0a")]
    V1,
    /// OAuth 2.0 (RFC 6749), the only version this runtime implements.
    #[serde(rename = "2.0")]
    V2,
}

/// Grant type used to obtain tokens for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code grant, optionally with PKCE. The only grant
    /// this runtime's authorize/callback flow drives end to end.
    AuthorizationCode,
    /// Client Credentials grant, for service-to-service providers with
    /// no per-user consent step.
    ClientCredentials,
    /// Refresh Token grant, used internally to renew an
    /// Authorization Code-obtained token.
    RefreshToken,
}

/// System-level, per-provider OAuth configuration. Immutable after
/// registration; holds no per-user state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Stable identifier for this provider, e.g. `"jira"`, `"google"`.
    pub provider_id: String,
    /// OAuth client id issued by the provider.
    pub client_id: String,
    /// OAuth client secret issued by the provider.
    pub client_secret: Secret<String>,
    /// Provider's authorization endpoint.
    pub authorize_url: String,
    /// Provider's token endpoint.
    pub token_url: String,
    /// Redirect URI registered with the provider for this deployment.
    pub redirect_uri: String,
    /// Ordered scopes requested on every authorize URL; serialized as a
    /// single space-joined string on the wire.
    pub scopes: Vec<String>,
    /// OAuth protocol version. Constructing a config with
    /// [`OAuthVersion::V1`] is rejected at registration.
    pub oauth_version: OAuthVersion,
    /// Whether to use PKCE on the authorization code exchange.
    #[serde(default = "default_true")]
    pub use_pkce: bool,
    /// Grant type used for the initial token acquisition.
    pub grant_type: GrantType,
    /// Extra query parameters forwarded verbatim on every authorize URL.
    #[serde(default)]
    pub additional_params: HashMap<String, String>,
    /// Provider's token revocation endpoint, if it has one.
    #[serde(default)]
    pub revoke_url: Option<String>,
    /// Provider's userinfo endpoint, if it has one.
    #[serde(default)]
    pub userinfo_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl OAuthConfig {
    /// Scopes joined into the single space-separated string providers
    /// expect on the wire.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Validates that this config is actually constructible by this
    /// runtime (OAuth 1.0a is declared but not implemented).
    pub fn validate(&self) -> Result<(), crate::error::ConnectorError> {
        if self.oauth_version == OAuthVersion::V1 {
            return Err(crate::error::ConnectorError::Configuration(format!(
                "provider '{}' declares OAuth 1.0a, which this runtime does not implement",
                self.provider_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OAuthConfig {
        OAuthConfig {
            provider_id: "jira".into(),
            client_id: "client".into(),
            client_secret: Secret::new("secret".into()),
            authorize_url: "https://example.com/authorize".into(),
            token_url: "https://example.com/token".into(),
            redirect_uri: "https://app.example.com/callback".into(),
            scopes: vec!["read:jira-work".into(), "offline_access".into()],
            oauth_version: OAuthVersion::V2,
            use_pkce: true,
            grant_type: GrantType::AuthorizationCode,
            additional_params: HashMap::new(),
            revoke_url: None,
            userinfo_url: None,
        }
    }

    #[test]
    fn scope_string_is_space_joined() {
        let cfg = sample();
        assert_eq!(cfg.scope_string(), "read:jira-work offline_access");
    }

    #[test]
    fn v2_config_validates() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn v1_config_is_rejected() {
        let mut cfg = sample();
        cfg.oauth_version = OAuthVersion::V1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn use_pkce_defaults_true_on_deserialize() {
        let json = serde_json::json!({
            "provider_id": "jira",
            "client_id": "c",
            "client_secret": "s",
            "authorize_url": "https://a",
            "token_url": "https://t",
            "redirect_uri": "https://r",
            "scopes": [],
            "oauth_version": "2.0",
            "grant_type": "authorization_code",
        });
        let cfg: OAuthConfig = serde_json::from_value(json).unwrap();
        assert!(cfg.use_pkce);
    }
}
