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

//! Startup configuration: provider OAuth registrations, MCP connector
//! defaults, and the server-wide crypto master key.
//!
//! Secrets (`client_secret`, the master key) come from environment
//! variables; everything else (URLs, scopes, rate limits, the
//! per-provider rotating-refresh/forced-consent policy table) is loaded
//! from a serde-deserialized config file, matching the corpus's
//! environment-driven configuration style.

use std::collections::HashMap;
use std::env;

use secrecy::Secret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::connector::policy::ProviderPolicy;
use crate::crypto::MasterCipher;
use crate::error::ConnectorError;
use crate::models::OAuthConfig;

/// Non-secret, file-loadable shape of one provider's OAuth registration.
/// `client_secret` is merged in separately from an environment variable
/// so it never has to round-trip through a config file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfigFile {
    /// Provider identifier.
    pub provider_id: String,
    /// OAuth client id.
    pub client_id: String,
    /// Provider's authorization endpoint.
    pub authorize_url: String,
    /// Provider's token endpoint.
    pub token_url: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Ordered scopes requested on every authorize URL.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// OAuth protocol version; only `"2.0"` is supported.
    #[serde(default = "default_oauth_version")]
    pub oauth_version: String,
    /// Whether to use PKCE.
    #[serde(default = "default_true")]
    pub use_pkce: bool,
    /// Grant type, one of `authorization_code`, `client_credentials`,
    /// `refresh_token`.
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    /// Extra authorize-URL query parameters.
    #[serde(default)]
    pub additional_params: HashMap<String, String>,
    /// Provider's revocation endpoint, if any.
    #[serde(default)]
    pub revoke_url: Option<String>,
    /// Provider's userinfo endpoint, if any.
    #[serde(default)]
    pub userinfo_url: Option<String>,
    /// Whether this provider's refresh tokens rotate on every use.
    #[serde(default)]
    pub rotating_refresh: bool,
    /// Whether this provider is known to silently drop refresh tokens
    /// on a silent re-consent, forcing `prompt=consent` on every
    /// authorize URL.
    #[serde(default)]
    pub force_consent: bool,
}

fn default_true() -> bool {
    true
}

fn default_oauth_version() -> String {
    "2.0".to_string()
}

fn default_grant_type() -> String {
    "authorization_code".to_string()
}

/// The non-secret parts of startup configuration, deserialized from a
/// config file (JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfigFile {
    /// One entry per registered provider.
    #[serde(default)]
    pub providers: Vec<OAuthConfigFile>,
}

/// Fully resolved startup configuration: every provider's `OAuthConfig`
/// plus its rotating-refresh/forced-consent policy, environment
/// secrets merged in.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Resolved OAuth configuration per provider.
    pub oauth_configs: Vec<OAuthConfig>,
    /// Declarative per-provider policy, keyed by provider id.
    pub policies: HashMap<String, ProviderPolicy>,
    /// Filesystem path SurrealDB should persist to.
    pub db_path: String,
}

impl RuntimeConfig {
    /// Resolves a [`RuntimeConfigFile`] into a full [`RuntimeConfig`],
    /// reading each provider's client secret from
    /// `CONNECTOR_<PROVIDER_ID>_CLIENT_SECRET` (provider id
    /// upper-cased, non-alphanumeric characters replaced with `_`).
    pub fn from_file(file: RuntimeConfigFile, db_path: impl Into<String>) -> Result<Self, ConnectorError> {
        let mut oauth_configs = Vec::with_capacity(file.providers.len());
        let mut policies = HashMap::with_capacity(file.providers.len());

        for entry in file.providers {
            let env_key = client_secret_env_var(&entry.provider_id);
            let client_secret = env::var(&env_key).map_err(|_| {
                ConnectorError::Configuration(format!(
                    "missing environment variable '{env_key}' for provider '{}'",
                    entry.provider_id
                ))
            })?;

            let oauth_version = match entry.oauth_version.as_str() {
                "2.0" => crate::models::OAuthVersion::V2,
                "1.0a" => crate::models::OAuthVersion::V1,
                other => {
                    return Err(ConnectorError::Configuration(format!(
                        "provider '{}' declares unknown oauth_version '{other}'",
                        entry.provider_id
                    )))
                }
            };
            let grant_type = match entry.grant_type.as_str() {
                "authorization_code" => crate::models::GrantType::AuthorizationCode,
                "client_credentials" => crate::models::GrantType::ClientCredentials,
                "refresh_token" => crate::models::GrantType::RefreshToken,
                other => {
                    return Err(ConnectorError::Configuration(format!(
                        "provider '{}' declares unknown grant_type '{other}'",
                        entry.provider_id
                    )))
                }
            };

            let cfg = OAuthConfig {
                provider_id: entry.provider_id.clone(),
                client_id: entry.client_id,
                client_secret: Secret::new(client_secret),
                authorize_url: entry.authorize_url,
                token_url: entry.token_url,
                redirect_uri: entry.redirect_uri,
                scopes: entry.scopes,
                oauth_version,
                use_pkce: entry.use_pkce,
                grant_type,
                additional_params: entry.additional_params,
                revoke_url: entry.revoke_url,
                userinfo_url: entry.userinfo_url,
            };
            cfg.validate()?;

            policies.insert(
                entry.provider_id.clone(),
                ProviderPolicy {
                    rotating_refresh: entry.rotating_refresh,
                    force_consent: entry.force_consent,
                },
            );
            oauth_configs.push(cfg);
        }

        Ok(Self {
            oauth_configs,
            policies,
            db_path: db_path.into(),
        })
    }
}

/// Converts a provider id into the environment variable name its
/// client secret is read from, e.g. `"jira"` -> `CONNECTOR_JIRA_CLIENT_SECRET`.
pub fn client_secret_env_var(provider_id: &str) -> String {
    let normalized: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CONNECTOR_{normalized}_CLIENT_SECRET")
}

/// Server-wide AES-256-GCM master key configuration, kept separate from
/// per-provider OAuth configuration since it governs the store itself,
/// not any one connector.
pub struct CryptoConfig;

impl CryptoConfig {
    /// Resolves the master cipher from `CONNECTOR_MASTER_KEY`. If unset,
    /// generates a fresh random key and logs a warning — acceptable for
    /// local development, but the generated key does not survive a
    /// restart, so every previously encrypted record becomes
    /// unreadable.
    pub fn resolve_cipher() -> Result<MasterCipher, ConnectorError> {
        match env::var("CONNECTOR_MASTER_KEY") {
            Ok(key) => {
                info!("loaded crypto master key from CONNECTOR_MASTER_KEY");
                MasterCipher::from_base64_key(&key).map_err(|e| ConnectorError::Crypto(e.to_string()))
            }
            Err(_) => {
                warn!(
                    "CONNECTOR_MASTER_KEY not set; generating an ephemeral key for this process. \
                     Credential store records will not survive a restart."
                );
                let generated = MasterCipher::generate_base64_key();
                MasterCipher::from_base64_key(&generated).map_err(|e| ConnectorError::Crypto(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_secret_env_var_upper_cases_and_sanitizes() {
        assert_eq!(client_secret_env_var("jira"), "CONNECTOR_JIRA_CLIENT_SECRET");
        assert_eq!(
            client_secret_env_var("google-workspace"),
            "CONNECTOR_GOOGLE_WORKSPACE_CLIENT_SECRET"
        );
    }

    #[test]
    fn from_file_fails_without_the_env_secret() {
        let file = RuntimeConfigFile {
            providers: vec![OAuthConfigFile {
                provider_id: "unit_test_provider_xyz".into(),
                client_id: "c".into(),
                authorize_url: "https://a".into(),
                token_url: "https://t".into(),
                redirect_uri: "https://r".into(),
                scopes: vec![],
                oauth_version: "2.0".into(),
                use_pkce: true,
                grant_type: "authorization_code".into(),
                additional_params: HashMap::new(),
                revoke_url: None,
                userinfo_url: None,
                rotating_refresh: false,
                force_consent: false,
            }],
        };
        assert!(RuntimeConfig::from_file(file, "/tmp/db").is_err());
    }

    #[test]
    fn from_file_resolves_with_env_secret_present() {
        let provider_id = "unit_test_provider_abc";
        env::set_var(client_secret_env_var(provider_id), "shh");
        let file = RuntimeConfigFile {
            providers: vec![OAuthConfigFile {
                provider_id: provider_id.into(),
                client_id: "c".into(),
                authorize_url: "https://a".into(),
                token_url: "https://t".into(),
                redirect_uri: "https://r".into(),
                scopes: vec!["read".into()],
                oauth_version: "2.0".into(),
                use_pkce: true,
                grant_type: "authorization_code".into(),
                additional_params: HashMap::new(),
                revoke_url: None,
                userinfo_url: None,
                rotating_refresh: true,
                force_consent: false,
            }],
        };
        let resolved = RuntimeConfig::from_file(file, "/tmp/db").unwrap();
        assert_eq!(resolved.oauth_configs.len(), 1);
        assert!(resolved.policies[provider_id].rotating_refresh);
        env::remove_var(client_secret_env_var(provider_id));
    }
}
