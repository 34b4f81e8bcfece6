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

//! A single user's OAuth token record for one provider.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

/// The 60-second safety buffer applied to every expiry comparison.
pub const EXPIRY_BUFFER_SECONDS: i64 = 60;

/// A proactive refresh kicks in once this fraction of the token's
/// lifetime has elapsed since it was last refreshed.
pub const PROACTIVE_REFRESH_FRACTION: f64 = 0.8;

fn secret_eq(a: &Secret<String>, b: &Secret<String>) -> bool {
    a.expose_secret() == b.expose_secret()
}

fn opt_secret_eq(a: &Option<Secret<String>>, b: &Option<Secret<String>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => secret_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// One user's OAuth token for one provider, as held by the credential
/// store at `user:{user_id}:connector:{provider_id}:token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOAuthToken {
    /// The user this token belongs to.
    pub user_id: String,
    /// The provider this token authenticates against.
    pub provider_id: String,
    /// The bearer (or similar) access token.
    pub access_token: Secret<String>,
    /// Token type, e.g. `"Bearer"`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    /// Access token expiry, if the provider declared one.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Space-joined scope string actually granted by the provider.
    #[serde(default)]
    pub scope: Option<String>,
    /// OIDC id token, if the provider issued one.
    #[serde(default)]
    pub id_token: Option<Secret<String>>,
    /// Provider-specific extras: `refresh_invalid`, `needs_reauth`,
    /// `cloud_id`, `workspace_id`, `rotating_refresh`, etc.
    #[serde(default)]
    pub additional_data: HashMap<String, serde_json::Value>,
    /// When this token was last successfully refreshed.
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    /// When this token record was first created.
    pub created_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl PartialEq for UserOAuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.provider_id == other.provider_id
            && secret_eq(&self.access_token, &other.access_token)
            && self.token_type == other.token_type
            && opt_secret_eq(&self.refresh_token, &other.refresh_token)
            && self.expires_at == other.expires_at
            && self.scope == other.scope
            && opt_secret_eq(&self.id_token, &other.id_token)
            && self.additional_data == other.additional_data
            && self.last_refreshed == other.last_refreshed
            && self.created_at == other.created_at
    }
}

impl UserOAuthToken {
    /// True once `expires_at` (minus the safety buffer) has passed. A
    /// token with no declared expiry never expires by this check.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_BUFFER_SECONDS),
            None => false,
        }
    }

    /// True if this token should be refreshed before use: either it is
    /// already expired, or it has crossed 80% of its lifetime since the
    /// last refresh. A token with no refresh token never needs refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.refresh_token.is_none() {
            return false;
        }
        if self.is_expired(now) {
            return true;
        }
        match (self.expires_at, self.last_refreshed) {
            (Some(expires_at), Some(last_refreshed)) => {
                let lifetime = expires_at - last_refreshed;
                if lifetime <= Duration::zero() {
                    return false;
                }
                let elapsed = now - last_refreshed;
                elapsed.num_milliseconds() as f64
                    > PROACTIVE_REFRESH_FRACTION * lifetime.num_milliseconds() as f64
            }
            _ => false,
        }
    }

    /// True if the provider is known to have declared this refresh as
    /// rotating, per `additional_data.rotating_refresh`.
    pub fn is_rotating_refresh(&self) -> bool {
        self.additional_data
            .get("rotating_refresh")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// True once a refresh has marked this token's refresh token as
    /// invalid/revoked and requiring re-consent.
    pub fn needs_reauth(&self) -> bool {
        self.additional_data
            .get("needs_reauth")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Marks this token as requiring re-authentication after an upstream
    /// refresh failure that indicates the refresh token itself is dead.
    pub fn mark_refresh_invalid(&mut self) {
        self.additional_data
            .insert("refresh_invalid".to_string(), serde_json::Value::Bool(true));
        self.additional_data
            .insert("needs_reauth".to_string(), serde_json::Value::Bool(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_token(now: DateTime<Utc>) -> UserOAuthToken {
        UserOAuthToken {
            user_id: "u1".into(),
            provider_id: "jira".into(),
            access_token: Secret::new("at".into()),
            token_type: "Bearer".into(),
            refresh_token: Some(Secret::new("rt".into())),
            expires_at: None,
            scope: None,
            id_token: None,
            additional_data: HashMap::new(),
            last_refreshed: None,
            created_at: now,
        }
    }

    #[test]
    fn no_expiry_never_expires() {
        let now = Utc::now();
        let token = base_token(now);
        assert!(!token.is_expired(now));
        assert!(!token.needs_refresh(now));
    }

    #[test]
    fn b1_expires_in_30s_is_expired_and_needs_refresh() {
        let now = Utc::now();
        let mut token = base_token(now);
        token.expires_at = Some(now + Duration::seconds(30));
        assert!(token.is_expired(now));
        assert!(token.needs_refresh(now));
    }

    #[test]
    fn no_refresh_token_never_needs_refresh_even_if_expired() {
        let now = Utc::now();
        let mut token = base_token(now);
        token.refresh_token = None;
        token.expires_at = Some(now - Duration::seconds(1000));
        assert!(token.is_expired(now));
        assert!(!token.needs_refresh(now));
    }

    #[test]
    fn proactive_refresh_kicks_in_past_80_percent_lifetime() {
        let now = Utc::now();
        let mut token = base_token(now);
        token.last_refreshed = Some(now - Duration::seconds(90));
        token.expires_at = Some(now - Duration::seconds(90) + Duration::seconds(100));
        // 90/100 = 90% elapsed, past the 80% threshold, but not yet expired.
        assert!(!token.is_expired(now));
        assert!(token.needs_refresh(now));
    }

    #[test]
    fn below_80_percent_lifetime_does_not_need_refresh() {
        let now = Utc::now();
        let mut token = base_token(now);
        token.last_refreshed = Some(now - Duration::seconds(10));
        token.expires_at = Some(now - Duration::seconds(10) + Duration::seconds(100));
        assert!(!token.needs_refresh(now));
    }

    #[test]
    fn b3_boundary_599_vs_600_seconds() {
        let created = Utc::now() - Duration::seconds(599);
        assert!(Utc::now() - created < Duration::seconds(600));
        let created_expired = Utc::now() - Duration::seconds(600);
        assert!(Utc::now() - created_expired >= Duration::seconds(600));
    }

    #[test]
    fn mark_refresh_invalid_sets_both_flags() {
        let now = Utc::now();
        let mut token = base_token(now);
        token.mark_refresh_invalid();
        assert!(token.needs_reauth());
        assert_eq!(
            token.additional_data.get("refresh_invalid"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}
