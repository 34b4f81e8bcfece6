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

//! Transient OAuth state: correlates an `auth/init` call with its
//! callback. Plaintext JSON by design — short-lived, one-shot, and not a
//! secret-bearing artifact beyond the PKCE verifier it carries, which is
//! itself consumed the instant it is read.

use chrono::{DateTime, Utc};
use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// The transient OAuth state TTL, in seconds. Exactly 600 per spec.
pub const OAUTH_STATE_TTL_SECONDS: u64 = 600;

/// The record stored at `oauth:state:{state}` between `auth/init` and
/// the provider's callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTransientState {
    /// The user who initiated this authorize flow.
    pub user_id: String,
    /// The provider being authorized.
    pub provider_id: String,
    /// The PKCE code verifier that produced this flow's code challenge.
    pub code_verifier: Secret<String>,
    /// When this state record was created, for diagnostic purposes —
    /// expiry itself is enforced by the store's `setex` TTL, not by
    /// comparing this field.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn round_trips_through_json() {
        let state = OAuthTransientState {
            user_id: "u1".into(),
            provider_id: "jira".into(),
            code_verifier: Secret::new("verifier".into()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&state).unwrap();
        let restored: OAuthTransientState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.user_id, "u1");
        assert_eq!(restored.code_verifier.expose_secret(), "verifier");
    }
}
