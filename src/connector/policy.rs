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

//! Declarative per-provider policy: whether a provider's refresh
//! tokens rotate on every use, and whether it is known to silently
//! drop refresh tokens on a silent re-consent (forcing `prompt=consent`
//! on every authorize URL for that provider).
//!
//! Kept as data alongside each [`crate::models::OAuthConfig`]
//! registration rather than inline `if provider_id == "..."` branches,
//! grounded on the original implementation's hardcoded per-provider
//! table.

/// Per-provider OAuth behavior that cannot be inferred from the
/// provider's own metadata and must instead be declared at
/// registration time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderPolicy {
    /// True if this provider replaces the refresh token on every use,
    /// invalidating the previous one. A refresh response that omits a
    /// new refresh token for such a provider is terminal
    /// (`NeedsReauth`), not silently tolerated.
    pub rotating_refresh: bool,
    /// True if this provider is known to silently drop refresh tokens
    /// when a user re-consents without being shown an explicit prompt.
    /// Forces `prompt=consent` on every authorize URL for this
    /// provider, as a global default would over-prompt well-behaved
    /// providers.
    pub force_consent: bool,
}
