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

//! Validates the identifiers that flow into [`crate::store::CredentialStore`]'s
//! raw record-id interpolation before they get there. `user_id`, `provider_id`,
//! `tool_id` and the OAuth callback `state` are all attacker-influenced (a
//! caller picks its own user ids; a provider config file or a user's
//! enabled-tools list picks the rest; `state` is an HTTP query parameter an
//! external party controls at callback time) and end up spliced directly
//! into a SurrealQL record id — rejecting anything but a conservative
//! character set here is cheaper than quoting correctly at every call site.

use thiserror::Error;

/// Maximum allowed length for a user id.
pub const MAX_USER_ID_LEN: usize = 128;
/// Maximum allowed length for a provider id.
pub const MAX_PROVIDER_ID_LEN: usize = 64;
/// Maximum allowed length for a tool id.
pub const MAX_TOOL_ID_LEN: usize = 128;
/// Maximum allowed length for an OAuth `state` callback parameter.
pub const MAX_OAUTH_STATE_LEN: usize = 256;

/// Validation error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("input exceeds maximum length of {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// Input is empty when a value is required.
    #[error("required field cannot be empty: {field}")]
    Empty { field: String },

    /// Input contains invalid characters.
    #[error("input contains invalid characters: {details}")]
    InvalidCharacters { details: String },

    /// Input format is invalid (used for record-id validation).
    #[error("invalid format for {field}: {details}")]
    InvalidFormat { field: String, details: String },
}

/// Input validator with a fluent, stateless API.
pub struct Validator;

impl Validator {
    /// Validates a user id before it reaches a credential-store key.
    pub fn validate_user_id(user_id: &str) -> Result<String, ValidationError> {
        Self::validate_record_id_part(user_id, "user_id", MAX_USER_ID_LEN)
    }

    /// Validates a provider id before it reaches a credential-store key.
    pub fn validate_provider_id(provider_id: &str) -> Result<String, ValidationError> {
        Self::validate_record_id_part(provider_id, "provider_id", MAX_PROVIDER_ID_LEN)
    }

    /// Validates a tool id before it reaches a credential-store key.
    pub fn validate_tool_id(tool_id: &str) -> Result<String, ValidationError> {
        Self::validate_record_id_part(tool_id, "tool_id", MAX_TOOL_ID_LEN)
    }

    /// Validates an OAuth callback `state` parameter before it reaches
    /// [`crate::store::credential_store::oauth_state_key`]. `state` is an
    /// HTTP query parameter an external party controls at callback time,
    /// the same injection surface as `user_id`/`provider_id` — but unlike
    /// those, it is a base64url value this crate itself generates in
    /// [`crate::connector::generate_pkce`], which can legitimately start
    /// with a digit or be all digits, so the leading-digit rule in
    /// [`Validator::validate_record_id_part`] does not apply here.
    pub fn validate_oauth_state(state: &str) -> Result<String, ValidationError> {
        let trimmed = state.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "state".to_string(),
            });
        }

        if trimmed.len() > MAX_OAUTH_STATE_LEN {
            return Err(ValidationError::TooLong {
                max: MAX_OAUTH_STATE_LEN,
                actual: trimmed.len(),
            });
        }

        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ValidationError::InvalidCharacters {
                details: "state can only contain alphanumeric characters, underscore, and hyphen".to_string(),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Validates that a string is safe for use as a SurrealDB record id
    /// part: non-empty, within `max_len`, alphanumeric/underscore/hyphen
    /// only, and not leading with a digit (SurrealDB would otherwise parse
    /// the id as numeric).
    fn validate_record_id_part(part: &str, field_name: &str, max_len: usize) -> Result<String, ValidationError> {
        let trimmed = part.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: field_name.to_string(),
            });
        }

        if trimmed.len() > max_len {
            return Err(ValidationError::TooLong {
                max: max_len,
                actual: trimmed.len(),
            });
        }

        if trimmed.chars().next().map(|c| c.is_numeric()).unwrap_or(false) {
            return Err(ValidationError::InvalidFormat {
                field: field_name.to_string(),
                details: "cannot start with a number".to_string(),
            });
        }

        if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(ValidationError::InvalidCharacters {
                details: format!("{field_name} can only contain alphanumeric characters, underscore, and hyphen"),
            });
        }

        Ok(trimmed.to_string())
    }

    /// Truncates a string for safe inclusion in log lines. Does not redact
    /// secrets — callers must not pass a [`secrecy::Secret`]'s exposed
    /// value here in the first place.
    pub fn sanitize_for_logging(input: &str) -> String {
        const MAX_LOG_LEN: usize = 500;
        if input.len() > MAX_LOG_LEN {
            format!("{}...[truncated]", &input[..MAX_LOG_LEN])
        } else {
            input.to_string()
        }
    }
}
