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

//! Crate-wide error type for the connector runtime.
//!
//! Every variant maps onto one of the taxonomy categories a caller needs to
//! react to: `Input` and `State` errors that touch nothing, `Upstream`
//! errors from a provider, `Credential` errors from the store, and
//! MCP-only `Coercion` errors. [`ConnectorError::category`] classifies any
//! error without string-matching on its `Display` output.

use thiserror::Error;

use crate::security::validation::ValidationError;

/// Error category, mirroring the taxonomy in the connector runtime design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or invalid caller input; no side effects occurred.
    Input,
    /// The operation conflicts with current connector/token state.
    State,
    /// A third-party provider returned an error or was unreachable.
    Upstream,
    /// The credential store failed to read, write, or decrypt a record.
    Credential,
    /// MCP tool-input coercion failed to produce a valid argument map.
    Coercion,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::State => write!(f, "state"),
            ErrorCategory::Upstream => write!(f, "upstream"),
            ErrorCategory::Credential => write!(f, "credential"),
            ErrorCategory::Coercion => write!(f, "coercion"),
        }
    }
}

/// The crate-wide error type returned by every public operation.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Caller-supplied provider id is not registered.
    #[error("unknown provider '{provider_id}'")]
    UnknownProvider {
        /// The provider id that was not found.
        provider_id: String,
    },

    /// `update_user_tools` was given an id outside the connector's
    /// advertised tool set.
    #[error("tool '{tool_id}' is not advertised by provider '{provider_id}'")]
    InvalidTool {
        /// The provider the tool was expected to belong to.
        provider_id: String,
        /// The offending tool id.
        tool_id: String,
    },

    /// A general input validation failure.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation that requires an authenticated token was attempted
    /// without one.
    #[error("user '{user_id}' is not authenticated with provider '{provider_id}'")]
    NotAuthenticated {
        /// The user id.
        user_id: String,
        /// The provider id.
        provider_id: String,
    },

    /// The OAuth transient state was missing, expired, or already consumed.
    #[error("invalid or expired oauth state")]
    InvalidState,

    /// The OAuth transient state belonged to a different user than the
    /// one completing the callback.
    #[error("oauth state does not belong to this user")]
    StateUserMismatch,

    /// The provider's authorize redirect carried an `error` parameter.
    #[error("upstream authorization error: {0}")]
    Upstream(String),

    /// A network-level failure talking to a provider or MCP server.
    #[error("upstream request to '{target}' failed: {message}")]
    UpstreamRequest {
        /// Host or logical endpoint that was being reached.
        target: String,
        /// Underlying error message.
        message: String,
    },

    /// A non-2xx HTTP response from a provider or MCP server.
    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },

    /// The credential store failed to read or write a record.
    #[error("credential store error: {0}")]
    Store(String),

    /// A stored record could not be decoded, even after tolerant parsing.
    #[error("credential record for '{key}' could not be decoded")]
    CredentialDecode {
        /// The store key that failed to decode.
        key: String,
    },

    /// Master-key or AES-GCM encryption/decryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// MCP tool-input coercion exhausted every ladder step.
    #[error("could not coerce input into the tool's expected arguments: {summary}")]
    Coercion {
        /// Human-readable summary of the expected schema, for the caller
        /// to surface back to the agent or user.
        summary: String,
    },

    /// Configuration supplied at startup is invalid (e.g. an OAuth1 config,
    /// an unsupported MCP transport).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The runtime is shutting down; the operation was aborted before (or
    /// while) it completed.
    #[error("connector runtime is shutting down")]
    ShuttingDown,
}

impl ConnectorError {
    /// Classifies this error into the crate's error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConnectorError::UnknownProvider { .. }
            | ConnectorError::InvalidTool { .. }
            | ConnectorError::InvalidInput(_)
            | ConnectorError::Configuration(_) => ErrorCategory::Input,

            ConnectorError::NotAuthenticated { .. }
            | ConnectorError::InvalidState
            | ConnectorError::StateUserMismatch
            | ConnectorError::ShuttingDown => ErrorCategory::State,

            ConnectorError::Upstream(_)
            | ConnectorError::UpstreamRequest { .. }
            | ConnectorError::UpstreamStatus { .. } => ErrorCategory::Upstream,

            ConnectorError::Store(_) | ConnectorError::CredentialDecode { .. } | ConnectorError::Crypto(_) => {
                ErrorCategory::Credential
            }

            ConnectorError::Coercion { .. } => ErrorCategory::Coercion,
        }
    }

    /// True if the operation performed no side effects and is safe to
    /// retry verbatim once the input is corrected.
    pub fn is_side_effect_free(&self) -> bool {
        matches!(self.category(), ErrorCategory::Input | ErrorCategory::State)
    }
}

impl From<ValidationError> for ConnectorError {
    /// A rejected identifier never touched the store; it belongs in the
    /// `Input` category alongside the rest of this crate's caller-input
    /// errors.
    fn from(err: ValidationError) -> Self {
        ConnectorError::InvalidInput(err.to_string())
    }
}

/// Convenience alias used throughout the crate's library surface.
pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_to_input_category() {
        let err: ConnectorError = ValidationError::Empty { field: "user_id".to_string() }.into();
        assert_eq!(err.category(), ErrorCategory::Input);
    }

    #[test]
    fn category_maps_input_errors() {
        let err = ConnectorError::InvalidTool {
            provider_id: "jira".into(),
            tool_id: "ghost".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Input);
        assert!(err.is_side_effect_free());
    }

    #[test]
    fn category_maps_state_errors() {
        let err = ConnectorError::NotAuthenticated {
            user_id: "u1".into(),
            provider_id: "jira".into(),
        };
        assert_eq!(err.category(), ErrorCategory::State);
        assert!(err.is_side_effect_free());
    }

    #[test]
    fn category_maps_upstream_errors() {
        let err = ConnectorError::UpstreamStatus {
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert!(!err.is_side_effect_free());
    }

    #[test]
    fn category_maps_credential_errors() {
        let err = ConnectorError::CredentialDecode { key: "k".into() };
        assert_eq!(err.category(), ErrorCategory::Credential);
    }

    #[test]
    fn category_maps_shutting_down_as_state() {
        assert_eq!(ConnectorError::ShuttingDown.category(), ErrorCategory::State);
    }

    #[test]
    fn category_maps_coercion_errors() {
        let err = ConnectorError::Coercion {
            summary: "expects {a, b}".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Coercion);
    }
}
