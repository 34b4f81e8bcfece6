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

//! # Connector Runtime
//!
//! A user-scoped OAuth connector runtime: every user of an agent
//! platform authenticates their own copy of a third-party service
//! (Jira, a Google Workspace, a user-registered MCP server), and this
//! crate turns that per-user authorization into a set of invocable
//! tools an agent can call.
//!
//! ## Modules
//!
//! - [`registry`] - system and per-user connector lookup (§4.1)
//! - [`manager`] - connector lifecycle and tool materialization (§4.2)
//! - [`connector`] - the [`connector::Connector`] trait, shared OAuth
//!   state machine, and the REST/MCP adapters
//! - [`store`] - the encrypted, multi-tenant credential store
//! - [`models`] - the data shapes persisted and exchanged throughout
//! - [`tool`] - the [`tool::ExecutableTool`] an agent actually invokes
//! - [`db`] - the SurrealDB/RocksDB client and schema
//! - [`security`] - identifier validation ahead of store key interpolation
//! - [`crypto`] - AES-256-GCM encryption-at-rest for stored secrets
//! - [`retry`] - exponential backoff for upstream calls
//! - [`config`] - startup configuration (provider registrations, crypto key)
//! - [`error`] - the crate-wide error type and its taxonomy
//!
//! ## Architecture
//!
//! A [`Registry`] holds every connector the process knows about —
//! system connectors built at startup, plus user-registered MCP
//! connectors loaded lazily. A [`Manager`] sits in front of it: it
//! drives the OAuth flow, owns the enable/disable/disconnect
//! lifecycle, and materializes a user's currently-enabled tools into a
//! flat `Vec<ExecutableTool>` an agent runtime can call directly,
//! backed by a short-lived per-user cache so a busy chat session isn't
//! re-fetching every connector's catalog on every turn.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use connector_runtime::{Manager, Registry};
//!
//! let registry = Arc::new(Registry::new());
//! registry.register("jira", Arc::new(jira_connector));
//!
//! let manager = Manager::new(registry, store, http_client, "https://agents.example.com/oauth/callback");
//! let tools = manager.tools_for("user-123", false).await?;
//! ```

pub mod config;
pub mod connector;
pub mod crypto;
pub mod db;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod models;
pub mod registry;
pub mod retry;
pub mod security;
pub mod store;
pub mod tool;

pub use config::{CryptoConfig, RuntimeConfig, RuntimeConfigFile};
pub use connector::{Connector, OAuthMachine};
pub use error::{ConnectorError, ErrorCategory, Result};
pub use manager::Manager;
pub use models::{
    ConnectorMetadata, ConnectorStatus, ConnectorTool, OAuthConfig, UserConnectorConfig, UserConnectorView,
    UserOAuthToken,
};
pub use registry::Registry;
pub use store::CredentialStore;
pub use tool::ExecutableTool;

/// Initializes a process-wide `tracing` subscriber: pretty console output
/// under `cfg(debug_assertions)`, JSON lines otherwise. Controlled by
/// `RUST_LOG`, defaulting to `connector_runtime=info,warn`. This crate
/// ships no binary of its own, so the embedding application calls this
/// once at startup rather than the crate initializing a subscriber
/// implicitly.
pub fn init_tracing() {
    use tracing_subscriber::{
        fmt::{self, format::FmtSpan},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("connector_runtime=info,warn"));

    #[cfg(not(debug_assertions))]
    {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);
        tracing_subscriber::registry().with(env_filter).with(json_layer).init();
    }

    #[cfg(debug_assertions)]
    {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .pretty();
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
    }
}
