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

//! The Registry: a static `provider_id -> Connector` map built at startup
//! (system connectors) plus a per-user dynamic map of user-registered MCP
//! connectors.
//!
//! The system map is built once and swapped, never mutated in place, so a
//! concurrent reader never observes a partial write — the same swap-on-write
//! discipline this corpus uses for its process-wide provider snapshot. The
//! per-user map follows the identical shape so registering a user's custom
//! MCP server costs one pointer swap, not a lock held across the whole
//! lookup path.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::connector::Connector;
use crate::models::ConnectorMetadata;

/// An immutable snapshot of the system connector map plus the order
/// connectors were registered in, since tool materialization must walk
/// connectors in a fixed, deterministic order.
#[derive(Default)]
struct SystemSnapshot {
    order: Vec<String>,
    by_id: HashMap<String, Arc<dyn Connector>>,
}

impl Clone for SystemSnapshot {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            by_id: self.by_id.clone(),
        }
    }
}

/// An immutable snapshot of every user-registered MCP connector,
/// keyed by `(user_id, provider_id)`, with global registration order
/// preserved so per-user ordering can be recovered by filtering.
#[derive(Default)]
struct UserMcpSnapshot {
    order: Vec<(String, String)>,
    by_key: HashMap<(String, String), Arc<dyn Connector>>,
}

impl Clone for UserMcpSnapshot {
    fn clone(&self) -> Self {
        Self {
            order: self.order.clone(),
            by_key: self.by_key.clone(),
        }
    }
}

/// System + per-user connector lookup, per §4.1.
pub struct Registry {
    system: RwLock<Arc<SystemSnapshot>>,
    user_mcp: RwLock<Arc<UserMcpSnapshot>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry; connectors are added via [`Registry::register`].
    pub fn new() -> Self {
        Self {
            system: RwLock::new(Arc::new(SystemSnapshot::default())),
            user_mcp: RwLock::new(Arc::new(UserMcpSnapshot::default())),
        }
    }

    /// Registers (or replaces) a system connector. Replacing an existing
    /// provider id keeps its original registration-order position.
    pub fn register(&self, provider_id: impl Into<String>, connector: Arc<dyn Connector>) {
        let provider_id = provider_id.into();
        let mut guard = self.system.write().expect("registry system lock poisoned");
        let mut next = (**guard).clone();
        if !next.by_id.contains_key(&provider_id) {
            next.order.push(provider_id.clone());
        }
        next.by_id.insert(provider_id, connector);
        *guard = Arc::new(next);
    }

    /// Lazily registers one user's custom MCP connector. Idempotent:
    /// registering the same `(user_id, provider_id)` twice updates the
    /// connector in place without disturbing that user's registration
    /// order.
    pub fn register_user_connector(&self, user_id: impl Into<String>, provider_id: impl Into<String>, connector: Arc<dyn Connector>) {
        let key = (user_id.into(), provider_id.into());
        let mut guard = self.user_mcp.write().expect("registry user_mcp lock poisoned");
        let mut next = (**guard).clone();
        if !next.by_key.contains_key(&key) {
            next.order.push(key.clone());
        }
        next.by_key.insert(key, connector);
        *guard = Arc::new(next);
    }

    /// Looks up a connector for a user: the user-scoped map first,
    /// falling back to the system map. Both reads are cheap clones of an
    /// immutable snapshot, never blocked behind a registration in
    /// progress for longer than the swap itself.
    pub fn for_user(&self, user_id: &str, provider_id: &str) -> Option<Arc<dyn Connector>> {
        {
            let snapshot = self.user_mcp.read().expect("registry user_mcp lock poisoned").clone();
            if let Some(connector) = snapshot.by_key.get(&(user_id.to_string(), provider_id.to_string())) {
                return Some(connector.clone());
            }
        }
        let snapshot = self.system.read().expect("registry system lock poisoned").clone();
        snapshot.by_id.get(provider_id).cloned()
    }

    /// True if this user already has `provider_id` loaded into the
    /// per-user MCP map, used to keep lazy-loading idempotent.
    pub fn has_user_connector(&self, user_id: &str, provider_id: &str) -> bool {
        let snapshot = self.user_mcp.read().expect("registry user_mcp lock poisoned").clone();
        snapshot.by_key.contains_key(&(user_id.to_string(), provider_id.to_string()))
    }

    /// Every registered system connector's metadata, in registration
    /// order.
    pub fn list_system_connectors(&self) -> Vec<ConnectorMetadata> {
        let snapshot = self.system.read().expect("registry system lock poisoned").clone();
        snapshot.order.iter().filter_map(|id| snapshot.by_id.get(id)).map(|c| c.metadata()).collect()
    }

    /// Every connector visible to `user_id` in the deterministic order
    /// tool materialization requires: system connectors in registration
    /// order, then that user's registered MCP connectors in the order
    /// they were loaded.
    pub fn ordered_connectors_for(&self, user_id: &str) -> Vec<(String, Arc<dyn Connector>)> {
        let system = self.system.read().expect("registry system lock poisoned").clone();
        let mut out: Vec<(String, Arc<dyn Connector>)> = system
            .order
            .iter()
            .filter_map(|id| system.by_id.get(id).map(|c| (id.clone(), c.clone())))
            .collect();

        let user_mcp = self.user_mcp.read().expect("registry user_mcp lock poisoned").clone();
        for (owner, provider_id) in &user_mcp.order {
            if owner != user_id {
                continue;
            }
            if let Some(connector) = user_mcp.by_key.get(&(owner.clone(), provider_id.clone())) {
                out.push((provider_id.clone(), connector.clone()));
            }
        }
        out
    }
}
