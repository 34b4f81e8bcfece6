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

//! `CredentialStore`: a secure, externally-synchronized key/value
//! abstraction backed by [`crate::db::DBClient`] (SurrealDB/RocksDB).
//!
//! This crate does not add its own distributed locking on top of the
//! store — SurrealDB's per-record atomicity is treated as sufficient
//! serialization for a single key, matching the consumed-contract model
//! the design calls for.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::crypto::MasterCipher;
use crate::db::utils::sanitize_for_surrealdb;
use crate::db::DBClient;
use crate::error::ConnectorError;

/// Builds the store key for a user's token record.
pub fn token_key(user_id: &str, provider_id: &str) -> String {
    format!("user:{user_id}:connector:{provider_id}:token")
}

/// Builds the store key for a user's connector configuration record.
pub fn config_key(user_id: &str, provider_id: &str) -> String {
    format!("user:{user_id}:connector:{provider_id}:config")
}

/// Builds the store key for a user-registered custom MCP connector.
pub fn custom_mcp_key(user_id: &str, provider_id: &str) -> String {
    format!("user:{user_id}:custom_mcp:{provider_id}")
}

/// Builds the store key for a transient OAuth state record.
pub fn oauth_state_key(state: &str) -> String {
    format!("oauth:state:{state}")
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoredRecord {
    /// Base64 ciphertext of the record's JSON payload, or the plaintext
    /// JSON payload itself for transient (`setex`) records.
    value: Value,
    encrypted: bool,
    user_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/// A secure, multi-tenant key/value store for OAuth tokens, connector
/// configuration, and transient authorize-flow state.
pub struct CredentialStore {
    db: Arc<DBClient>,
    cipher: MasterCipher,
}

const TABLE: &str = "kv_store";

impl CredentialStore {
    /// Builds a store over an already-initialized database client.
    pub fn new(db: Arc<DBClient>, cipher: MasterCipher) -> Self {
        Self { db, cipher }
    }

    fn encrypt_value(&self, value: &Value) -> Result<Value, ConnectorError> {
        let plaintext = serde_json::to_string(value)
            .map_err(|e| ConnectorError::Store(format!("failed to serialize value: {e}")))?;
        let ciphertext = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| ConnectorError::Crypto(e.to_string()))?;
        Ok(Value::String(ciphertext))
    }

    fn decrypt_value(&self, key: &str, value: &Value) -> Result<Value, ConnectorError> {
        let ciphertext = value
            .as_str()
            .ok_or_else(|| ConnectorError::CredentialDecode { key: key.to_string() })?;
        let plaintext = self
            .cipher
            .decrypt(ciphertext)
            .map_err(|e| ConnectorError::Crypto(e.to_string()))?;
        serde_json::from_str(&plaintext)
            .map_err(|_| ConnectorError::CredentialDecode { key: key.to_string() })
    }

    async fn read_raw(&self, key: &str) -> Result<Option<StoredRecord>, ConnectorError> {
        let query = format!("SELECT * FROM {TABLE}:`{key}`");
        let rows = self
            .db
            .query_json(&query)
            .await
            .map_err(|e| ConnectorError::Store(e.to_string()))?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let record: StoredRecord = serde_json::from_value(row)
            .map_err(|_| ConnectorError::CredentialDecode { key: key.to_string() })?;

        if let Some(expires_at) = record.expires_at {
            if Utc::now() >= expires_at {
                self.delete(key).await?;
                return Ok(None);
            }
        }
        Ok(Some(record))
    }

    async fn write_raw(
        &self,
        key: &str,
        value: Value,
        encrypted: bool,
        user_id: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), ConnectorError> {
        let record = StoredRecord {
            value: sanitize_for_surrealdb(value),
            encrypted,
            user_id,
            expires_at,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record)
            .map_err(|e| ConnectorError::Store(format!("failed to serialize record: {e}")))?;
        let query = format!("UPSERT {TABLE}:`{key}` CONTENT $data");
        self.db
            .execute_with_params(&query, vec![("data".to_string(), json)])
            .await
            .map_err(|e| ConnectorError::Store(e.to_string()))
    }

    /// Reads a single, persistent value at `key`, scoped to `user_id`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &str, user_id: &str) -> Result<Option<Value>, ConnectorError> {
        let Some(record) = self.read_raw(key).await? else {
            return Ok(None);
        };
        if record.user_id.as_deref() != Some(user_id) {
            warn!(key, "credential store key owner mismatch");
            return Ok(None);
        }
        if record.encrypted {
            Ok(Some(self.decrypt_value(key, &record.value)?))
        } else {
            Ok(Some(record.value))
        }
    }

    /// Writes a single, persistent, encrypted value at `key`, scoped to
    /// `user_id`.
    #[instrument(skip(self, value), fields(key = %key))]
    pub async fn set(&self, key: &str, value: Value, user_id: &str) -> Result<(), ConnectorError> {
        let encrypted = self.encrypt_value(&value)?;
        self.write_raw(key, encrypted, true, Some(user_id.to_string()), None).await
    }

    /// Deletes the value at `key`, if any.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<(), ConnectorError> {
        let id = format!("{TABLE}:{key}");
        self.db.delete(&id).await.map_err(|e| ConnectorError::Store(e.to_string()))
    }

    /// Merges `fields` into the hash stored at `key`, scoped to
    /// `user_id`.
    #[instrument(skip(self, fields), fields(key = %key))]
    pub async fn hset(
        &self,
        key: &str,
        fields: HashMap<String, Value>,
        user_id: &str,
    ) -> Result<(), ConnectorError> {
        let mut current = self
            .get(key, user_id)
            .await?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        for (k, v) in fields {
            current.insert(k, v);
        }
        self.set(key, Value::Object(current), user_id).await
    }

    /// Reads the full hash stored at `key`, scoped to `user_id`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn hgetall(
        &self,
        key: &str,
        user_id: &str,
    ) -> Result<Option<serde_json::Map<String, Value>>, ConnectorError> {
        Ok(self.get(key, user_id).await?.and_then(|v| v.as_object().cloned()))
    }

    /// Writes a transient, unencrypted value at `key` that expires
    /// after `ttl_seconds`. Not scoped to a `user_id` — used for
    /// low-sensitivity, short-lived records like OAuth authorize state.
    #[instrument(skip(self, value), fields(key = %key, ttl_seconds))]
    pub async fn setex(&self, key: &str, ttl_seconds: u64, value: Value) -> Result<(), ConnectorError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
        self.write_raw(key, value, false, None, Some(expires_at)).await
    }

    /// Reads a transient value written by [`CredentialStore::setex`],
    /// without consuming it.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn getex(&self, key: &str) -> Result<Option<Value>, ConnectorError> {
        Ok(self.read_raw(key).await?.map(|r| r.value))
    }

    /// Reads and deletes a transient value in one logical step. A
    /// second call for the same key after this one returns `None`,
    /// enforcing the one-shot consumption invariant for OAuth state.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn consume(&self, key: &str) -> Result<Option<Value>, ConnectorError> {
        let value = self.getex(key).await?;
        if value.is_some() {
            self.delete(key).await?;
            debug!(key, "consumed transient credential store record");
        }
        Ok(value)
    }

    /// Lists every custom MCP connector a user has registered, decrypted
    /// and keyed by provider id. Used to lazily repopulate the registry's
    /// per-user MCP map after a process restart.
    #[instrument(skip(self))]
    pub async fn list_custom_mcp_connectors(&self, user_id: &str) -> Result<Vec<(String, Value)>, ConnectorError> {
        let prefix = format!("user:{user_id}:custom_mcp:");
        let query = format!("SELECT * FROM {TABLE} WHERE user_id = $user_id");
        let rows = self
            .db
            .query_json_with_params(&query, vec![("user_id".to_string(), Value::String(user_id.to_string()))])
            .await
            .map_err(|e| ConnectorError::Store(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let Some(id) = row.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            // SurrealDB renders the record id as `kv_store:⟨key⟩`; strip
            // the table prefix and any backtick quoting before matching.
            let Some((_, key)) = id.split_once(':') else {
                continue;
            };
            let key = key.trim_matches('`');
            if !key.starts_with(&prefix) {
                continue;
            }
            let provider_id = key.trim_start_matches(&prefix).to_string();

            let record: StoredRecord = match serde_json::from_value(row) {
                Ok(record) => record,
                Err(_) => continue,
            };
            let value = if record.encrypted {
                match self.decrypt_value(key, &record.value) {
                    Ok(value) => value,
                    Err(_) => continue,
                }
            } else {
                record.value
            };
            out.push((provider_id, value));
        }
        Ok(out)
    }
}
