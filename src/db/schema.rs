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

/// Schema for the connector runtime's persistent store. A single
/// generic `kv_store` table backs every key convention in use
/// (`user:{user_id}:connector:{provider_id}:token`,
/// `...:config`, `user:{user_id}:custom_mcp:{provider_id}`, and
/// `oauth:state:{state}`) — see [`crate::store::credential_store`] for
/// the key builders and the encrypted-vs-plaintext split.
pub const SCHEMA_SQL: &str = r#"
DEFINE NAMESPACE OVERWRITE connector_runtime;
USE NS connector_runtime;
DEFINE DATABASE OVERWRITE runtime;
USE DB runtime;

-- Table: kv_store
-- Backs every credential store key. `value` is either the base64
-- AES-256-GCM ciphertext of the logical JSON payload (when `encrypted`
-- is true) or the plaintext JSON payload itself (transient OAuth
-- state only).
DEFINE TABLE OVERWRITE kv_store SCHEMAFULL;
DEFINE FIELD OVERWRITE value ON kv_store TYPE string | object;
DEFINE FIELD OVERWRITE encrypted ON kv_store TYPE bool DEFAULT false;
DEFINE FIELD OVERWRITE user_id ON kv_store TYPE option<string>;
DEFINE FIELD OVERWRITE expires_at ON kv_store TYPE option<datetime>;
DEFINE FIELD OVERWRITE created_at ON kv_store TYPE datetime DEFAULT time::now();
DEFINE INDEX OVERWRITE kv_store_user_id ON kv_store FIELDS user_id;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defines_the_kv_store_table() {
        assert!(SCHEMA_SQL.contains("DEFINE TABLE OVERWRITE kv_store"));
    }

    #[test]
    fn schema_uses_the_runtime_namespace_and_database() {
        assert!(SCHEMA_SQL.contains("DEFINE NAMESPACE OVERWRITE connector_runtime"));
        assert!(SCHEMA_SQL.contains("DEFINE DATABASE OVERWRITE runtime"));
    }
}
