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

use anyhow::Result;
use surrealdb::{
    engine::local::{Db, RocksDb},
    Surreal,
};
use tracing::{debug, error, info, instrument};

/// Database client for SurrealDB embedded operations
pub struct DBClient {
    pub db: Surreal<Db>,
}

impl DBClient {
    /// Creates a new database client and connects to the specified path
    #[instrument(name = "db_client_new", skip_all, fields(db_path = %path))]
    pub async fn new(path: &str) -> Result<Self> {
        info!("Initializing SurrealDB connection");

        let db = Surreal::new::<RocksDb>(path).await.map_err(|e| {
            error!(error = %e, "Failed to connect to SurrealDB");
            e
        })?;

        db.use_ns("connector_runtime").use_db("runtime").await.map_err(|e| {
            error!(error = %e, "Failed to select namespace/database");
            e
        })?;

        info!("SurrealDB connection established");
        Ok(Self { db })
    }

    /// Initializes the database schema
    #[instrument(name = "db_initialize_schema", skip(self))]
    pub async fn initialize_schema(&self) -> Result<()> {
        use super::schema::SCHEMA_SQL;

        info!("Initializing database schema");

        self.db.query(SCHEMA_SQL).await.map_err(|e| {
            error!(error = %e, "Failed to initialize schema");
            e
        })?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    /// Executes a query and returns the results as JSON Value first,
    /// then deserializes using serde_json for proper custom deserializer support.
    #[instrument(name = "db_query", skip(self), fields(query_len = query.len()))]
    pub async fn query<T>(&self, query: &str) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing query");

        let mut result = self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        let data: Vec<T> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to deserialize query results");
            e
        })?;

        debug!(result_count = data.len(), "Query completed");
        Ok(data)
    }

    /// Executes a raw query and returns results as JSON Values.
    /// Use this when the standard query method fails due to SurrealDB SDK serialization issues.
    #[instrument(name = "db_query_json", skip(self), fields(query_len = query.len()))]
    pub async fn query_json(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing JSON query");

        let mut result = self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        let data: Vec<serde_json::Value> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to extract query results");
            e
        })?;

        debug!(result_count = data.len(), "Query completed");
        Ok(data)
    }

    /// Executes a query without deserializing the result.
    ///
    /// Use this for UPSERT, CREATE, UPDATE, DELETE operations where you don't need
    /// the returned data and want to avoid SurrealDB SDK serialization issues.
    #[instrument(name = "db_execute", skip(self), fields(query_len = query.len()))]
    pub async fn execute(&self, query: &str) -> Result<()> {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing query (no result)");

        self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        debug!("Query executed successfully");
        Ok(())
    }

    /// Deletes a record by ID
    ///
    /// Accepts ID in format `table:uuid` (e.g., "kv_store:123e4567-...")
    /// Uses raw DELETE query to avoid SurrealDB SDK 2.x serialization issues.
    #[instrument(name = "db_delete", skip(self), fields(record_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        debug!("Deleting record");

        // Parse table:uuid format
        let (table, uuid) = id.split_once(':').ok_or_else(|| {
            let msg = format!("Invalid record ID format '{}', expected 'table:uuid'", id);
            error!("{}", msg);
            anyhow::anyhow!(msg)
        })?;

        // Use raw DELETE query with backtick-escaped ID to avoid SDK issues
        let query = format!("DELETE {}:`{}`", table, uuid);
        self.db.query(&query).await.map_err(|e| {
            error!(error = %e, "Failed to delete record");
            e
        })?;

        debug!("Record deleted");
        Ok(())
    }

    /// Executes a parameterized query and returns results.
    ///
    /// Uses SurrealDB's `.bind()` method to safely bind parameters to the query.
    /// Parameters are passed as a vector of (name, value) tuples.
    ///
    /// # Arguments
    /// * `query` - The SurrealQL query with $param placeholders
    /// * `params` - Vector of (param_name, param_value) tuples
    ///
    /// # Example
    /// ```ignore
    /// let result = db.query_with_params(
    ///     "CREATE user CONTENT $data",
    ///     vec![("data".to_string(), json!({"name": "test"}))]
    /// ).await?;
    /// ```
    #[allow(dead_code)] // May be used by future tools
    #[instrument(name = "db_query_with_params", skip(self, params), fields(query_len = query.len()))]
    pub async fn query_with_params<T>(
        &self,
        query: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing parameterized query");

        let mut query_builder = self.db.query(query);

        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        let mut result = query_builder.await.map_err(|e| {
            error!(error = %e, "Parameterized query execution failed");
            e
        })?;

        let data: Vec<T> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to deserialize parameterized query results");
            e
        })?;

        debug!(result_count = data.len(), "Parameterized query completed");
        Ok(data)
    }

    /// Executes a parameterized query as JSON and returns results.
    ///
    /// Uses SurrealDB's `.bind()` method to safely bind parameters to the query.
    /// Returns results as JSON Value to avoid SDK serialization issues.
    ///
    /// # Arguments
    /// * `query` - The SurrealQL query with $param placeholders
    /// * `params` - Vector of (param_name, param_value) tuples
    ///
    /// # Example
    /// ```ignore
    /// let results = db.query_json_with_params(
    ///     "SELECT value FROM kv_store:`$id`",
    ///     vec![("id".to_string(), json!("uuid-here"))]
    /// ).await?;
    /// ```
    #[instrument(name = "db_query_json_with_params", skip(self, params), fields(query_len = query.len()))]
    pub async fn query_json_with_params(
        &self,
        query: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<Vec<serde_json::Value>> {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing parameterized JSON query");

        let mut query_builder = self.db.query(query);

        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        let mut result = query_builder.await.map_err(|e| {
            error!(error = %e, "Parameterized query execution failed");
            e
        })?;

        let data: Vec<serde_json::Value> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to extract parameterized query results");
            e
        })?;

        debug!(
            result_count = data.len(),
            "Parameterized JSON query completed"
        );
        Ok(data)
    }

    /// Executes a parameterized mutation (INSERT/UPDATE/DELETE) without returning results.
    ///
    /// Uses SurrealDB's `.bind()` method to safely bind parameters to the query.
    /// Use this for write operations where you don't need the returned data.
    ///
    /// # Arguments
    /// * `query` - The SurrealQL mutation with $param placeholders
    /// * `params` - Vector of (param_name, param_value) tuples
    ///
    /// # Example
    /// ```ignore
    /// db.execute_with_params(
    ///     "DELETE FROM memory WHERE type = $type",
    ///     vec![("type".to_string(), json!("knowledge"))]
    /// ).await?;
    /// ```
    #[instrument(name = "db_execute_with_params", skip(self, params), fields(query_len = query.len()))]
    pub async fn execute_with_params(
        &self,
        query: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing parameterized mutation");

        let mut query_builder = self.db.query(query);

        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        query_builder.await.map_err(|e| {
            error!(error = %e, "Parameterized mutation execution failed");
            e
        })?;

        debug!("Parameterized mutation executed successfully");
        Ok(())
    }
}
