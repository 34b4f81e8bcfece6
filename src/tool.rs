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

//! The Tool Wrapper: a uniform executable-tool object exposed to the
//! agent runtime, whatever connector built it. An `ExecutableTool` binds
//! one connector tool to one user's credentials at build time — it
//! carries no back-reference to the connector or the store, only what it
//! needs to run a single invocation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ConnectorError;

/// A boxed, `Send` future, used so `ExecutableTool` can hold a
/// type-erased async invocation without pulling in an executor-specific
/// trait (e.g. `async_trait`) for a plain data type.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One invocable capability, bound to a specific user's credentials,
/// as handed to the agent runtime by `Manager::tools_for`.
///
/// Cloning an `ExecutableTool` is cheap: the invocation closure is
/// behind an `Arc`, so every clone shares the same captured token and
/// connector-specific call logic.
#[derive(Clone)]
pub struct ExecutableTool {
    /// Stable tool id, unique within its connector.
    pub id: String,
    /// Name the agent sees. Prefixed with the connector's provider id
    /// so two connectors cannot collide on a short tool name.
    pub name: String,
    /// Natural-language description shown to the agent.
    pub description: String,
    /// JSON Schema describing this tool's expected arguments.
    pub parameters_schema: Value,
    invoke: Arc<dyn Fn(Value) -> BoxFuture<Result<String, ConnectorError>> + Send + Sync>,
}

impl ExecutableTool {
    /// Builds a new executable tool from an invocation closure. The
    /// closure captures whatever it needs (access token, base URL, HTTP
    /// client) by value/by `Arc` at the call site — `ExecutableTool`
    /// itself is deliberately inert beyond its metadata.
    pub fn new<F, Fut>(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>, parameters_schema: Value, invoke: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ConnectorError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            parameters_schema,
            invoke: Arc::new(move |args| Box::pin(invoke(args))),
        }
    }

    /// Invokes this tool with the given JSON argument map. Per §7,
    /// upstream failures during tool execution are expected to surface
    /// as in-band `{success:false, error:...}` string payloads rather
    /// than as an `Err` here — an `Err` is reserved for the rare case an
    /// adapter cannot even attempt the call (e.g. malformed arguments it
    /// refuses to send upstream).
    pub async fn invoke(&self, args: Value) -> Result<String, ConnectorError> {
        (self.invoke)(args).await
    }
}

impl std::fmt::Debug for ExecutableTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableTool")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_runs_the_captured_closure() {
        let tool = ExecutableTool::new("echo", "echo", "echoes its input", serde_json::json!({}), |args| async move {
            Ok(args.to_string())
        });
        let result = tool.invoke(serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(result, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn clone_shares_the_same_invocation_logic() {
        let tool = ExecutableTool::new("echo", "echo", "d", serde_json::json!({}), |_args| async move { Ok("same".to_string()) });
        let cloned = tool.clone();
        assert_eq!(cloned.invoke(Value::Null).await.unwrap(), "same");
    }

    #[tokio::test]
    async fn invoke_can_surface_an_error() {
        let tool = ExecutableTool::new("fails", "fails", "d", serde_json::json!({}), |_args| async move {
            Err(ConnectorError::InvalidInput("bad".into()))
        });
        assert!(tool.invoke(Value::Null).await.is_err());
    }
}
