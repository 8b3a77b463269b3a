//! Local capability providers.
//!
//! The router reaches local tools only through [`LocalCapabilityProvider`].
//! [`LocalToolRegistry`] is the in-process implementation: tools are grouped
//! by scope, a scope can be switched off as a whole, and listings come back
//! sorted by qualified name.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::error::ToolExecutionError;
use super::name::{Namespace, ToolName};
use super::types::ToolDescriptor;

/// Source of locally executed tools.
#[async_trait]
pub trait LocalCapabilityProvider: Send + Sync {
    /// Every tool currently available, with qualified `local__` names.
    async fn list_active_tools(&self) -> Vec<ToolDescriptor>;

    /// Run `name` inside `scope`.
    async fn invoke(&self, scope: &str, name: &str, args: Value) -> Result<Value, ToolExecutionError>;
}

/// A single local tool.
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Unqualified tool name, unique within its scope.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn schema(&self) -> Value;

    /// Execute with the given JSON arguments.
    ///
    /// # Errors
    ///
    /// [`ToolExecutionError`] for validation or execution failures.
    async fn execute(&self, args: Value) -> Result<Value, ToolExecutionError>;
}

struct Scope {
    enabled: bool,
    tools: BTreeMap<String, Arc<dyn LocalTool>>,
}

/// Registry of local tools grouped by scope.
#[derive(Default)]
pub struct LocalToolRegistry {
    scopes: RwLock<BTreeMap<String, Scope>>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `scope`, creating the scope (enabled) if needed.
    /// Replaces any existing tool with the same name.
    pub fn register(&self, scope: &str, tool: Arc<dyn LocalTool>) {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        scopes
            .entry(scope.to_owned())
            .or_insert_with(|| Scope {
                enabled: true,
                tools: BTreeMap::new(),
            })
            .tools
            .insert(tool.name().to_owned(), tool);
    }

    /// Enable or disable a whole scope. Returns `false` if the scope is unknown.
    pub fn set_scope_enabled(&self, scope: &str, enabled: bool) -> bool {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        match scopes.get_mut(scope) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Drop a scope and all its tools. Returns `false` if it was not registered.
    pub fn remove_scope(&self, scope: &str) -> bool {
        let mut scopes = self.scopes.write().unwrap_or_else(|e| e.into_inner());
        scopes.remove(scope).is_some()
    }

    /// Names of all registered scopes, enabled or not.
    pub fn scopes(&self) -> Vec<String> {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        scopes.keys().cloned().collect()
    }

    pub fn is_scope_enabled(&self, scope: &str) -> bool {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        scopes.get(scope).is_some_and(|s| s.enabled)
    }

    fn lookup(&self, scope: &str, name: &str) -> Result<Arc<dyn LocalTool>, ToolExecutionError> {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        let entry = scopes
            .get(scope)
            .ok_or_else(|| ToolExecutionError::UnknownScope(scope.to_owned()))?;
        if !entry.enabled {
            return Err(ToolExecutionError::NotFound(format!(
                "{name} (scope '{scope}' is disabled)"
            )));
        }
        entry
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolExecutionError::NotFound(name.to_owned()))
    }
}

#[async_trait]
impl LocalCapabilityProvider for LocalToolRegistry {
    async fn list_active_tools(&self) -> Vec<ToolDescriptor> {
        let scopes = self.scopes.read().unwrap_or_else(|e| e.into_inner());
        scopes
            .iter()
            .filter(|(_, s)| s.enabled)
            .flat_map(|(scope, s)| {
                s.tools.values().map(move |tool| {
                    ToolDescriptor::new(
                        ToolName::qualified(Namespace::Local, scope, tool.name()),
                        tool.description(),
                    )
                    .with_schema(tool.schema())
                })
            })
            .collect()
    }

    async fn invoke(&self, scope: &str, name: &str, args: Value) -> Result<Value, ToolExecutionError> {
        // Lock is released before the tool runs.
        let tool = self.lookup(scope, name)?;
        tool.execute(args).await
    }
}
