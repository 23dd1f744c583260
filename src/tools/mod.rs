//! Local tools the model can call, and the registry that dispatches them.
//!
//! Every tool declares a [`ToolSpec`] and returns a JSON object with a
//! `success` flag. [`ToolRegistry::dispatch`] never fails: unknown names,
//! argument mismatches and tool errors all come back as
//! `{"success": false, "error": ...}` for the model to react to.

pub mod change_directory;
pub mod context;
pub mod create_directory;
pub mod delegate;
pub mod delete_file;
pub mod edit_file;
pub mod list_directory;
pub mod move_file;
pub mod read_file;
pub mod run_command;
pub mod search_files;
pub mod spec;
pub mod write_file;

use anyhow::Result;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use change_directory::ChangeDirectoryTool;
use create_directory::CreateDirectoryTool;
use delegate::DelegateTool;
use delete_file::DeleteFileTool;
use edit_file::EditFileTool;
use list_directory::ListDirectoryTool;
use move_file::MoveFileTool;
use read_file::ReadFileTool;
use run_command::RunCommandTool;
use search_files::SearchFilesTool;
use spec::ToolSpec;
use write_file::WriteFileTool;

pub use context::{RuntimeStats, ShellRecord, ToolContext, ToolSettings};

/// The structured result of executing a tool: a JSON object whose
/// `success` field is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult(Map<String, Value>);

impl ToolResult {
    /// `{"success": true}` merged with the fields of `data`.
    pub fn success(data: Value) -> Self {
        Self::with_flag(true, data)
    }

    /// `{"success": false}` merged with the fields of `data`.
    pub fn failure(data: Value) -> Self {
        Self::with_flag(false, data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failure(json!({ "error": message.into() }))
    }

    fn with_flag(success: bool, data: Value) -> Self {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(success));
        if let Value::Object(fields) = data {
            for (key, value) in fields {
                if key != "success" {
                    map.insert(key, value);
                }
            }
        }
        Self(map)
    }

    pub fn is_success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Every tool implements this trait.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameters sent to the model.
    fn spec(&self) -> ToolSpec;

    /// Execute the tool with validated JSON arguments.
    ///
    /// An `Err` is turned into a structured failure by the registry.
    async fn execute(&self, input: Value, ctx: &mut ToolContext) -> Result<ToolResult>;
}

/// Holds all registered tools and dispatches calls by name.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Called during startup.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(Arc::from(tool));
    }

    /// Specs for every registered tool, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Look up a tool by name, validate its arguments and execute it.
    ///
    /// Always returns a JSON object with a `success` field.
    pub async fn dispatch(&self, name: &str, args: Value, ctx: &mut ToolContext) -> Value {
        ctx.stats.record_tool(name);

        let Some(tool) = self.tools.iter().find(|t| t.spec().name == name) else {
            tracing::debug!(tool = name, "unknown tool requested");
            return ToolResult::error(format!("Unknown tool: {name}")).into_value();
        };

        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return ToolResult::error(format!("Bad args: expected an object, got {other}")).into_value();
            }
        };
        let args = match tool.spec().validate(&args) {
            Ok(args) => args,
            Err(message) => return ToolResult::error(format!("Bad args: {message}")).into_value(),
        };

        let result = match tool.execute(Value::Object(args), ctx).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(format!("{e:#}")),
        };
        tracing::debug!(tool = name, success = result.is_success(), "tool dispatched");
        result.into_value()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Every built-in tool except `delegate_task`. Sub-agents use this set.
    pub fn without_delegate() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RunCommandTool));
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(EditFileTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(ChangeDirectoryTool));
        registry.register(Box::new(SearchFilesTool));
        registry.register(Box::new(DeleteFileTool));
        registry.register(Box::new(CreateDirectoryTool));
        registry.register(Box::new(MoveFileTool));
        registry
    }

    /// Create a registry with all built-in tools.
    pub fn with_builtins(delegate: DelegateTool) -> Self {
        let mut registry = Self::without_delegate();
        registry.register(Box::new(delegate));
        registry
    }

    /// The full canonical tool list, without constructing a delegate.
    pub fn builtin_specs() -> Vec<ToolSpec> {
        let mut specs = Self::without_delegate().specs();
        specs.push(delegate::spec());
        specs
    }
}
