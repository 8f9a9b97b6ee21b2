//! Handlers for the function tools a run can call.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    assistants::runs::{ToolCall, ToolOutput},
    error::Result,
    AssistantError,
};

/// Executes one function tool.
///
/// `arguments` is the decoded argument object of the call; the returned
/// value is JSON-encoded and submitted as the call's output. Return an
/// [`InvalidArguments`] error to report arguments the handler cannot use.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> anyhow::Result<Value>;
}

/// The arguments of a call do not fit the handler's parameters.
#[derive(Debug, thiserror::Error)]
#[error("arguments do not match the handler's parameters: {0}")]
pub struct InvalidArguments(#[from] pub serde_json::Error);

struct FnHandler<F, A, R> {
    f: F,
    _marker: PhantomData<fn(A) -> R>,
}

#[async_trait]
impl<F, A, R> ToolHandler for FnHandler<F, A, R>
where
    F: Fn(A) -> anyhow::Result<R> + Send + Sync,
    A: DeserializeOwned,
    R: Serialize,
{
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        let arguments: A = serde_json::from_value(arguments).map_err(InvalidArguments)?;
        let output = (self.f)(arguments)?;

        Ok(serde_json::to_value(output)?)
    }
}

/// Maps function names to the handlers that execute them.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: ToolHandler + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Registers a synchronous function with typed arguments and output.
    ///
    /// The call's argument object is deserialized into `A`; use
    /// [`serde_json::Value`] to take it as-is.
    pub fn register_fn<F, A, R>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
    {
        self.register(
            name,
            FnHandler {
                f,
                _marker: PhantomData,
            },
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every call in order and returns their outputs in the same order.
    ///
    /// All names are resolved before any handler runs, so an unknown name
    /// fails the batch without side effects. The first argument or handler
    /// failure aborts the rest of the batch.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
        let handlers = calls
            .iter()
            .map(|call| {
                self.get(&call.function.name)
                    .ok_or_else(|| AssistantError::ToolNotCallable(call.function.name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut outputs = Vec::with_capacity(calls.len());

        for (call, handler) in calls.iter().zip(handlers) {
            let name = &call.function.name;
            let arguments = decode_arguments(&call.function.arguments).map_err(|source| {
                AssistantError::ToolArguments {
                    name: name.clone(),
                    source,
                }
            })?;

            log::info!("Calling tool {name} for {}", call.id);

            let output = handler
                .call(arguments)
                .await
                .map_err(|error| match error.downcast::<InvalidArguments>() {
                    Ok(InvalidArguments(source)) => AssistantError::ToolArguments {
                        name: name.clone(),
                        source,
                    },
                    Err(source) => AssistantError::ToolExecution {
                        name: name.clone(),
                        source,
                    },
                })?;

            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output: output.to_string(),
            });
        }

        Ok(outputs)
    }
}

/// Decodes the JSON argument text of a tool call.
///
/// Blank text stands for a call without arguments and decodes to `{}`.
pub fn decode_arguments(arguments: &str) -> Result<Value, serde_json::Error> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_str(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistants::runs::ToolCallFunction;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    #[derive(Deserialize)]
    struct Sum {
        a: i64,
        b: i64,
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ToolHandler for Counting {
        async fn call(&self, _arguments: Value) -> anyhow::Result<Value> {
            Ok(json!(self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    #[tokio::test]
    async fn outputs_follow_call_order() {
        let mut tools = ToolRegistry::new();
        tools
            .register_fn("sum", |args: Sum| Ok(args.a + args.b))
            .register_fn("echo", |args: Value| Ok(args));

        let outputs = tools
            .dispatch(&[
                call("call_1", "echo", r#"{"text":"hi","n":[1,2]}"#),
                call("call_2", "sum", r#"{"a":2,"b":40}"#),
                call("call_3", "echo", ""),
            ])
            .await
            .unwrap();

        assert_eq!(
            outputs,
            vec![
                ToolOutput {
                    tool_call_id: "call_1".to_string(),
                    output: r#"{"n":[1,2],"text":"hi"}"#.to_string(),
                },
                ToolOutput {
                    tool_call_id: "call_2".to_string(),
                    output: "42".to_string(),
                },
                ToolOutput {
                    tool_call_id: "call_3".to_string(),
                    output: "{}".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_runs_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut tools = ToolRegistry::new();
        tools.register("count", Counting(counter.clone()));

        let result = tools
            .dispatch(&[call("call_1", "count", "{}"), call("call_2", "missing", "{}")])
            .await;

        assert!(matches!(result, Err(AssistantError::ToolNotCallable(name)) if name == "missing"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_argument_json_is_reported() {
        let mut tools = ToolRegistry::new();
        tools.register_fn("echo", |args: Value| Ok(args));

        let result = tools.dispatch(&[call("call_1", "echo", "{not json")]).await;

        assert!(matches!(result, Err(AssistantError::ToolArguments { name, .. }) if name == "echo"));
    }

    #[tokio::test]
    async fn mismatched_argument_shape_is_argument_error() {
        let mut tools = ToolRegistry::new();
        tools.register_fn("sum", |args: Sum| Ok(args.a + args.b));

        let result = tools.dispatch(&[call("call_1", "sum", r#"{"a":"x"}"#)]).await;

        assert!(matches!(result, Err(AssistantError::ToolArguments { name, .. }) if name == "sum"));
    }

    struct Strict;

    #[async_trait]
    impl ToolHandler for Strict {
        async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
            let city: String = serde_json::from_value(arguments["city"].clone())
                .map_err(InvalidArguments)?;
            Ok(json!(city))
        }
    }

    #[tokio::test]
    async fn custom_handler_can_reject_arguments() {
        let mut tools = ToolRegistry::new();
        tools.register("strict", Strict);

        let rejected = tools
            .dispatch(&[call("call_1", "strict", r#"{"city":3}"#)])
            .await;
        assert!(
            matches!(rejected, Err(AssistantError::ToolArguments { name, .. }) if name == "strict")
        );

        let accepted = tools
            .dispatch(&[call("call_2", "strict", r#"{"city":"Oslo"}"#)])
            .await
            .unwrap();
        assert_eq!(accepted[0].output, r#""Oslo""#);
    }

    #[tokio::test]
    async fn handler_failure_is_tool_execution_error() {
        let mut tools = ToolRegistry::new();
        tools.register_fn("fail", |_: Value| -> anyhow::Result<Value> {
            anyhow::bail!("service unavailable")
        });

        let failed = tools.dispatch(&[call("call_2", "fail", "{}")]).await;
        match failed {
            Err(AssistantError::ToolExecution { name, source }) => {
                assert_eq!(name, "fail");
                assert_eq!(source.to_string(), "service unavailable");
            }
            other => panic!("expected tool execution error, got {other:?}"),
        }
    }

    #[test]
    fn encoded_arguments_decode_to_the_same_value() {
        let arguments = json!({
            "city": "Zürich",
            "days": 3,
            "units": { "temperature": "celsius", "wind": null },
            "tags": ["a", "b"]
        });

        let decoded = decode_arguments(&arguments.to_string()).unwrap();

        assert_eq!(decoded, arguments);
        assert_eq!(decode_arguments("  ").unwrap(), json!({}));
    }

    #[test]
    fn debug_lists_registered_names() {
        let mut tools = ToolRegistry::new();
        tools.register_fn("b", |args: Value| Ok(args));
        tools.register_fn("a", |args: Value| Ok(args));

        assert_eq!(format!("{tools:?}"), r#"ToolRegistry { tools: ["a", "b"] }"#);
        assert_eq!(tools.len(), 2);
        assert!(tools.contains("a"));
    }
}
