use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, RpcError};

/// Future returned by a method handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// An invocable method handler. Args are applied positionally as opaque
/// JSON values.
pub(crate) type Handler = Arc<dyn Fn(Vec<Value>) -> HandlerFuture + Send + Sync>;

/// A named group of methods exposed for invocation by the remote peer.
///
/// Built with the fluent `method`/`sync_method` calls, then handed to
/// [`crate::MethodRegistry::add_component`]:
///
/// ```
/// use serde_json::json;
/// use wsrpc_peer::{arg_f64, Component};
///
/// let calculator = Component::new("Calculator")
///     .sync_method("add", |args| {
///         Ok(json!(arg_f64(&args, 0)? + arg_f64(&args, 1)?))
///     });
/// assert_eq!(calculator.name(), "Calculator");
/// ```
pub struct Component {
    name: String,
    methods: BTreeMap<String, Handler>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Register an async handler under `name`.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    /// Register a synchronous handler under `name`.
    pub fn sync_method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Arc::new(move |args| {
                let outcome = handler(args);
                Box::pin(std::future::ready(outcome))
            }),
        );
        self
    }

    /// The component's namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method names this component exposes.
    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub(crate) fn into_parts(self) -> (String, BTreeMap<String, Handler>) {
        (self.name, self.methods)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Extract a positional numeric argument, failing with a handler error the
/// caller can read back.
pub fn arg_f64(args: &[Value], index: usize) -> Result<f64> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| RpcError::handler(format!("argument {index} must be a number")))
}

/// Extract a positional string argument.
pub fn arg_str<'a>(args: &'a [Value], index: usize) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::handler(format!("argument {index} must be a string")))
}
