use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use crate::component::{Component, Handler};
use crate::error::{Result, RpcError};

/// The built-in introspection method every peer answers.
pub const SYSTEM_LIST_COMPONENTS: &str = "system.listComponents";

/// Maps dotted `Component.method` names to local handlers.
///
/// Cloning is cheap; all clones share the same underlying table, so a
/// registry handed to a listener is live on every accepted peer.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    components: Arc<RwLock<HashMap<String, BTreeMap<String, Handler>>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component's methods under its namespace.
    ///
    /// Conflict policy: registering a component under an existing name
    /// replaces that namespace's handlers entirely (last registration
    /// wins). Methods become callable by the remote peer immediately.
    pub fn add_component(&self, component: Component) {
        let (name, methods) = component.into_parts();
        let mut components = self.components.write().expect("method registry poisoned");
        if components.insert(name.clone(), methods).is_some() {
            warn!(component = %name, "replaced existing component registration");
        } else {
            debug!(component = %name, "component registered");
        }
    }

    /// Remove a component namespace. Returns whether it existed.
    pub fn remove_component(&self, name: &str) -> bool {
        let mut components = self.components.write().expect("method registry poisoned");
        components.remove(name).is_some()
    }

    /// Component names mapped to their method names, sorted for stable
    /// output. The built-in `system` namespace is not included.
    pub fn list_components(&self) -> BTreeMap<String, Vec<String>> {
        let components = self.components.read().expect("method registry poisoned");
        components
            .iter()
            .map(|(name, methods)| (name.clone(), methods.keys().cloned().collect()))
            .collect()
    }

    /// Look up and invoke the handler for a dotted method name.
    ///
    /// The name splits on the first dot; an unknown component or method
    /// yields `MethodNotFound`. A handler's own failure is reported as a
    /// handler error carrying the original message.
    pub async fn dispatch(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        if method == SYSTEM_LIST_COMPONENTS {
            let listing = self.list_components();
            return serde_json::to_value(listing)
                .map_err(|err| RpcError::handler(err.to_string()));
        }

        let Some((component, name)) = method.split_once('.') else {
            return Err(RpcError::MethodNotFound(method.to_string()));
        };

        let handler = {
            let components = self.components.read().expect("method registry poisoned");
            components
                .get(component)
                .and_then(|methods| methods.get(name))
                .cloned()
        };

        let Some(handler) = handler else {
            return Err(RpcError::MethodNotFound(method.to_string()));
        };

        handler(args).await.map_err(|err| match err {
            // Preserve error kinds that already say what went wrong.
            RpcError::Handler { .. } | RpcError::MethodNotFound(_) => err,
            other => RpcError::handler(other.to_string()),
        })
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("components", &self.list_components())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::component::arg_f64;

    fn calculator() -> Component {
        Component::new("Calculator")
            .sync_method("add", |args| {
                Ok(json!(arg_f64(&args, 0)? + arg_f64(&args, 1)?))
            })
            .sync_method("subtract", |args| {
                Ok(json!(arg_f64(&args, 0)? - arg_f64(&args, 1)?))
            })
            .sync_method("multiply", |args| {
                Ok(json!(arg_f64(&args, 0)? * arg_f64(&args, 1)?))
            })
    }

    #[tokio::test]
    async fn dispatch_invokes_handler_positionally() {
        let registry = MethodRegistry::new();
        registry.add_component(calculator());

        let result = registry
            .dispatch("Calculator.add", vec![json!(5), json!(3)])
            .await
            .unwrap();
        assert_eq!(result, json!(8.0));
    }

    #[tokio::test]
    async fn unknown_method_yields_method_not_found() {
        let registry = MethodRegistry::new();
        registry.add_component(calculator());

        let err = registry
            .dispatch("Calculator.divide", vec![json!(1), json!(0)])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));

        let err = registry.dispatch("Missing.add", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));

        // A name without a dot can never resolve.
        let err = registry.dispatch("undotted", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));
    }

    #[tokio::test]
    async fn handler_failure_is_wrapped_with_its_message() {
        let registry = MethodRegistry::new();
        registry.add_component(Component::new("Flaky").sync_method("boom", |_args| {
            Err(RpcError::handler("it broke"))
        }));

        let err = registry.dispatch("Flaky.boom", vec![]).await.unwrap_err();
        match err {
            RpcError::Handler { message, .. } => assert_eq!(message, "it broke"),
            other => panic!("expected handler error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_components_reports_sorted_method_names() {
        let registry = MethodRegistry::new();
        registry.add_component(calculator());

        let listing = registry.list_components();
        assert_eq!(
            listing.get("Calculator").unwrap(),
            &vec![
                "add".to_string(),
                "multiply".to_string(),
                "subtract".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn system_list_components_is_built_in_but_not_listed() {
        let registry = MethodRegistry::new();
        registry.add_component(calculator());

        let value = registry
            .dispatch(SYSTEM_LIST_COMPONENTS, vec![])
            .await
            .unwrap();
        let listing: BTreeMap<String, Vec<String>> = serde_json::from_value(value).unwrap();
        assert!(listing.contains_key("Calculator"));
        assert!(!listing.contains_key("system"));
    }

    #[tokio::test]
    async fn duplicate_registration_last_wins() {
        let registry = MethodRegistry::new();
        registry.add_component(calculator());
        registry.add_component(
            Component::new("Calculator").sync_method("negate", |args| {
                Ok(json!(-arg_f64(&args, 0)?))
            }),
        );

        let listing = registry.list_components();
        assert_eq!(
            listing.get("Calculator").unwrap(),
            &vec!["negate".to_string()]
        );

        let err = registry
            .dispatch("Calculator.add", vec![json!(1), json!(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::MethodNotFound(_)));
    }

    #[tokio::test]
    async fn async_handlers_are_supported() {
        let registry = MethodRegistry::new();
        registry.add_component(Component::new("Echo").method("delayed", |args| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }));

        let result = registry
            .dispatch("Echo.delayed", vec![json!("hi")])
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
    }
}
