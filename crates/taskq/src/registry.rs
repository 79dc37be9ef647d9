use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use serde::de::DeserializeOwned;

use crate::BoxFuture;
use crate::error::EngineError;

/// Type-erased handler: borrows the dispatcher's unit of work for the
/// duration of the call and receives the task payload by value.
pub type HandlerFn<Tx> = dyn for<'t> Fn(&'t mut Tx, serde_json::Value) -> BoxFuture<'t, anyhow::Result<()>>
    + Send
    + Sync;

/// Maps task-type names to handlers. Each name may be registered once.
pub struct HandlerRegistry<Tx> {
    handlers: HashMap<String, Arc<HandlerFn<Tx>>>,
}

impl<Tx> Default for HandlerRegistry<Tx> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<Tx: Send + 'static> HandlerRegistry<Tx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, task_type: &str, handler: F) -> Result<(), EngineError>
    where
        F: for<'t> Fn(&'t mut Tx, serde_json::Value) -> BoxFuture<'t, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        if self.handlers.contains_key(task_type) {
            return Err(EngineError::DuplicateHandler(task_type.to_string()));
        }
        self.handlers
            .insert(task_type.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Registers a handler whose payload is deserialized into `P` first. A
    /// payload that does not fit `P` fails the invocation, which quarantines
    /// the task.
    pub fn register_typed<P, F>(&mut self, task_type: &str, handler: F) -> Result<(), EngineError>
    where
        P: DeserializeOwned + Send + 'static,
        F: for<'t> Fn(&'t mut Tx, P) -> BoxFuture<'t, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        let name = task_type.to_string();
        self.register(task_type, move |tx, payload| {
            match serde_json::from_value::<P>(payload) {
                Ok(input) => handler(tx, input),
                Err(e) => {
                    let err = anyhow!("Failed to deserialize '{}' payload: {}", name, e);
                    Box::pin(async move { Err::<(), _>(err) })
                }
            }
        })
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<HandlerFn<Tx>>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    struct FakeTx {
        seen: Vec<i64>,
    }

    #[derive(Deserialize)]
    struct Echo {
        v: i64,
    }

    fn noop(_tx: &mut FakeTx, _payload: serde_json::Value) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { anyhow::Ok(()) })
    }

    #[test]
    fn register_and_get() {
        let mut registry = HandlerRegistry::<FakeTx>::new();
        registry.register("echo", noop).unwrap();

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.task_types(), vec!["echo"]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::<FakeTx>::new();
        registry.register("echo", noop).unwrap();
        let result = registry.register("echo", noop);
        assert!(matches!(result, Err(EngineError::DuplicateHandler(t)) if t == "echo"));
    }

    #[test]
    fn task_types_are_sorted() {
        let mut registry = HandlerRegistry::<FakeTx>::new();
        registry.register("b", noop).unwrap();
        registry.register("a", noop).unwrap();
        assert_eq!(registry.task_types(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn typed_handler_receives_decoded_payload() {
        let mut registry = HandlerRegistry::<FakeTx>::new();
        registry
            .register_typed::<Echo, _>("echo", |tx, input| {
                Box::pin(async move {
                    tx.seen.push(input.v);
                    anyhow::Ok(())
                })
            })
            .unwrap();

        let handler = registry.get("echo").unwrap();
        let mut tx = FakeTx { seen: Vec::new() };
        handler(&mut tx, serde_json::json!({"v": 5})).await.unwrap();
        assert_eq!(tx.seen, vec![5]);
    }

    #[tokio::test]
    async fn typed_handler_fails_on_mismatched_payload() {
        let mut registry = HandlerRegistry::<FakeTx>::new();
        registry
            .register_typed::<Echo, _>("echo", |_tx, _input| Box::pin(async { anyhow::Ok(()) }))
            .unwrap();

        let handler = registry.get("echo").unwrap();
        let mut tx = FakeTx { seen: Vec::new() };
        let err = handler(&mut tx, serde_json::json!({"v": "nope"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize 'echo' payload"));
    }
}
