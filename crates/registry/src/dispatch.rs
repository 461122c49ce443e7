use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use toolgate_core_types::{ContentBlock, GatewayError, GatewayResult, ToolCall};
use toolgate_scheduler::AdmissionGate;

use crate::metrics;
use crate::table::ToolRegistry;

/// Entry point for protocol callers.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, call: ToolCall) -> GatewayResult<Vec<ContentBlock>>;
}

/// Routes a named call through validation, the admission gate and a timed
/// handler execution. Every exit is a classified [`GatewayError`]; handler
/// panics fold into the internal class.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    gate: Arc<AdmissionGate>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, gate: Arc<AdmissionGate>, call_timeout: Duration) -> Self {
        Self {
            registry,
            gate,
            call_timeout,
        }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn dispatch(&self, call: ToolCall) -> GatewayResult<Vec<ContentBlock>> {
        let enqueued = Instant::now();
        let definition = self
            .registry
            .get(&call.name)
            .ok_or_else(|| GatewayError::unknown_tool(&call.name))?;

        let args = definition
            .schema()
            .validate(&call.arguments)
            .map_err(GatewayError::validation)?;

        let slot = self.gate.acquire().await?;
        let wait_ms = enqueued.elapsed().as_millis() as u64;
        let started = Instant::now();

        // Run the handler on its own task so a timeout can abort it instead
        // of leaving it parked on the admission slot, and so a panic is
        // contained as a join error.
        let handler = definition.handler();
        let mut execution = tokio::spawn(async move { handler.call(args).await });

        let result = match tokio::time::timeout(self.call_timeout, &mut execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(GatewayError::internal("tool handler panicked"))
            }
            Ok(Err(_)) => Err(GatewayError::internal("tool handler aborted")),
            Err(_) => {
                execution.abort();
                Err(GatewayError::timeout(&call.name, self.call_timeout))
            }
        };
        drop(slot);

        let run_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(content) => {
                metrics::record_dispatch(&call.name, "ok", started.elapsed());
                info!(
                    tool = %call.name,
                    wait_ms,
                    run_ms,
                    blocks = content.len(),
                    "tool call completed"
                );
            }
            Err(err) => {
                metrics::record_dispatch(&call.name, err.kind(), started.elapsed());
                warn!(
                    tool = %call.name,
                    wait_ms,
                    run_ms,
                    kind = err.kind(),
                    error = %err,
                    "tool call failed"
                );
            }
        }

        result
    }
}

#[async_trait]
impl<D> Dispatch for Arc<D>
where
    D: Dispatch + ?Sized,
{
    async fn dispatch(&self, call: ToolCall) -> GatewayResult<Vec<ContentBlock>> {
        (**self).dispatch(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use toolgate_scheduler::AdmissionConfig;

    use crate::model::{ToolDefinition, ToolHandler};
    use crate::schema::{FieldKind, InputSchema};

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
            let text = args["text"].as_str().unwrap_or_default().to_string();
            Ok(vec![ContentBlock::text(text)])
        }
    }

    struct StallHandler;

    #[async_trait]
    impl ToolHandler for StallHandler {
        async fn call(&self, _args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl ToolHandler for PanicHandler {
        async fn call(&self, _args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
            panic!("handler blew up");
        }
    }

    fn echo_schema() -> InputSchema {
        InputSchema::builder()
            .required("text", FieldKind::string(), "Text to echo back")
            .build()
    }

    fn dispatcher_with(definitions: Vec<ToolDefinition>, max_concurrent: usize) -> Dispatcher {
        let registry = Arc::new(ToolRegistry::new());
        for definition in definitions {
            registry.register(definition).unwrap();
        }
        let gate = AdmissionGate::new(AdmissionConfig {
            max_concurrent,
            queue_timeout: Some(Duration::from_secs(2)),
        });
        Dispatcher::new(registry, gate, Duration::from_millis(200))
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(name, arguments.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let dispatcher = dispatcher_with(
            vec![ToolDefinition::new(
                "echo",
                "Echo text back",
                echo_schema(),
                Arc::new(EchoHandler),
            )],
            3,
        );

        let content = dispatcher
            .dispatch(call("echo", json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(content[0].as_text(), Some("hi"));
    }

    #[tokio::test]
    async fn unknown_tool_is_classified() {
        let dispatcher = dispatcher_with(Vec::new(), 3);
        let err = dispatcher.dispatch(call("missing", json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[tokio::test]
    async fn validation_lists_missing_fields() {
        let dispatcher = dispatcher_with(
            vec![ToolDefinition::new(
                "echo",
                "",
                echo_schema(),
                Arc::new(EchoHandler),
            )],
            3,
        );

        let err = dispatcher.dispatch(call("echo", json!({}))).await.unwrap_err();
        match err {
            GatewayError::Validation { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "text");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stuck_handler_times_out_and_frees_the_slot() {
        let dispatcher = dispatcher_with(
            vec![
                ToolDefinition::new("stall", "", InputSchema::empty(), Arc::new(StallHandler)),
                ToolDefinition::new("echo", "", echo_schema(), Arc::new(EchoHandler)),
            ],
            1,
        );

        let err = dispatcher.dispatch(call("stall", json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");

        // The slot must be free again for the next call.
        let content = dispatcher
            .dispatch(call("echo", json!({"text": "after"})))
            .await
            .unwrap();
        assert_eq!(content[0].as_text(), Some("after"));
    }

    #[tokio::test]
    async fn handler_panic_folds_to_internal() {
        let dispatcher = dispatcher_with(
            vec![ToolDefinition::new(
                "boom",
                "",
                InputSchema::empty(),
                Arc::new(PanicHandler),
            )],
            1,
        );

        let err = dispatcher.dispatch(call("boom", json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[tokio::test]
    async fn concurrent_dispatch_respects_the_bound() {
        struct CountingHandler {
            current: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl ToolHandler for CountingHandler {
            async fn call(&self, _args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(dispatcher_with(
            vec![ToolDefinition::new(
                "busy",
                "",
                InputSchema::empty(),
                Arc::new(CountingHandler {
                    current: Arc::clone(&current),
                    peak: Arc::clone(&peak),
                }),
            )],
            2,
        ));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move {
                dispatcher.dispatch(call("busy", json!({}))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
