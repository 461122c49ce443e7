use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use toolgate_core_types::{ContentBlock, GatewayError, GatewayResult};
use toolgate_registry::{InputSchema, ToolDefinition, ToolHandler};

use super::{with_session_field, ToolContext};

pub fn definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(InputSchema::builder()).build();

    ToolDefinition::new(
        "browser.snapshot",
        "Capture the structural tree of the active window; supersedes all prior refs",
        schema,
        Arc::new(SnapshotTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct SnapshotTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SnapshotTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let window = self.ctx.sessions.active_window(&session).await?;

        let tree = self
            .ctx
            .engine()
            .snapshot(&session.engine, &window.tab)
            .await?;
        let snapshot = session.refs.capture(&tree);
        session.touch();

        let payload =
            serde_json::to_value(&snapshot).map_err(|err| GatewayError::internal(err.to_string()))?;
        Ok(vec![
            ContentBlock::text(format!(
                "Snapshot generation {} ({} refs)",
                snapshot.generation, snapshot.ref_count
            )),
            ContentBlock::json(payload),
        ])
    }
}
