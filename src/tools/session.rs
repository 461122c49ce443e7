use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use toolgate_core_types::{ContentBlock, GatewayResult};
use toolgate_registry::{InputSchema, ToolDefinition, ToolHandler};
use toolgate_session_center::DEFAULT_SESSION;

use super::{with_session_field, ToolContext};

pub fn close_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    ToolDefinition::new(
        "browser.close",
        "Close the session, its windows and all outstanding refs",
        with_session_field(InputSchema::builder()).build(),
        Arc::new(CloseTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct CloseTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for CloseTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let name = args
            .get("session")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SESSION);

        // Closing must not create the session first, so bypass ensure().
        let message = match self.ctx.sessions.get(name) {
            Some(ctx) => {
                self.ctx.tap.clear(&ctx.id);
                self.ctx.sessions.close(name).await?;
                format!("Session `{name}` closed")
            }
            None => format!("Session `{name}` was not open"),
        };
        Ok(vec![ContentBlock::text(message)])
    }
}
