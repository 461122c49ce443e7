use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use toolgate_core_types::{ContentBlock, GatewayResult};
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

use super::{str_arg, with_session_field, ToolContext};

pub fn definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(
        InputSchema::builder().required("url", FieldKind::Url, "Absolute URL to open"),
    )
    .build();

    ToolDefinition::new(
        "browser.navigate",
        "Navigate the active window to a URL",
        schema,
        Arc::new(NavigateTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct NavigateTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for NavigateTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let url = str_arg(&args, "url")?;
        let session = self.ctx.session(&args).await?;
        let window = self.ctx.sessions.active_window(&session).await?;

        let info = self
            .ctx
            .engine()
            .navigate(&session.engine, &window.tab, url)
            .await?;
        self.ctx
            .sessions
            .note_navigation(&session, &window.tab, &info.url, &info.title)
            .await;

        Ok(vec![
            ContentBlock::text(format!("Navigated to {}", info.url)),
            ContentBlock::json(json!({
                "tab_id": info.tab,
                "url": info.url,
                "title": info.title,
            })),
        ])
    }
}
