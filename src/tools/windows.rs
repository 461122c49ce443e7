//! Tab/window management tools. All table mutations go through the
//! session center so they serialize per session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use toolgate_core_types::{ContentBlock, GatewayError, GatewayResult, TabId};
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

use super::{opt_str_arg, str_arg, with_session_field, ToolContext};

pub fn definitions(ctx: &Arc<ToolContext>) -> Vec<ToolDefinition> {
    vec![
        list_definition(ctx),
        open_definition(ctx),
        select_definition(ctx),
        close_definition(ctx),
    ]
}

fn list_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    ToolDefinition::new(
        "browser.tabs.list",
        "List the session's windows",
        with_session_field(InputSchema::builder()).build(),
        Arc::new(ListTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn open_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(
        InputSchema::builder().optional("url", FieldKind::Url, "URL the new window opens on"),
    )
    .build();
    ToolDefinition::new(
        "browser.tabs.open",
        "Open a window and make it active",
        schema,
        Arc::new(OpenTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn select_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(InputSchema::builder().required(
        "tab_id",
        FieldKind::string_bounded(1, 128),
        "Window to activate",
    ))
    .build();
    ToolDefinition::new(
        "browser.tabs.select",
        "Make an existing window the active one",
        schema,
        Arc::new(SelectTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn close_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(InputSchema::builder().optional(
        "tab_id",
        FieldKind::string_bounded(1, 128),
        "Window to close; the active one when omitted",
    ))
    .build();
    ToolDefinition::new(
        "browser.tabs.close",
        "Close a window; the active one falls back to the main window",
        schema,
        Arc::new(CloseTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct ListTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for ListTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let windows = self.ctx.sessions.list_windows(&session).await;
        let payload =
            serde_json::to_value(&windows).map_err(|err| GatewayError::internal(err.to_string()))?;
        Ok(vec![ContentBlock::json(json!({ "windows": payload }))])
    }
}

struct OpenTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for OpenTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let handle = self
            .ctx
            .sessions
            .open_window(&session, opt_str_arg(&args, "url"))
            .await?;
        Ok(vec![
            ContentBlock::text(format!("Opened window {}", handle.tab)),
            ContentBlock::json(json!({
                "tab_id": handle.tab,
                "url": handle.url,
                "is_active": handle.is_active,
            })),
        ])
    }
}

struct SelectTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for SelectTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let tab = TabId(str_arg(&args, "tab_id")?.to_string());
        let session = self.ctx.session(&args).await?;
        let handle = self.ctx.sessions.switch_window(&session, &tab).await?;
        Ok(vec![ContentBlock::text(format!(
            "Active window is now {} ({})",
            handle.tab, handle.url
        ))])
    }
}

struct CloseTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for CloseTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let tab = match opt_str_arg(&args, "tab_id") {
            Some(id) => TabId(id.to_string()),
            None => self.ctx.sessions.active_window(&session).await?.tab,
        };
        self.ctx.sessions.close_window(&session, &tab).await?;
        Ok(vec![ContentBlock::text(format!("Closed window {tab}"))])
    }
}
