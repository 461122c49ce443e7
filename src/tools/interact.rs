//! Element interaction tools. Both resolve their target through the
//! session's ref store first; a ref from a superseded snapshot never
//! reaches the engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use toolgate_cdp_adapter::{ClickOptions, MouseButton, TypeOptions};
use toolgate_core_types::{ContentBlock, GatewayResult};
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

use super::{bool_arg, int_arg, str_arg, with_session_field, ToolContext};

pub fn click_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(
        InputSchema::builder()
            .required(
                "ref",
                FieldKind::string_bounded(1, 64),
                "Element ref from the latest snapshot",
            )
            .optional_with_default(
                "button",
                FieldKind::one_of(&["left", "middle", "right"]),
                "Mouse button",
                json!("left"),
            )
            .optional_with_default(
                "click_count",
                FieldKind::integer_range(1, 3),
                "1 for single click, 2 for double",
                json!(1),
            ),
    )
    .build();

    ToolDefinition::new(
        "browser.click",
        "Click an element captured by the latest snapshot",
        schema,
        Arc::new(ClickTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct ClickTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for ClickTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let token = str_arg(&args, "ref")?;
        let session = self.ctx.session(&args).await?;
        let node = session.refs.resolve(token)?;
        let window = self.ctx.sessions.active_window(&session).await?;

        let opts = ClickOptions {
            button: match str_arg(&args, "button")? {
                "middle" => MouseButton::Middle,
                "right" => MouseButton::Right,
                _ => MouseButton::Left,
            },
            click_count: int_arg(&args, "click_count", 1) as u32,
        };

        self.ctx
            .engine()
            .click(&session.engine, &window.tab, node, &opts)
            .await?;
        session.touch();

        Ok(vec![ContentBlock::text(format!("Clicked {token}"))])
    }
}

pub fn type_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(
        InputSchema::builder()
            .required(
                "ref",
                FieldKind::string_bounded(1, 64),
                "Element ref from the latest snapshot",
            )
            .required(
                "text",
                FieldKind::string_bounded(0, 16_384),
                "Text to type into the element",
            )
            .optional_with_default(
                "clear",
                FieldKind::Boolean,
                "Clear the field before typing",
                json!(false),
            )
            .optional_with_default(
                "submit",
                FieldKind::Boolean,
                "Press Enter after typing",
                json!(false),
            ),
    )
    .build();

    ToolDefinition::new(
        "browser.type",
        "Type text into an element captured by the latest snapshot",
        schema,
        Arc::new(TypeTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct TypeTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for TypeTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let token = str_arg(&args, "ref")?;
        let text = str_arg(&args, "text")?;
        let session = self.ctx.session(&args).await?;
        let node = session.refs.resolve(token)?;
        let window = self.ctx.sessions.active_window(&session).await?;

        let opts = TypeOptions {
            clear: bool_arg(&args, "clear", false),
            submit: bool_arg(&args, "submit", false),
        };

        self.ctx
            .engine()
            .type_text(&session.engine, &window.tab, node, text, &opts)
            .await?;
        session.touch();

        Ok(vec![ContentBlock::text(format!(
            "Typed {} characters into {token}",
            text.chars().count()
        ))])
    }
}
