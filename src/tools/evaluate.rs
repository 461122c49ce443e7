use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use toolgate_core_types::{ContentBlock, GatewayResult};
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

use super::{opt_str_arg, str_arg, with_session_field, ToolContext};

pub fn definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(
        InputSchema::builder()
            .required(
                "expression",
                FieldKind::string_bounded(1, 65_536),
                "JavaScript to evaluate; a function declaration when `ref` is given",
            )
            .optional(
                "ref",
                FieldKind::string_bounded(1, 64),
                "Evaluate against this element instead of the page",
            ),
    )
    .build();

    ToolDefinition::new(
        "browser.evaluate",
        "Evaluate JavaScript in the active window",
        schema,
        Arc::new(EvaluateTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

struct EvaluateTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for EvaluateTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let expression = str_arg(&args, "expression")?;
        let session = self.ctx.session(&args).await?;

        let node = match opt_str_arg(&args, "ref") {
            Some(token) => Some(session.refs.resolve(token)?),
            None => None,
        };
        let window = self.ctx.sessions.active_window(&session).await?;

        let result = self
            .ctx
            .engine()
            .evaluate(&session.engine, &window.tab, expression, node)
            .await?;
        session.touch();

        Ok(vec![ContentBlock::json(result)])
    }
}
