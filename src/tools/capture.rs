//! Network/console/dialog capture tools. The record is append-only while
//! capture runs and frozen once stopped.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use toolgate_core_types::{ContentBlock, GatewayError, GatewayResult, Violation};
use toolgate_event_tap::CaptureDomain;
use toolgate_registry::{FieldKind, InputSchema, ToolDefinition, ToolHandler};

use super::{with_session_field, ToolContext};

pub fn definitions(ctx: &Arc<ToolContext>) -> Vec<ToolDefinition> {
    vec![
        start_definition(ctx),
        stop_definition(ctx),
        events_definition(ctx),
    ]
}

fn start_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    let schema = with_session_field(InputSchema::builder().optional(
        "domains",
        FieldKind::Array,
        "Event families to record: network, console, dialog. All when omitted.",
    ))
    .build();
    ToolDefinition::new(
        "browser.capture.start",
        "Start recording page events for the session",
        schema,
        Arc::new(StartTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn stop_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    ToolDefinition::new(
        "browser.capture.stop",
        "Stop recording and freeze the captured sequence",
        with_session_field(InputSchema::builder()).build(),
        Arc::new(StopTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn events_definition(ctx: &Arc<ToolContext>) -> ToolDefinition {
    ToolDefinition::new(
        "browser.capture.events",
        "Return the captured events in arrival order",
        with_session_field(InputSchema::builder()).build(),
        Arc::new(EventsTool {
            ctx: Arc::clone(ctx),
        }),
    )
}

fn parse_domains(args: &Map<String, Value>) -> GatewayResult<Vec<CaptureDomain>> {
    let Some(raw) = args.get("domains").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut domains = Vec::new();
    let mut violations = Vec::new();
    for entry in raw {
        match entry.as_str() {
            Some("network") => domains.push(CaptureDomain::Network),
            Some("console") => domains.push(CaptureDomain::Console),
            Some("dialog") => domains.push(CaptureDomain::Dialog),
            _ => violations.push(Violation::new(
                "domains",
                format!("unknown capture domain {entry}"),
            )),
        }
    }
    if violations.is_empty() {
        Ok(domains)
    } else {
        Err(GatewayError::validation(violations))
    }
}

struct StartTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for StartTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let domains = parse_domains(&args)?;
        let session = self.ctx.session(&args).await?;
        let recording = self.ctx.tap.start(&session.id, &domains);

        let names: Vec<&str> = recording
            .iter()
            .map(|domain| match domain {
                CaptureDomain::Network => "network",
                CaptureDomain::Console => "console",
                CaptureDomain::Dialog => "dialog",
            })
            .collect();
        Ok(vec![ContentBlock::text(format!(
            "Capturing {} events",
            names.join(", ")
        ))])
    }
}

struct StopTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for StopTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let kept = self.ctx.tap.stop(&session.id);
        Ok(vec![ContentBlock::text(format!(
            "Capture stopped with {kept} events"
        ))])
    }
}

struct EventsTool {
    ctx: Arc<ToolContext>,
}

#[async_trait]
impl ToolHandler for EventsTool {
    async fn call(&self, args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
        let session = self.ctx.session(&args).await?;
        let events = self.ctx.tap.events(&session.id);
        let payload =
            serde_json::to_value(&events).map_err(|err| GatewayError::internal(err.to_string()))?;
        Ok(vec![ContentBlock::json(json!({
            "events": payload,
            "dropped": self.ctx.tap.dropped(&session.id),
        }))])
    }
}
