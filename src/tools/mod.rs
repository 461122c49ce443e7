//! Built-in browser tools.
//!
//! Every handler resolves its session through the session center and its
//! element refs through the session's ref store before touching the
//! engine. Handlers trust their arguments: the dispatcher has already run
//! them through the tool's schema.

mod capture;
mod evaluate;
mod interact;
mod navigate;
mod session;
mod snapshot;
mod windows;

use std::sync::Arc;

use serde_json::{Map, Value};

use toolgate_cdp_adapter::AutomationEngine;
use toolgate_core_types::{GatewayError, GatewayResult};
use toolgate_event_tap::EventTap;
use toolgate_registry::{FieldKind, InputSchemaBuilder, ToolRegistry};
use toolgate_session_center::{SessionCenter, SessionCtx, DEFAULT_SESSION};

pub struct ToolContext {
    pub sessions: Arc<SessionCenter>,
    pub tap: Arc<EventTap>,
}

impl ToolContext {
    /// Session the call addresses, created lazily on first use.
    pub async fn session(&self, args: &Map<String, Value>) -> GatewayResult<Arc<SessionCtx>> {
        let name = args
            .get("session")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SESSION);
        self.sessions.ensure(name).await
    }

    pub fn engine(&self) -> Arc<dyn AutomationEngine> {
        self.sessions.engine()
    }
}

/// Register every built-in tool, in the order they are documented.
pub fn register_builtin(registry: &ToolRegistry, ctx: &Arc<ToolContext>) -> GatewayResult<()> {
    registry.register(navigate::definition(ctx))?;
    registry.register(interact::click_definition(ctx))?;
    registry.register(interact::type_definition(ctx))?;
    registry.register(evaluate::definition(ctx))?;
    registry.register(snapshot::definition(ctx))?;
    for definition in windows::definitions(ctx) {
        registry.register(definition)?;
    }
    for definition in capture::definitions(ctx) {
        registry.register(definition)?;
    }
    registry.register(session::close_definition(ctx))?;
    Ok(())
}

/// Attach the shared `session` field to a schema under construction.
pub(crate) fn with_session_field(builder: InputSchemaBuilder) -> InputSchemaBuilder {
    builder.optional_with_default(
        "session",
        FieldKind::string_bounded(1, 64),
        "Named session the call addresses",
        Value::String(DEFAULT_SESSION.to_string()),
    )
}

pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> GatewayResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::internal(format!("argument `{key}` missing after validation")))
}

pub(crate) fn opt_str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn bool_arg(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn int_arg(args: &Map<String, Value>, key: &str, default: i64) -> i64 {
    args.get(key).and_then(Value::as_i64).unwrap_or(default)
}
