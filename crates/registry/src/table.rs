use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use toolgate_core_types::{GatewayError, GatewayResult};

use crate::model::{ToolDefinition, ToolSpec};

/// Name-unique tool table preserving registration order.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Vec<Arc<ToolDefinition>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken; the table is
    /// left untouched in that case.
    pub fn register(&self, definition: ToolDefinition) -> GatewayResult<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|entry| entry.name() == definition.name()) {
            return Err(GatewayError::DuplicateTool {
                name: definition.name().to_string(),
            });
        }
        debug!(tool = definition.name(), "tool registered");
        entries.push(Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDefinition>> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.name() == name)
            .map(Arc::clone)
    }

    /// Tool specs in registration order; read-only, no side effects.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries.read().iter().map(|entry| entry.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Arc;
    use toolgate_core_types::ContentBlock;

    use crate::model::ToolHandler;
    use crate::schema::InputSchema;

    struct NoopHandler;

    #[async_trait]
    impl ToolHandler for NoopHandler {
        async fn call(&self, _args: Map<String, Value>) -> GatewayResult<Vec<ContentBlock>> {
            Ok(Vec::new())
        }
    }

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, "", InputSchema::empty(), Arc::new(NoopHandler))
    }

    #[test]
    fn holds_exactly_one_definition_per_name() {
        let registry = ToolRegistry::new();
        registry.register(definition("browser.navigate")).unwrap();
        registry.register(definition("browser.click")).unwrap();

        let err = registry.register(definition("browser.navigate")).unwrap_err();
        assert_eq!(err.kind(), "duplicate_tool");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn specs_preserve_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(definition(name)).unwrap();
        }
        let names: Vec<String> = registry.specs().into_iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
