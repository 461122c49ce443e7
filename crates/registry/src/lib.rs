//! Tool registry and dispatch pipeline.
//!
//! Tools are closed records: a name, a declarative input schema and a
//! handler looked up through the registry. Dispatch funnels every call
//! through validation, the admission gate and a per-call timeout, and
//! never lets an unclassified failure escape.

pub mod dispatch;
pub mod metrics;
pub mod model;
pub mod schema;
pub mod table;

pub use dispatch::{Dispatch, Dispatcher};
pub use model::{ToolDefinition, ToolHandler, ToolSpec};
pub use schema::{FieldKind, FieldSpec, InputSchema, InputSchemaBuilder};
pub use table::ToolRegistry;
