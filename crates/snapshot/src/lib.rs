//! Generation-scoped element references.
//!
//! A snapshot names the elements it saw; those names are only valid within
//! the generation that produced them. Refs are an index into a
//! generation-tagged table, never raw handles, so a superseded ref fails
//! distinctly instead of silently resolving to the wrong element.

pub mod model;
pub mod resolver;

pub use model::{PageSnapshot, SnapshotNode};
pub use resolver::RefStore;
