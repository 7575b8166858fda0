//! Model discovery and selection.

pub mod catalog;

pub use catalog::{Model, ModelCatalog, ModelResolver};
