//! Flattening engine.
//!
//! - Context: per-document evaluation state
//! - Layer: per-layer value resolution and row normalization
//! - Merge: cross join of layer rows
//! - Dynamic: attribute discovery for dynamic columns
//! - Pipeline: the batch runner

pub mod context;
pub mod dynamic;
pub mod layer;
pub mod merge;
pub mod pipeline;

pub use context::DocumentContext;
pub use dynamic::{expand_column, expand_dynamic_columns};
pub use layer::{resolve_column, LayerContainer};
pub use merge::{merge_layers, merge_rows};
pub use pipeline::*;
