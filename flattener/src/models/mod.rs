//! Domain models for the flattening engine.
//!
//! - [`Column`] - one output column and its source definition
//! - [`SourceKind`] - expression, literal, dynamic attribute or dynamic element
//! - [`SpecTree`] - root columns plus the arena of [`RepeatingGroup`]s
//! - [`Row`] - paired column/value sequences produced for one document

pub mod column;
pub mod row;
pub mod tree;

pub use column::{Column, SourceKind, BATCH_TIME_TOKEN, CURRENT_TIME_TOKEN};
pub use row::{Row, RowShapeError};
pub use tree::{GroupId, RepeatingGroup, SpecTree};
