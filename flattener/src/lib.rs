//! # xmlflat - XML to CSV flattening
//!
//! xmlflat turns hierarchically nested XML documents into flat tables. A
//! specification names the columns of each table and the repeating
//! structures ("explodes") that multiply rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  XML File   │────▶│   Parser    │────▶│   Layers    │────▶│  CSV rows   │
//! │ (any enc.)  │     │ (arena doc) │     │ (XPath 1.0) │     │ (cross join)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use xmlflat::{run_file, RunOptions};
//!
//! fn main() {
//!     let summary = run_file("spec.yaml", &RunOptions::from_env()).unwrap();
//!     println!("Flattened {} documents", summary.stats.documents);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`document`] - Read-only XML document arena
//! - [`parser`] - XML decoding and parsing
//! - [`xpath`] - Expression compiler and evaluator
//! - [`models`] - Columns, repeating groups and rows
//! - [`config`] - Specification loading
//! - [`transform`] - Layers, merge and the batch pipeline
//! - [`output`] - CSV writing
//! - [`report`] - Logging and batch counters
//! - [`timeutil`] - Batch time parsing

// Core modules
pub mod error;
pub mod models;

// Input
pub mod document;
pub mod parser;
pub mod xpath;

// Specification
pub mod config;

// Flattening
pub mod transform;

// Output
pub mod output;
pub mod report;
pub mod timeutil;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, DocumentError, DocumentResult, ResolveError, ResolveResult,
    RunError, RunResult, TimeError, XPathError, XPathResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Column, GroupId, RepeatingGroup, Row, SourceKind, SpecTree};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use document::{Document, NodeId};
pub use parser::{parse_bytes, parse_file, parse_str};
pub use xpath::{EvalContext, Selector, Value, XNode};

// =============================================================================
// Re-exports - Specification
// =============================================================================

pub use config::{load as load_specification, OutputTable, Specification};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::{
    flatten_document, merge_rows, run, run_file, DocumentContext, FlattenOutput,
    LayerContainer, RunOptions, RunSummary, TableFlattener, TableSummary,
};

pub use output::CsvSink;
pub use report::{BatchStats, StatsSnapshot};
