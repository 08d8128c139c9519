//! Error types for the xmlflat flattening engine.
//!
//! The hierarchy mirrors the processing stages:
//!
//! - [`ConfigError`] - specification loading (fatal before any output)
//! - [`XPathError`] - expression compilation and evaluation
//! - [`ResolveError`] - per-document column/group resolution
//! - [`DocumentError`] - malformed source documents (skipped by the batch)
//! - [`TimeError`] - timestamp parsing
//! - [`RunError`] - top-level batch orchestration
//!
//! Conversion into [`RunError`] is automatic via `From` implementations,
//! so `?` works across stage boundaries.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading and validating a flattening specification.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the specification file.
    #[error("Failed to read specification '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML syntax or shape error.
    #[error("Invalid YAML specification: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON syntax or shape error.
    #[error("Invalid JSON specification: {0}")]
    Json(#[from] serde_json::Error),

    /// The specification declares no output tables.
    #[error("Specification '{0}' does not contain any outputTables")]
    NoOutputTables(String),

    /// A required field is absent.
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: &'static str, context: String },

    /// The sourceType is not one of the known kinds.
    #[error("Column '{column}': unknown sourceType '{value}'")]
    UnknownSourceType { column: String, value: String },

    /// Two columns of one table share a name (case-insensitive).
    #[error("Table '{table}' contains a duplicate column '{column}'")]
    DuplicateColumn { table: String, column: String },

    /// A layer ended up without any columns.
    #[error("Layer '{layer}' (level {level}) has no columns; every level needs at least one non-exploded column")]
    EmptyLayer { layer: String, level: usize },

    /// An exploded column without children.
    #[error("Exploded column '{0}' must contain a non-empty repeatingList")]
    MissingRepeatingList(String),

    /// An expression failed to compile.
    #[error("Invalid expression for '{owner}': '{expression}': {source}")]
    InvalidExpression {
        owner: String,
        expression: String,
        #[source]
        source: XPathError,
    },

    /// A dynamic-attribute column without an attribute filter.
    #[error("Dynamic attribute column '{0}' requires an attributeFilter")]
    MissingAttributeFilter(String),

    /// The attribute filter is not a valid regular expression.
    #[error("Column '{column}': invalid attributeFilter '{filter}': {source}")]
    InvalidAttributeFilter {
        column: String,
        filter: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Expression Errors
// =============================================================================

/// Errors from compiling or evaluating a selection expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum XPathError {
    /// The expression text is not valid.
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// The expression is valid but could not be evaluated.
    #[error("Evaluation failed: {0}")]
    Eval(String),

    /// The evaluation visited more nodes than the configured budget.
    #[error("Evaluation aborted after visiting more than {limit} nodes")]
    ResourceExhausted { limit: usize },
}

impl XPathError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        XPathError::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        XPathError::Eval(message.into())
    }
}

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors while resolving a column or repeating group against one document.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Expression evaluation failed for a column or group.
    #[error("Unable to evaluate {owner_kind} '{name}' (level {level}) with expression '{expression}': {source}")]
    Evaluation {
        owner_kind: &'static str,
        name: String,
        expression: String,
        level: usize,
        #[source]
        source: XPathError,
    },

    /// Dynamic attribute expansion requested on a column that is not dynamic.
    #[error("Column '{0}' is not a dynamic attribute column; resolved columns cannot be added")]
    NotDynamic(String),

    /// A dynamic attribute column reached the main resolution pass.
    #[error("Column '{0}' is a dynamic attribute column and should already have been expanded")]
    DynamicInMainPass(String),

    /// The source kind has no resolver yet.
    #[error("Column '{column}': source kind '{kind}' is not implemented")]
    UnimplementedKind { column: String, kind: String },

    /// A recursive node list was requested for a column without a repeating group.
    #[error("Column '{0}' has no repeating group ancestor; no recursive node list exists")]
    NoRepeatingGroup(String),
}

impl ResolveError {
    /// True when the underlying cause is an evaluation budget overrun.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            ResolveError::Evaluation {
                source: XPathError::ResourceExhausted { .. },
                ..
            }
        )
    }
}

// =============================================================================
// Document Errors
// =============================================================================

/// Errors while decoding or parsing a source XML document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document has no content.
    #[error("XML document is empty")]
    Empty,

    /// The byte content could not be decoded.
    #[error("Failed to decode document: {0}")]
    Encoding(String),

    /// The XML is not well formed.
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// Elements still open at end of input.
    #[error("Unexpected end of document: element <{0}> is not closed")]
    Unclosed(String),

    /// No root element was found.
    #[error("XML document has no root element")]
    NoRoot,
}

// =============================================================================
// Time Errors
// =============================================================================

/// Errors while parsing timestamps.
#[derive(Debug, Error)]
pub enum TimeError {
    /// None of the supported formats matched.
    #[error("Unable to parse '{0}' as a timestamp; it is not in a supported format")]
    Unparseable(String),
}

// =============================================================================
// Run Errors (top-level)
// =============================================================================

/// Top-level batch errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run`].
#[derive(Debug, Error)]
pub enum RunError {
    /// Specification error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resolution error that aborts the run.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Malformed document (only surfaces when flattening a single file).
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Invalid timestamp.
    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Summary serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured input directory does not exist.
    #[error("Input directory '{0}' does not exist")]
    InputMissing(PathBuf),

    /// A table name that the specification does not define.
    #[error("Unknown output table '{0}'")]
    UnknownTable(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for specification loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for expression compilation and evaluation.
pub type XPathResult<T> = Result<T, XPathError>;

/// Result type for per-document resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for document parsing.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for batch runs.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let config_err = ConfigError::MissingRepeatingList("items".into());
        let run_err: RunError = config_err.into();
        assert!(run_err.to_string().contains("items"));

        let doc_err = DocumentError::NoRoot;
        let run_err: RunError = doc_err.into();
        assert!(run_err.to_string().contains("root"));
    }

    #[test]
    fn test_resolve_error_identifies_owner() {
        let err = ResolveError::Evaluation {
            owner_kind: "column",
            name: "price".into(),
            expression: "item/@price".into(),
            level: 2,
            source: XPathError::eval("not a node-set"),
        };
        let msg = err.to_string();
        assert!(msg.contains("price"));
        assert!(msg.contains("item/@price"));
        assert!(msg.contains("level 2"));
        assert!(!err.is_resource_exhausted());
    }

    #[test]
    fn test_resource_exhaustion_is_detected() {
        let err = ResolveError::Evaluation {
            owner_kind: "group",
            name: "rows".into(),
            expression: "//*".into(),
            level: 1,
            source: XPathError::ResourceExhausted { limit: 10 },
        };
        assert!(err.is_resource_exhausted());
    }
}
