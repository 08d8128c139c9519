//! Serialized specification format.
//!
//! These types mirror the YAML/JSON file one to one; validation happens in
//! [`super::build`].

use serde::{Deserialize, Serialize};

/// Top level of a specification file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecFile {
    #[serde(default)]
    pub name: Option<String>,

    /// Directory holding the XML inputs, relative to the specification file
    #[serde(default)]
    pub input_path: Option<String>,

    #[serde(default)]
    pub output_tables: Vec<TableDef>,
}

/// One output table (one CSV file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    #[serde(default)]
    pub name: Option<String>,

    /// CSV path, relative to the input path
    #[serde(default)]
    pub output_file: Option<String>,

    #[serde(default)]
    pub definition: Option<Vec<ColumnDef>>,
}

/// A column, or a repeating group when `explode` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    #[serde(default)]
    pub column_name: Option<String>,

    #[serde(default)]
    pub source_type: Option<String>,

    #[serde(default)]
    pub source_def: Option<String>,

    /// Attribute-name pattern for dynamic attribute columns
    #[serde(default)]
    pub attribute_filter: Option<String>,

    #[serde(default)]
    pub explode: bool,

    /// Maximum matches per expansion point
    #[serde(default)]
    pub circuit_breaker: Option<usize>,

    #[serde(default)]
    pub repeating_list: Option<Vec<ColumnDef>>,
}
