//! Specification loading.
//!
//! A specification file declares one or more output tables. Each table is a
//! list of column definitions; a definition with `explode: true` opens a
//! repeating group whose `repeatingList` holds the next layer down.
//!
//! ```yaml
//! name: Orders
//! inputPath: xml
//! outputTables:
//!   - name: lines
//!     outputFile: out/lines.csv
//!     definition:
//!       - { columnName: id, sourceType: xpath, sourceDef: "order/@id" }
//!       - columnName: line
//!         explode: true
//!         sourceDef: "order/line"
//!         repeatingList:
//!           - { columnName: sku, sourceType: xpath, sourceDef: "sku" }
//! ```
//!
//! Every problem found here is a [`ConfigError`] and stops the run before
//! any output is written.

pub mod schema;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{Column, GroupId, SourceKind, SpecTree};
use crate::xpath::Selector;
pub use schema::{ColumnDef, SpecFile, TableDef};

// =============================================================================
// Compiled specification
// =============================================================================

/// A loaded and validated specification.
#[derive(Debug)]
pub struct Specification {
    pub name: String,
    /// File the specification was read from, if any
    pub origin: Option<PathBuf>,
    /// Resolved input directory
    pub input_path: PathBuf,
    pub tables: Vec<OutputTable>,
}

impl Specification {
    pub fn table(&self, name: &str) -> Option<&OutputTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn has_dynamic_columns(&self) -> bool {
        self.tables.iter().any(|t| t.has_dynamic_columns())
    }
}

/// One output table with its layer tree.
#[derive(Debug)]
pub struct OutputTable {
    pub name: String,
    pub output_file: PathBuf,
    pub tree: SpecTree,
}

impl OutputTable {
    pub fn has_dynamic_columns(&self) -> bool {
        self.tree.all_columns().iter().any(|c| c.is_dynamic())
    }

    /// Columns in output order. With `expand_resolved`, dynamic columns are
    /// replaced by the columns resolved for them so far.
    pub fn columns(&self, expand_resolved: bool) -> Vec<Arc<Column>> {
        let mut out = Vec::new();
        for column in self.tree.all_columns() {
            if expand_resolved && column.is_dynamic() {
                out.extend(column.resolved_columns());
            } else {
                out.push(column);
            }
        }
        out.sort();
        out
    }

    pub fn column_names(&self, expand_resolved: bool) -> Vec<String> {
        self.columns(expand_resolved)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Reject two columns whose names differ only by case.
    pub fn check_duplicates(&self, expand_resolved: bool) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for column in self.columns(expand_resolved) {
            if !seen.insert(column.name().to_lowercase()) {
                return Err(ConfigError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load a specification from disk. `.json` files are read as JSON, anything
/// else as YAML.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<Specification> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file = if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        parse_json(&text)?
    } else {
        parse_yaml(&text)?
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut spec = build(file, base)?;
    spec.origin = Some(path.to_path_buf());
    Ok(spec)
}

pub fn parse_yaml(text: &str) -> ConfigResult<SpecFile> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn parse_json(text: &str) -> ConfigResult<SpecFile> {
    Ok(serde_json::from_str(text)?)
}

/// Validate a parsed file and build its tables. Relative input paths are
/// resolved against `base_dir`.
pub fn build(file: SpecFile, base_dir: &Path) -> ConfigResult<Specification> {
    let name = file.name.clone().unwrap_or_else(|| "unnamed".to_string());
    if file.output_tables.is_empty() {
        return Err(ConfigError::NoOutputTables(name));
    }
    let input_path = base_dir.join(file.input_path.as_deref().unwrap_or("."));

    // Sequence numbers run across every table in definition order
    let mut sequence = 0usize;
    let mut tables = Vec::with_capacity(file.output_tables.len());
    for (i, def) in file.output_tables.iter().enumerate() {
        let table = build_table(def, i, &input_path, &mut sequence)?;
        table.check_duplicates(false)?;
        tables.push(table);
    }

    Ok(Specification {
        name,
        origin: None,
        input_path,
        tables,
    })
}

fn build_table(
    def: &TableDef,
    index: usize,
    input_path: &Path,
    sequence: &mut usize,
) -> ConfigResult<OutputTable> {
    let name = def.name.clone().ok_or_else(|| ConfigError::MissingField {
        field: "name",
        context: format!("outputTables[{}]", index),
    })?;
    let output_file = def.output_file.as_deref().ok_or_else(|| ConfigError::MissingField {
        field: "outputFile",
        context: format!("output table '{}'", name),
    })?;
    let definition = def.definition.as_ref().ok_or_else(|| ConfigError::MissingField {
        field: "definition",
        context: format!("output table '{}'", name),
    })?;

    let mut tree = SpecTree::new();
    for column in definition {
        add_definition(&mut tree, column, None, 0, sequence)?;
    }

    let table = OutputTable {
        output_file: input_path.join(output_file),
        name,
        tree,
    };
    check_layers(&table)?;
    Ok(table)
}

fn add_definition(
    tree: &mut SpecTree,
    def: &ColumnDef,
    parent: Option<GroupId>,
    level: usize,
    sequence: &mut usize,
) -> ConfigResult<()> {
    let name = def.column_name.clone().ok_or_else(|| ConfigError::MissingField {
        field: "columnName",
        context: format!("a level {} definition", level),
    })?;

    if def.explode {
        let source = def.source_def.clone().unwrap_or_default();
        let selector = Selector::compile(&source).map_err(|e| ConfigError::InvalidExpression {
            owner: name.clone(),
            expression: source.clone(),
            source: e,
        })?;
        let children = match &def.repeating_list {
            Some(list) if !list.is_empty() => list,
            _ => return Err(ConfigError::MissingRepeatingList(name)),
        };
        let group = tree.add_group(parent, name, selector, def.circuit_breaker);
        for child in children {
            add_definition(tree, child, Some(group), level + 1, sequence)?;
        }
        return Ok(());
    }

    let type_str = def.source_type.as_deref().ok_or_else(|| ConfigError::MissingField {
        field: "sourceType",
        context: format!("column '{}'", name),
    })?;
    let kind = SourceKind::from_config(type_str).ok_or_else(|| ConfigError::UnknownSourceType {
        column: name.clone(),
        value: type_str.to_string(),
    })?;
    let source = def.source_def.clone().ok_or_else(|| ConfigError::MissingField {
        field: "sourceDef",
        context: format!("column '{}'", name),
    })?;

    let mut column = Column::new(name.clone(), kind, source, level, parent, *sequence)?;
    *sequence += 1;
    if kind == SourceKind::DynamicAttribute {
        let filter = def
            .attribute_filter
            .as_deref()
            .ok_or_else(|| ConfigError::MissingAttributeFilter(name.clone()))?;
        column = column.with_attribute_filter(filter)?;
    }
    tree.add_column(Arc::new(column));
    Ok(())
}

/// Every layer needs at least one column of its own.
fn check_layers(table: &OutputTable) -> ConfigResult<()> {
    if table.tree.root_columns().is_empty() {
        return Err(ConfigError::EmptyLayer {
            layer: table.name.clone(),
            level: 0,
        });
    }
    for id in table.tree.group_ids() {
        let group = table.tree.group(id);
        if group.columns().is_empty() {
            return Err(ConfigError::EmptyLayer {
                layer: group.name().to_string(),
                level: group.level(),
            });
        }
    }
    Ok(())
}
