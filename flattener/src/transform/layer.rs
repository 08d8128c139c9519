//! Layer containers.
//!
//! One container per layer of a table: the root columns, or the columns a
//! repeating group owns directly. For each document the container resolves
//! every column to a list of values, then pads the lists into rows.

use rayon::prelude::*;
use std::sync::Arc;

use super::context::DocumentContext;
use crate::error::{ConfigError, ConfigResult, ResolveError, ResolveResult};
use crate::models::{Column, GroupId, Row, SourceKind, SpecTree};
use crate::report::{log_debug, log_error};
use crate::xpath::XNode;

/// Columns of one layer plus the values and rows of the current document.
#[derive(Debug)]
pub struct LayerContainer {
    name: String,
    level: usize,
    group: Option<GroupId>,
    columns: Vec<Arc<Column>>,
    values: Vec<Vec<String>>,
    rows: Vec<Row>,
}

impl LayerContainer {
    /// Build a container for `columns`.
    ///
    /// With `expand_resolved`, each dynamic-attribute column is replaced by
    /// the columns resolved for it so far. An empty result is an error.
    pub fn new(
        name: impl Into<String>,
        level: usize,
        group: Option<GroupId>,
        columns: &[Arc<Column>],
        expand_resolved: bool,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let mut layer_columns = Vec::with_capacity(columns.len());
        for column in columns {
            if expand_resolved && column.is_dynamic() {
                layer_columns.extend(column.resolved_columns());
            } else {
                layer_columns.push(column.clone());
            }
        }
        if layer_columns.is_empty() {
            return Err(ConfigError::EmptyLayer { layer: name, level });
        }
        Ok(Self {
            name,
            level,
            group,
            columns: layer_columns,
            values: Vec::new(),
            rows: Vec::new(),
        })
    }

    /// One container for the root and one per group, in tree pre-order.
    pub fn containers_for(tree: &SpecTree, expand_resolved: bool) -> ConfigResult<Vec<Self>> {
        let mut out = Vec::with_capacity(tree.group_ids().count() + 1);
        out.push(Self::new("root", 0, None, tree.root_columns(), expand_resolved)?);
        for id in tree.group_ids() {
            let group = tree.group(id);
            out.push(Self::new(
                group.name(),
                group.level(),
                Some(id),
                group.columns(),
                expand_resolved,
            )?);
        }
        Ok(out)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Rows of the last processed document.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Drop the previous document's values and rows.
    pub fn clear(&mut self) {
        self.values.clear();
        self.rows.clear();
    }

    /// Resolve every column against the document in `ctx`.
    ///
    /// The group's node lists are computed once and shared by all columns
    /// of the layer.
    pub fn resolve(
        &mut self,
        tree: &SpecTree,
        ctx: &DocumentContext<'_>,
        parallel: bool,
    ) -> ResolveResult<()> {
        let node_lists = match self.group {
            Some(id) => Some(tree.node_lists(id, &ctx.eval_context()).map_err(note_exhaustion)?),
            None => None,
        };
        let lists = node_lists.as_deref();

        self.values = if parallel {
            self.columns
                .par_iter()
                .map(|c| resolve_column(c, lists, ctx).map_err(note_exhaustion))
                .collect::<ResolveResult<Vec<_>>>()?
        } else {
            self.columns
                .iter()
                .map(|c| resolve_column(c, lists, ctx).map_err(note_exhaustion))
                .collect::<ResolveResult<Vec<_>>>()?
        };
        Ok(())
    }

    /// Turn the resolved value lists into rows.
    ///
    /// Columns are ordered by descending value count, then by name. The
    /// longest list sets the row count and shorter lists are padded with
    /// blanks, so every row carries every column.
    pub fn normalize(&mut self) {
        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by(|&a, &b| {
            let len = |i: usize| self.values.get(i).map(Vec::len).unwrap_or(0);
            len(b)
                .cmp(&len(a))
                .then_with(|| self.columns[a].name().cmp(self.columns[b].name()))
        });

        let height = order
            .first()
            .and_then(|&i| self.values.get(i))
            .map(Vec::len)
            .unwrap_or(0);

        if crate::report::debug_enabled() {
            let names: Vec<&str> = order.iter().map(|&i| self.columns[i].name()).collect();
            log_debug(format!(
                "Layer '{}' (level {}): {} rows over [{}]",
                self.name,
                self.level,
                height,
                names.join(", ")
            ));
        }

        self.rows = (0..height)
            .map(|r| {
                Row::from_pairs(order.iter().map(|&i| {
                    let value = self
                        .values
                        .get(i)
                        .and_then(|v| v.get(r))
                        .cloned()
                        .unwrap_or_default();
                    (self.columns[i].clone(), value)
                }))
            })
            .collect();
    }

    /// Clear, resolve and normalize for one document.
    pub fn process(
        &mut self,
        tree: &SpecTree,
        ctx: &DocumentContext<'_>,
        parallel: bool,
    ) -> ResolveResult<()> {
        self.clear();
        self.resolve(tree, ctx, parallel)?;
        self.normalize();
        Ok(())
    }
}

/// Values of one column for the current document.
///
/// `node_lists` holds the owning group's node lists; it is `None` for root
/// columns.
pub fn resolve_column(
    column: &Column,
    node_lists: Option<&[Vec<XNode>]>,
    ctx: &DocumentContext<'_>,
) -> ResolveResult<Vec<String>> {
    match column.kind() {
        SourceKind::Expression => {
            let Some(selector) = column.selector() else {
                return Err(ResolveError::UnimplementedKind {
                    column: column.name().to_string(),
                    kind: column.kind().to_string(),
                });
            };
            let eval = ctx.eval_context();
            let failed = |e| ResolveError::Evaluation {
                owner_kind: "column",
                name: column.name().to_string(),
                expression: column.source().to_string(),
                level: column.level(),
                source: e,
            };

            let Some(lists) = node_lists else {
                let root = XNode::Node(ctx.document().root());
                return Ok(vec![selector.string(&eval, root).map_err(failed)?]);
            };

            let mut values = Vec::new();
            for node in lists.iter().flatten() {
                values.push(selector.string(&eval, *node).map_err(failed)?);
            }
            // A blank row keeps the outer layers alive through the merge
            if values.is_empty() {
                values.push(String::new());
            }
            Ok(values)
        }
        SourceKind::Literal => Ok(vec![column.literal_value(ctx.batch_time())]),
        SourceKind::DynamicAttribute => {
            Err(ResolveError::DynamicInMainPass(column.name().to_string()))
        }
        SourceKind::DynamicElement => Err(ResolveError::UnimplementedKind {
            column: column.name().to_string(),
            kind: column.kind().to_string(),
        }),
    }
}

/// Log evaluation budget overruns where they happen.
fn note_exhaustion(err: ResolveError) -> ResolveError {
    if err.is_resource_exhausted() {
        log_error(format!("Resource limit reached: {}", err));
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::xpath::Selector;
    use chrono::NaiveDate;

    fn time() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn column(name: &str, kind: SourceKind, source: &str, group: Option<GroupId>, seq: usize) -> Arc<Column> {
        let level = if group.is_some() { 1 } else { 0 };
        Arc::new(Column::new(name, kind, source, level, group, seq).unwrap())
    }

    const XML: &str = "<root><id>7</id><item><tag>a</tag><tag>b</tag></item><item><tag>c</tag></item></root>";

    #[test]
    fn test_empty_layer_is_rejected() {
        let err = LayerContainer::new("items", 1, None, &[], false).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyLayer { level: 1, .. }));
    }

    #[test]
    fn test_unresolved_dynamic_layer_is_rejected_when_expanding() {
        let dynamic = Arc::new(
            Column::new("attr", SourceKind::DynamicAttribute, "", 0, None, 0)
                .unwrap()
                .with_attribute_filter(".*")
                .unwrap(),
        );
        assert!(LayerContainer::new("root", 0, None, &[dynamic.clone()], false).is_ok());
        assert!(LayerContainer::new("root", 0, None, &[dynamic], true).is_err());
    }

    #[test]
    fn test_normalize_pads_short_columns() {
        let a = column("a", SourceKind::Literal, "", None, 0);
        let b = column("b", SourceKind::Literal, "", None, 1);
        let mut layer = LayerContainer::new("root", 0, None, &[b.clone(), a.clone()], false).unwrap();
        layer.values = vec![
            vec!["b1".into(), "b2".into(), "b3".into()],
            (1..=5).map(|i| format!("a{}", i)).collect(),
        ];
        layer.normalize();

        let rows = layer.rows();
        assert_eq!(rows.len(), 5);
        // Longest list first
        assert_eq!(rows[0].columns()[0].name(), "a");
        assert_eq!(rows[2].get(&b), "b3");
        assert_eq!(rows[3].get(&b), "");
        assert_eq!(rows[4].get(&a), "a5");
        assert!(rows.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_equal_lengths_order_by_name() {
        let x = column("x", SourceKind::Literal, "1", None, 0);
        let m = column("m", SourceKind::Literal, "2", None, 1);
        let mut layer = LayerContainer::new("root", 0, None, &[x, m], false).unwrap();
        let doc = parse_str("<r/>").unwrap();
        let ctx = DocumentContext::new(&doc, &time());
        layer.process(&SpecTree::new(), &ctx, false).unwrap();
        let names: Vec<&str> = layer.rows()[0].columns().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["m", "x"]);
    }

    #[test]
    fn test_resolve_root_and_grouped_columns() {
        let mut tree = SpecTree::new();
        let items = tree.add_group(None, "items", Selector::compile("root/item").unwrap(), None);
        let tags = tree.add_group(Some(items), "tags", Selector::compile("tag").unwrap(), None);
        tree.add_column(column("id", SourceKind::Expression, "root/id", None, 0));
        tree.add_column(column("stamp", SourceKind::Literal, "batchTime", None, 1));
        tree.add_column(column("tag", SourceKind::Expression, ".", Some(tags), 2));

        let doc = parse_str(XML).unwrap();
        let ctx = DocumentContext::new(&doc, &time());

        let mut root = LayerContainer::new("root", 0, None, tree.root_columns(), false).unwrap();
        root.process(&tree, &ctx, false).unwrap();
        assert_eq!(root.rows().len(), 1);
        assert_eq!(root.rows()[0].values(), &["7".to_string(), "2020-01-01 12:00:00.000".to_string()]);

        let group = tree.group(tags);
        let mut layer = LayerContainer::new("tags", 2, Some(tags), group.columns(), false).unwrap();
        layer.process(&tree, &ctx, true).unwrap();
        let values: Vec<&str> = layer.rows().iter().map(|r| r.values()[0].as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_grouped_column_without_matches_yields_one_blank() {
        let mut tree = SpecTree::new();
        let items = tree.add_group(None, "items", Selector::compile("root/missing").unwrap(), None);
        let col = column("x", SourceKind::Expression, "x", Some(items), 0);
        tree.add_column(col.clone());

        let doc = parse_str(XML).unwrap();
        let ctx = DocumentContext::new(&doc, &time());
        let mut layer = LayerContainer::new("items", 1, Some(items), &[col], false).unwrap();
        layer.process(&tree, &ctx, false).unwrap();
        assert_eq!(layer.rows().len(), 1);
        assert_eq!(layer.rows()[0].values(), &[String::new()]);
    }

    #[test]
    fn test_dynamic_kinds_fail_in_main_pass() {
        let doc = parse_str(XML).unwrap();
        let ctx = DocumentContext::new(&doc, &time());

        let dynamic = Column::new("d", SourceKind::DynamicAttribute, "", 0, None, 0)
            .unwrap()
            .with_attribute_filter("a.*")
            .unwrap();
        assert!(matches!(
            resolve_column(&dynamic, None, &ctx),
            Err(ResolveError::DynamicInMainPass(_))
        ));

        let element = Column::new("e", SourceKind::DynamicElement, "x", 0, None, 1).unwrap();
        assert!(matches!(
            resolve_column(&element, None, &ctx),
            Err(ResolveError::UnimplementedKind { .. })
        ));
    }

    #[test]
    fn test_exhausted_budget_surfaces() {
        let doc = parse_str(XML).unwrap();
        let ctx = DocumentContext::new(&doc, &time()).with_max_eval_nodes(3);
        let col = Column::new("n", SourceKind::Expression, "count(//*)", 0, None, 0).unwrap();
        let err = resolve_column(&col, None, &ctx).unwrap_err();
        assert!(err.is_resource_exhausted());
    }
}
