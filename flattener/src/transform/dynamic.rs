//! Dynamic attribute expansion.
//!
//! Before the main pass, every document is scanned once per dynamic
//! attribute column. Each matching attribute name found on a selected
//! element becomes a resolved expression column on the dynamic column.
//! Resolved sets only grow, so scanning a document twice changes nothing.

use rayon::prelude::*;
use std::sync::Arc;

use super::context::DocumentContext;
use crate::error::{ResolveError, ResolveResult};
use crate::models::{Column, SpecTree};
use crate::report::{log_debug, log_error};
use crate::xpath::{EvalContext, XNode};

/// Expand every dynamic column of `tree` against one document.
///
/// Returns the number of resolved columns added.
pub fn expand_dynamic_columns(
    tree: &SpecTree,
    ctx: &DocumentContext<'_>,
    parallel: bool,
) -> ResolveResult<usize> {
    let dynamic: Vec<Arc<Column>> = tree
        .all_columns()
        .into_iter()
        .filter(|c| c.is_dynamic())
        .collect();

    let counts = if parallel {
        dynamic
            .par_iter()
            .map(|c| expand_column(tree, c, ctx))
            .collect::<ResolveResult<Vec<usize>>>()?
    } else {
        dynamic
            .iter()
            .map(|c| expand_column(tree, c, ctx))
            .collect::<ResolveResult<Vec<usize>>>()?
    };
    Ok(counts.into_iter().sum())
}

/// Expand one dynamic column against one document.
pub fn expand_column(
    tree: &SpecTree,
    column: &Column,
    ctx: &DocumentContext<'_>,
) -> ResolveResult<usize> {
    let Some(selector) = column.selector().filter(|_| column.is_dynamic()) else {
        return Err(ResolveError::NotDynamic(column.name().to_string()));
    };
    let eval = ctx.eval_context();
    let failed = |e| {
        let err = ResolveError::Evaluation {
            owner_kind: "column",
            name: column.name().to_string(),
            expression: column.source().to_string(),
            level: column.level(),
            source: e,
        };
        if err.is_resource_exhausted() {
            log_error(format!("Resource limit reached: {}", err));
        }
        err
    };

    let starts: Vec<XNode> = match column.group() {
        None => vec![XNode::Node(ctx.document().root())],
        Some(_) => tree
            .column_node_lists(column, &eval)?
            .into_iter()
            .flatten()
            .collect(),
    };

    let mut added = 0;
    for start in starts {
        // A blank source selects the start node itself
        let selection = selector.select(&eval, start, None).map_err(failed)?;
        for node in selection.nodes {
            added += add_attributes(column, &eval, node)?;
        }
    }
    Ok(added)
}

fn add_attributes(column: &Column, eval: &EvalContext<'_>, node: XNode) -> ResolveResult<usize> {
    let XNode::Node(id) = node else {
        return Ok(0);
    };
    let doc = eval.document();
    if !doc.is_element(id) {
        return Ok(0);
    }
    let mut added = 0;
    for attribute in doc.attributes(id) {
        if column.accepts_attribute(&attribute.name) && column.add_resolved(&attribute.name)? {
            log_debug(format!(
                "Resolved column '{}_{}' for dynamic column '{}'",
                column.name(),
                attribute.name,
                column.name()
            ));
            added += 1;
        }
    }
    Ok(added)
}
