//! The explode tree.
//!
//! Repeating groups live in an arena indexed by [`GroupId`]; a separate
//! parent table gives each group's ancestor chain without back-pointers.
//! The tree is built once from the specification and never changes.

use std::fmt;
use std::sync::Arc;

use super::column::Column;
use crate::error::{ResolveError, ResolveResult};
use crate::report::log_warning;
use crate::xpath::{EvalContext, Selector, XNode};

/// Stable handle to a repeating group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

impl GroupId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A repeating group ("explode item").
#[derive(Debug)]
pub struct RepeatingGroup {
    name: String,
    level: usize,
    selector: Selector,
    circuit_breaker: Option<usize>,
    columns: Vec<Arc<Column>>,
    children: Vec<GroupId>,
}

impl RepeatingGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Depth in the tree; the root layer is 0, so groups start at 1.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn source(&self) -> &str {
        self.selector.source()
    }

    pub fn circuit_breaker(&self) -> Option<usize> {
        self.circuit_breaker
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }
}

/// Root columns plus the arena of repeating groups for one output table.
#[derive(Debug, Default)]
pub struct SpecTree {
    root_columns: Vec<Arc<Column>>,
    groups: Vec<RepeatingGroup>,
    parents: Vec<Option<GroupId>>,
}

impl SpecTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group under `parent` (or directly under the root).
    pub fn add_group(
        &mut self,
        parent: Option<GroupId>,
        name: impl Into<String>,
        selector: Selector,
        circuit_breaker: Option<usize>,
    ) -> GroupId {
        let id = GroupId(self.groups.len());
        let level = parent.map(|p| self.groups[p.0].level + 1).unwrap_or(1);
        self.groups.push(RepeatingGroup {
            name: name.into(),
            level,
            selector,
            circuit_breaker,
            columns: Vec::new(),
            children: Vec::new(),
        });
        self.parents.push(parent);
        if let Some(p) = parent {
            self.groups[p.0].children.push(id);
        }
        id
    }

    /// Attach a column to its group, or to the root when it has none.
    pub fn add_column(&mut self, column: Arc<Column>) {
        match column.group() {
            Some(g) => self.groups[g.0].columns.push(column),
            None => self.root_columns.push(column),
        }
    }

    pub fn group(&self, id: GroupId) -> &RepeatingGroup {
        &self.groups[id.0]
    }

    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len()).map(GroupId)
    }

    pub fn root_columns(&self) -> &[Arc<Column>] {
        &self.root_columns
    }

    pub fn parent(&self, id: GroupId) -> Option<GroupId> {
        self.parents[id.0]
    }

    /// Group ids from the top-level ancestor down to `id` itself.
    pub fn ancestors(&self, id: GroupId) -> Vec<GroupId> {
        let mut chain = vec![id];
        let mut current = self.parents[id.0];
        while let Some(p) = current {
            chain.push(p);
            current = self.parents[p.0];
        }
        chain.reverse();
        chain
    }

    /// Every declared column: root first, then each group in creation order.
    pub fn all_columns(&self) -> Vec<Arc<Column>> {
        let mut out = self.root_columns.clone();
        for g in &self.groups {
            out.extend(g.columns.iter().cloned());
        }
        out
    }

    /// Node lists reached by walking the ancestor chain of `id` from the
    /// document node, one list per branch, in document order.
    pub fn node_lists(&self, id: GroupId, ctx: &EvalContext<'_>) -> ResolveResult<Vec<Vec<XNode>>> {
        let chain = self.ancestors(id);
        let mut out = Vec::new();
        let start = XNode::Node(ctx.document().root());
        self.descend(&chain, 0, start, ctx, &mut out)?;
        Ok(out)
    }

    /// Node lists for the group that owns `column`.
    pub fn column_node_lists(
        &self,
        column: &Column,
        ctx: &EvalContext<'_>,
    ) -> ResolveResult<Vec<Vec<XNode>>> {
        match column.group() {
            Some(g) => self.node_lists(g, ctx),
            None => Err(ResolveError::NoRepeatingGroup(column.name().to_string())),
        }
    }

    fn descend(
        &self,
        chain: &[GroupId],
        depth: usize,
        node: XNode,
        ctx: &EvalContext<'_>,
        out: &mut Vec<Vec<XNode>>,
    ) -> ResolveResult<()> {
        let group = &self.groups[chain[depth].0];
        let selection = group
            .selector
            .select(ctx, node, group.circuit_breaker)
            .map_err(|e| ResolveError::Evaluation {
                owner_kind: "group",
                name: group.name.clone(),
                expression: group.source().to_string(),
                level: group.level,
                source: e,
            })?;
        if selection.truncated {
            log_warning(format!(
                "Circuit breaker hit for '{}' (level {}): kept the first {} matches of '{}'",
                group.name,
                group.level,
                selection.nodes.len(),
                group.source()
            ));
        }

        if depth + 1 == chain.len() {
            out.push(selection.nodes);
            return Ok(());
        }
        for n in selection.nodes {
            self.descend(chain, depth + 1, n, ctx, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use tokio::sync::broadcast::error::TryRecvError;

    fn tree() -> (SpecTree, GroupId, GroupId) {
        let mut tree = SpecTree::new();
        let items = tree.add_group(None, "items", Selector::compile("root/item").unwrap(), None);
        let tags = tree.add_group(Some(items), "tags", Selector::compile("tag").unwrap(), Some(1));
        (tree, items, tags)
    }

    #[test]
    fn test_levels_and_ancestors() {
        let (tree, items, tags) = tree();
        assert_eq!(tree.group(items).level(), 1);
        assert_eq!(tree.group(tags).level(), 2);
        assert_eq!(tree.ancestors(tags), vec![items, tags]);
        assert_eq!(tree.parent(items), None);
        assert_eq!(tree.group(items).children(), &[tags]);
    }

    #[test]
    fn test_node_lists_per_branch_with_breaker() {
        let (tree, items, tags) = tree();
        let doc = parse_str(
            "<root><item><tag>a</tag><tag>b</tag></item><item/><item><tag>c</tag></item></root>",
        )
        .unwrap();
        let ctx = EvalContext::new(&doc, 10_000);

        let lists = tree.node_lists(items, &ctx).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 3);

        // One list per item; the breaker keeps one tag each
        let lists = tree.node_lists(tags, &ctx).unwrap();
        let sizes: Vec<usize> = lists.iter().map(|l| l.len()).collect();
        assert_eq!(sizes, vec![1, 0, 1]);
    }

    #[test]
    fn test_breaker_hit_is_broadcast() {
        let mut rx = crate::report::LOG_BROADCASTER.subscribe();
        let mut tree = SpecTree::new();
        let rows = tree.add_group(None, "breaker_rows", Selector::compile("//x").unwrap(), Some(2));
        let doc = parse_str("<r><x/><x/><x/><x/></r>").unwrap();
        let ctx = EvalContext::new(&doc, 10_000);
        assert_eq!(tree.node_lists(rows, &ctx).unwrap()[0].len(), 2);

        // Other tests share the broadcaster, so look for our entry
        let mut seen = false;
        loop {
            match rx.try_recv() {
                Ok(entry) if entry.message.contains("breaker_rows") => {
                    assert_eq!(entry.level, crate::report::LogLevel::Warning);
                    seen = true;
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_root_column_has_no_node_lists() {
        let (tree, _, _) = tree();
        let doc = parse_str("<root/>").unwrap();
        let ctx = EvalContext::new(&doc, 100);
        let col = crate::models::Column::new(
            "c",
            crate::models::SourceKind::Expression,
            "x",
            0,
            None,
            0,
        )
        .unwrap();
        assert!(matches!(
            tree.column_node_lists(&col, &ctx),
            Err(ResolveError::NoRepeatingGroup(_))
        ));
    }
}
