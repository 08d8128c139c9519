//! Selection expressions.
//!
//! Column and group sources are XPath 1.0 expressions. They are compiled once
//! when the specification loads and evaluated per document. Two shapes that
//! dominate real specifications skip the general evaluator entirely:
//!
//! - a plain element name (`item`) walks the direct children
//! - a two-step name path (`items/item`) walks two levels of children
//!
//! Both fast paths produce exactly the nodes the general evaluator would.
//!
//! # Example
//!
//! ```
//! use xmlflat::parser::parse_str;
//! use xmlflat::xpath::{EvalContext, Selector, XNode};
//!
//! let doc = parse_str("<r><item>a</item><item>b</item></r>").unwrap();
//! let ctx = EvalContext::new(&doc, 1_000);
//! let root = XNode::Node(doc.document_element().unwrap());
//!
//! let items = Selector::compile("item").unwrap();
//! assert_eq!(items.select(&ctx, root, None).unwrap().nodes.len(), 2);
//!
//! let last = Selector::compile("item[last()]").unwrap();
//! assert_eq!(last.string(&ctx, root).unwrap(), "b");
//! ```

pub mod ast;
pub mod eval;
mod functions;
pub mod lexer;

pub use ast::Expr;
pub use eval::{EvalContext, Value, Variables, XNode};

use crate::error::{XPathError, XPathResult};
use eval::name_matches;
use lexer::{is_name_char, is_name_start};

/// Default node-visit budget for one evaluation context.
pub const DEFAULT_MAX_EVAL_NODES: usize = 50_000_000;

/// Structural class of an expression, decided at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Blank source: the context node itself.
    Empty,
    /// `name`
    SingleLevel(String),
    /// `outer/inner`
    TwoLevel(String, String),
    General,
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

fn is_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(s),
    }
}

/// Classify a source expression.
pub fn classify(source: &str) -> Shape {
    let s = source.trim();
    if s.is_empty() {
        return Shape::Empty;
    }
    if is_qname(s) {
        return Shape::SingleLevel(s.to_string());
    }
    if let Some((outer, inner)) = s.split_once('/') {
        if is_qname(outer) && is_qname(inner) {
            return Shape::TwoLevel(outer.to_string(), inner.to_string());
        }
    }
    Shape::General
}

/// Nodes chosen by a selector, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub nodes: Vec<XNode>,
    /// True when a circuit breaker dropped matches.
    pub truncated: bool,
}

/// A compiled selection expression.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    shape: Shape,
    expr: Expr,
}

impl Selector {
    pub fn compile(source: &str) -> XPathResult<Self> {
        Ok(Self {
            source: source.to_string(),
            shape: classify(source),
            expr: ast::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_empty(&self) -> bool {
        self.shape == Shape::Empty
    }

    /// Select nodes from `node`, keeping at most `limit` of them.
    ///
    /// For two-level paths the limit applies to the outer step only.
    pub fn select(
        &self,
        ctx: &EvalContext<'_>,
        node: XNode,
        limit: Option<usize>,
    ) -> XPathResult<Selection> {
        match &self.shape {
            Shape::Empty => Ok(Selection {
                nodes: vec![node],
                truncated: false,
            }),
            Shape::SingleLevel(name) => children_named(ctx, node, name, limit),
            Shape::TwoLevel(outer, inner) => {
                let parents = children_named(ctx, node, outer, limit)?;
                let mut nodes = Vec::new();
                for parent in parents.nodes {
                    nodes.extend(children_named(ctx, parent, inner, None)?.nodes);
                }
                Ok(Selection {
                    nodes,
                    truncated: parents.truncated,
                })
            }
            Shape::General => {
                let mut nodes = self.select_general(ctx, node)?;
                let truncated = match limit {
                    Some(max) if nodes.len() > max => {
                        nodes.truncate(max);
                        true
                    }
                    _ => false,
                };
                Ok(Selection { nodes, truncated })
            }
        }
    }

    /// Select through the general evaluator regardless of shape.
    pub fn select_general(&self, ctx: &EvalContext<'_>, node: XNode) -> XPathResult<Vec<XNode>> {
        match ctx.evaluate(&self.expr, node)? {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(XPathError::eval(format!(
                "'{}' evaluates to {} instead of a node-set",
                self.source,
                ctx.string(&other)
            ))),
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>, node: XNode) -> XPathResult<Value> {
        ctx.evaluate(&self.expr, node)
    }

    /// String value of the result, trimmed.
    pub fn string(&self, ctx: &EvalContext<'_>, node: XNode) -> XPathResult<String> {
        let value = self.evaluate(ctx, node)?;
        Ok(ctx.string(&value).trim().to_string())
    }
}

/// Element children of `node` matching `name`, up to `limit`.
fn children_named(
    ctx: &EvalContext<'_>,
    node: XNode,
    name: &str,
    limit: Option<usize>,
) -> XPathResult<Selection> {
    let id = match node {
        XNode::Node(id) => id,
        XNode::Attr(..) => return Ok(Selection::default()),
    };
    let doc = ctx.document();
    let children = doc.children(id);
    ctx.tick(children.len())?;

    let mut selection = Selection::default();
    for &child in children {
        let matched = doc.name(child).map(|n| name_matches(name, n)).unwrap_or(false);
        if !matched {
            continue;
        }
        if limit.map(|max| selection.nodes.len() >= max).unwrap_or(false) {
            selection.truncated = true;
            break;
        }
        selection.nodes.push(XNode::Node(child));
    }
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use proptest::prelude::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), Shape::Empty);
        assert_eq!(classify(" item "), Shape::SingleLevel("item".into()));
        assert_eq!(classify("ns:item"), Shape::SingleLevel("ns:item".into()));
        assert_eq!(
            classify("items/item"),
            Shape::TwoLevel("items".into(), "item".into())
        );
        assert_eq!(classify("a/b/c"), Shape::General);
        assert_eq!(classify("item[1]"), Shape::General);
        assert_eq!(classify("@id"), Shape::General);
        assert_eq!(classify("/root"), Shape::General);
        assert_eq!(classify("text()"), Shape::General);
        assert_eq!(classify("a | b"), Shape::General);
    }

    #[test]
    fn test_circuit_breaker_caps_matches() {
        let doc = parse_str("<r><x/><i/><i/><x/><i/><i/><i/></r>").unwrap();
        let ctx = EvalContext::new(&doc, 1_000);
        let root = XNode::Node(doc.document_element().unwrap());

        let sel = Selector::compile("i").unwrap();
        let capped = sel.select(&ctx, root, Some(3)).unwrap();
        assert_eq!(capped.nodes.len(), 3);
        assert!(capped.truncated);

        let exact = sel.select(&ctx, root, Some(5)).unwrap();
        assert_eq!(exact.nodes.len(), 5);
        assert!(!exact.truncated);

        let general = Selector::compile("i[true()]").unwrap();
        let capped = general.select(&ctx, root, Some(2)).unwrap();
        assert_eq!(capped.nodes.len(), 2);
        assert!(capped.truncated);
    }

    #[test]
    fn test_two_level_breaker_applies_to_outer_step() {
        let doc = parse_str("<r><g><i/><i/></g><g><i/></g><g><i/></g></r>").unwrap();
        let ctx = EvalContext::new(&doc, 1_000);
        let root = XNode::Node(doc.document_element().unwrap());
        let sel = Selector::compile("g/i").unwrap();
        let s = sel.select(&ctx, root, Some(2)).unwrap();
        assert_eq!(s.nodes.len(), 3);
        assert!(s.truncated);
    }

    #[test]
    fn test_empty_selector_is_identity() {
        let doc = parse_str("<r a=\"1\"/>").unwrap();
        let ctx = EvalContext::new(&doc, 1_000);
        let root = XNode::Node(doc.document_element().unwrap());
        let sel = Selector::compile("").unwrap();
        assert_eq!(sel.select(&ctx, root, None).unwrap().nodes, vec![root]);
    }

    #[test]
    fn test_string_is_trimmed() {
        let doc = parse_str("<r><v>\n  42 \n</v></r>").unwrap();
        let ctx = EvalContext::new(&doc, 1_000);
        let root = XNode::Node(doc.document_element().unwrap());
        assert_eq!(Selector::compile("v").unwrap().string(&ctx, root).unwrap(), "42");
        assert_eq!(Selector::compile("missing").unwrap().string(&ctx, root).unwrap(), "");
    }

    #[test]
    fn test_scalar_result_is_not_a_selection() {
        let doc = parse_str("<r/>").unwrap();
        let ctx = EvalContext::new(&doc, 1_000);
        let sel = Selector::compile("count(*)").unwrap();
        assert!(sel.select(&ctx, XNode::Node(doc.root()), None).is_err());
    }

    const NAMES: [&str; 4] = ["a", "b", "p:a", "p:b"];

    /// Serialize a random tree: entry `i` becomes node `i + 1`, attached to
    /// an earlier node picked by its second field.
    fn build_xml(shape: &[(usize, usize)]) -> String {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); shape.len() + 1];
        for (i, &(_, parent)) in shape.iter().enumerate() {
            children[parent % (i + 1)].push(i + 1);
        }

        fn write(node: usize, shape: &[(usize, usize)], children: &[Vec<usize>], out: &mut String) {
            let name = if node == 0 {
                "root"
            } else {
                NAMES[shape[node - 1].0]
            };
            if node == 0 {
                out.push_str("<root xmlns:p=\"urn:p\">");
            } else {
                out.push_str(&format!("<{}>", name));
            }
            for &c in &children[node] {
                write(c, shape, children, out);
            }
            out.push_str(&format!("</{}>", name));
        }

        let mut out = String::new();
        write(0, shape, &children, &mut out);
        out
    }

    proptest! {
        #[test]
        fn prop_fast_paths_match_general_evaluator(
            shape in prop::collection::vec((0usize..4, 0usize..64), 0..40),
            first in 0usize..5,
            second in prop::option::of(0usize..5),
        ) {
            let candidates = ["a", "b", "p:a", "p:b", "c"];
            let expr = match second {
                Some(s) => format!("{}/{}", candidates[first], candidates[s]),
                None => candidates[first].to_string(),
            };
            let xml = build_xml(&shape);
            let doc = parse_str(&xml).unwrap();
            let ctx = EvalContext::new(&doc, 1_000_000);
            let selector = Selector::compile(&expr).unwrap();
            prop_assert_ne!(selector.shape(), &Shape::General);

            let mut contexts = vec![XNode::Node(doc.root())];
            contexts.extend(doc.descendants(doc.root()).map(XNode::Node));
            for node in contexts {
                let fast = selector.select(&ctx, node, None).unwrap().nodes;
                let general = selector.select_general(&ctx, node).unwrap();
                prop_assert_eq!(fast, general);
            }
        }
    }
}
