//! Tree-walking evaluator for compiled expressions.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::ast::{ArithOp, Axis, CompareOp, Expr, NodeTest, Step};
use super::functions;
use crate::document::{Document, NodeId, NodeKind};
use crate::error::{XPathError, XPathResult};

/// Scalars bound to `$name` references.
pub type Variables = HashMap<String, String>;

/// A node as seen by expressions: a tree node or one attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    Node(NodeId),
    Attr(NodeId, usize),
}

impl XNode {
    /// Sort key in document order; attributes sit between their element and
    /// its first child.
    fn order_key(self) -> (usize, usize) {
        match self {
            XNode::Node(id) => (id.index(), 0),
            XNode::Attr(id, i) => (id.index(), i + 1),
        }
    }

    /// The element or tree node, when this is not an attribute.
    pub fn node_id(self) -> Option<NodeId> {
        match self {
            XNode::Node(id) => Some(id),
            XNode::Attr(..) => None,
        }
    }
}

impl PartialOrd for XNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Node-set in document order, without duplicates.
    Nodes(Vec<XNode>),
    Str(String),
    Num(f64),
    Bool(bool),
}

/// Name test shared by the general evaluator and the structural fast paths:
/// a prefixed test matches the full qualified name, an unprefixed one the
/// local name.
pub(crate) fn name_matches(test: &str, qname: &str) -> bool {
    if test.contains(':') {
        test == qname
    } else {
        crate::document::local_name(qname) == test
    }
}

/// Context position and size while evaluating predicates.
#[derive(Debug, Clone, Copy)]
pub(super) struct Focus {
    pub node: XNode,
    pub position: usize,
    pub size: usize,
}

impl Focus {
    fn single(node: XNode) -> Self {
        Focus {
            node,
            position: 1,
            size: 1,
        }
    }
}

/// Evaluation state for one document.
///
/// Every node an axis produces counts against the visit budget; once it is
/// spent, evaluation stops with [`XPathError::ResourceExhausted`].
pub struct EvalContext<'a> {
    doc: &'a Document,
    vars: Option<&'a Variables>,
    visited: Cell<usize>,
    limit: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(doc: &'a Document, limit: usize) -> Self {
        Self {
            doc,
            vars: None,
            visited: Cell::new(0),
            limit,
        }
    }

    pub fn with_variables(mut self, vars: &'a Variables) -> Self {
        self.vars = Some(vars);
        self
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Nodes visited so far.
    pub fn visited(&self) -> usize {
        self.visited.get()
    }

    pub(crate) fn tick(&self, n: usize) -> XPathResult<()> {
        let total = self.visited.get().saturating_add(n);
        self.visited.set(total);
        if total > self.limit {
            return Err(XPathError::ResourceExhausted { limit: self.limit });
        }
        Ok(())
    }

    /// Evaluate `expr` with `node` as the context node.
    pub fn evaluate(&self, expr: &Expr, node: XNode) -> XPathResult<Value> {
        self.eval(expr, &Focus::single(node))
    }

    pub(super) fn eval(&self, expr: &Expr, focus: &Focus) -> XPathResult<Value> {
        match expr {
            Expr::Empty => Ok(Value::Nodes(vec![focus.node])),
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Variable(name) => self
                .vars
                .and_then(|v| v.get(name))
                .map(|s| Value::Str(s.clone()))
                .ok_or_else(|| XPathError::eval(format!("unknown variable '${}'", name))),
            Expr::Or(l, r) => {
                if self.boolean(&self.eval(l, focus)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.boolean(&self.eval(r, focus)?)))
            }
            Expr::And(l, r) => {
                if !self.boolean(&self.eval(l, focus)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.boolean(&self.eval(r, focus)?)))
            }
            Expr::Compare(op, l, r) => {
                let left = self.eval(l, focus)?;
                let right = self.eval(r, focus)?;
                Ok(Value::Bool(self.compare(*op, &left, &right)))
            }
            Expr::Arith(op, l, r) => {
                let a = self.number(&self.eval(l, focus)?);
                let b = self.number(&self.eval(r, focus)?);
                Ok(Value::Num(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Num(-self.number(&self.eval(inner, focus)?))),
            Expr::Union(l, r) => {
                let mut nodes = self.node_set(self.eval(l, focus)?, "|")?;
                nodes.extend(self.node_set(self.eval(r, focus)?, "|")?);
                sort_unique(&mut nodes);
                Ok(Value::Nodes(nodes))
            }
            Expr::Function(name, args) => functions::call(self, focus, name, args),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    XNode::Node(self.doc.root())
                } else {
                    focus.node
                };
                let mut nodes = vec![start];
                for step in steps {
                    nodes = self.apply_step(&nodes, step)?;
                }
                Ok(Value::Nodes(nodes))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.node_set(self.eval(primary, focus)?, "a filter")?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                for step in steps {
                    nodes = self.apply_step(&nodes, step)?;
                }
                Ok(Value::Nodes(nodes))
            }
        }
    }

    pub(super) fn node_set(&self, value: Value, usage: &str) -> XPathResult<Vec<XNode>> {
        match value {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(XPathError::eval(format!(
                "{} requires a node-set, got {}",
                usage,
                type_name(&other)
            ))),
        }
    }

    fn apply_step(&self, input: &[XNode], step: &Step) -> XPathResult<Vec<XNode>> {
        let mut out = Vec::new();
        for &ctx in input {
            let candidates = self.axis(ctx, step.axis, &step.test)?;
            let mut selected = candidates;
            for predicate in &step.predicates {
                selected = self.filter(selected, predicate)?;
            }
            out.extend(selected);
        }
        if input.len() > 1 || step.axis.is_reverse() {
            sort_unique(&mut out);
        }
        Ok(out)
    }

    /// Keep the nodes for which `predicate` holds; positions follow the
    /// order of `nodes`.
    fn filter(&self, nodes: Vec<XNode>, predicate: &Expr) -> XPathResult<Vec<XNode>> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, &focus)? {
                Value::Num(n) => n == (i + 1) as f64,
                other => self.boolean(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes on `axis` from `ctx` that pass `test`, in axis order.
    fn axis(&self, ctx: XNode, axis: Axis, test: &NodeTest) -> XPathResult<Vec<XNode>> {
        let doc = self.doc;
        let raw: Vec<XNode> = match (axis, ctx) {
            (Axis::Attribute, XNode::Node(id)) => (0..doc.attributes(id).len())
                .map(|i| XNode::Attr(id, i))
                .collect(),
            (Axis::Attribute, XNode::Attr(..)) => Vec::new(),
            (Axis::SelfAxis, _) => vec![ctx],
            (Axis::Child, XNode::Node(id)) => {
                doc.children(id).iter().map(|&c| XNode::Node(c)).collect()
            }
            (Axis::Descendant, XNode::Node(id)) => doc.descendants(id).map(XNode::Node).collect(),
            (Axis::DescendantOrSelf, XNode::Node(id)) => std::iter::once(id)
                .chain(doc.descendants(id))
                .map(XNode::Node)
                .collect(),
            (Axis::DescendantOrSelf, XNode::Attr(..)) => vec![ctx],
            (Axis::Child | Axis::Descendant, XNode::Attr(..)) => Vec::new(),
            (Axis::Parent, _) => self.parent(ctx).into_iter().collect(),
            (Axis::Ancestor, _) => self.ancestors(ctx),
            (Axis::AncestorOrSelf, _) => {
                let mut v = vec![ctx];
                v.extend(self.ancestors(ctx));
                v
            }
            (Axis::FollowingSibling, XNode::Node(id)) => self
                .siblings(id)
                .iter()
                .filter(|&&s| s > id)
                .map(|&s| XNode::Node(s))
                .collect(),
            (Axis::PrecedingSibling, XNode::Node(id)) => self
                .siblings(id)
                .iter()
                .rev()
                .filter(|&&s| s < id)
                .map(|&s| XNode::Node(s))
                .collect(),
            (Axis::FollowingSibling | Axis::PrecedingSibling, XNode::Attr(..)) => Vec::new(),
            (Axis::Following, XNode::Node(id)) => doc.following(id).map(XNode::Node).collect(),
            (Axis::Following, XNode::Attr(owner, _)) => doc
                .descendants(owner)
                .chain(doc.following(owner))
                .map(XNode::Node)
                .collect(),
            (Axis::Preceding, XNode::Node(id)) => doc.preceding(id).map(XNode::Node).collect(),
            (Axis::Preceding, XNode::Attr(owner, _)) => {
                doc.preceding(owner).map(XNode::Node).collect()
            }
        };
        self.tick(raw.len())?;

        let attribute_axis = axis == Axis::Attribute;
        Ok(raw
            .into_iter()
            .filter(|&n| self.matches(n, test, attribute_axis))
            .collect())
    }

    fn siblings(&self, id: NodeId) -> &'a [NodeId] {
        match self.doc.parent(id) {
            Some(p) => self.doc.children(p),
            None => &[],
        }
    }

    fn parent(&self, node: XNode) -> Option<XNode> {
        match node {
            XNode::Attr(owner, _) => Some(XNode::Node(owner)),
            XNode::Node(id) => self.doc.parent(id).map(XNode::Node),
        }
    }

    fn ancestors(&self, node: XNode) -> Vec<XNode> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(n) = current {
            out.push(n);
            current = self.parent(n);
        }
        out
    }

    fn matches(&self, node: XNode, test: &NodeTest, attribute_axis: bool) -> bool {
        match node {
            XNode::Attr(owner, i) => {
                let name = match self.doc.attributes(owner).get(i) {
                    Some(a) => a.name.as_str(),
                    None => return false,
                };
                match test {
                    NodeTest::Name(n) => attribute_axis && name_matches(n, name),
                    NodeTest::Wildcard => attribute_axis,
                    NodeTest::PrefixWildcard(p) => attribute_axis && has_prefix(name, p),
                    NodeTest::Node => true,
                    NodeTest::Text | NodeTest::Comment => false,
                }
            }
            XNode::Node(id) => match (test, self.doc.kind(id)) {
                (NodeTest::Node, _) => true,
                (NodeTest::Text, NodeKind::Text(_)) => true,
                (NodeTest::Comment, NodeKind::Comment(_)) => true,
                (NodeTest::Name(n), NodeKind::Element { name, .. }) => {
                    !attribute_axis && name_matches(n, name)
                }
                (NodeTest::Wildcard, NodeKind::Element { .. }) => !attribute_axis,
                (NodeTest::PrefixWildcard(p), NodeKind::Element { name, .. }) => {
                    !attribute_axis && has_prefix(name, p)
                }
                _ => false,
            },
        }
    }

    /// XPath string-value of a single node.
    pub fn node_string(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self.doc.string_value(id),
            XNode::Attr(owner, i) => self
                .doc
                .attributes(owner)
                .get(i)
                .map(|a| a.value.clone())
                .unwrap_or_default(),
        }
    }

    /// Qualified name of an element or attribute; empty otherwise.
    pub fn node_name(&self, node: XNode) -> &'a str {
        match node {
            XNode::Node(id) => self.doc.name(id).unwrap_or(""),
            XNode::Attr(owner, i) => self
                .doc
                .attributes(owner)
                .get(i)
                .map(|a| a.name.as_str())
                .unwrap_or(""),
        }
    }

    pub fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&n| self.node_string(n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => number_to_string(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    pub fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => string_to_number(&self.string(other)),
        }
    }

    pub fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(a), Value::Nodes(b)) => {
                let rights: Vec<String> = b.iter().map(|&n| self.node_string(n)).collect();
                a.iter().any(|&n| {
                    let l = self.node_string(n);
                    rights.iter().any(|r| compare_strings(op, &l, r))
                })
            }
            (Value::Nodes(nodes), other) => self.compare_node_set(op, nodes, other),
            (other, Value::Nodes(nodes)) => self.compare_node_set(op.flipped(), nodes, other),
            (a, b) => self.compare_atomic(op, a, b),
        }
    }

    fn compare_node_set(&self, op: CompareOp, nodes: &[XNode], other: &Value) -> bool {
        match other {
            Value::Bool(b) => compare_values(op, !nodes.is_empty(), *b),
            Value::Num(n) => nodes
                .iter()
                .any(|&node| compare_numbers(op, string_to_number(&self.node_string(node)), *n)),
            Value::Str(s) => nodes
                .iter()
                .any(|&node| compare_strings(op, &self.node_string(node), s)),
            Value::Nodes(_) => false,
        }
    }

    fn compare_atomic(&self, op: CompareOp, a: &Value, b: &Value) -> bool {
        match op {
            CompareOp::Eq | CompareOp::Neq => {
                if matches!(a, Value::Bool(_)) || matches!(b, Value::Bool(_)) {
                    compare_values(op, self.boolean(a), self.boolean(b))
                } else if matches!(a, Value::Num(_)) || matches!(b, Value::Num(_)) {
                    compare_numbers(op, self.number(a), self.number(b))
                } else {
                    compare_values(op, self.string(a), self.string(b))
                }
            }
            _ => compare_numbers(op, self.number(a), self.number(b)),
        }
    }
}

fn has_prefix(qname: &str, prefix: &str) -> bool {
    qname
        .split_once(':')
        .map(|(p, _)| p == prefix)
        .unwrap_or(false)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nodes(_) => "node-set",
        Value::Str(_) => "string",
        Value::Num(_) => "number",
        Value::Bool(_) => "boolean",
    }
}

pub(super) fn sort_unique(nodes: &mut Vec<XNode>) {
    nodes.sort();
    nodes.dedup();
}

fn compare_values<T: PartialEq>(op: CompareOp, a: T, b: T) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Neq => a != b,
        // Relational operators never reach here with non-numbers
        _ => false,
    }
}

fn compare_strings(op: CompareOp, a: &str, b: &str) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Neq => a != b,
        _ => compare_numbers(op, string_to_number(a), string_to_number(b)),
    }
}

fn compare_numbers(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Neq => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

/// XPath `number()` of a string: optional minus sign, digits and at most
/// one decimal point, surrounded by whitespace. Anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    let digits = t.strip_prefix('-').unwrap_or(t);
    let valid = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1;
    if !valid {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

/// XPath `string()` of a number.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
