//! Read-only XML document model.
//!
//! A parsed document is an arena of nodes addressed by [`NodeId`]. Ids are
//! handed out in document order while parsing, so comparing two ids compares
//! their position in the document, and the descendants of a node occupy the
//! contiguous id range right after it.
//!
//! Documents are never mutated after parsing and are `Send + Sync`, which
//! lets parallel column workers share one instance.

use std::ops::Range;

/// Stable handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in document order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// An attribute as it appeared on its element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node (parent of the root element).
    Document,
    /// An element with its qualified name and attributes in source order.
    Element {
        name: String,
        attributes: Vec<Attribute>,
    },
    /// Character data (text and CDATA sections).
    Text(String),
    /// A comment.
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Exclusive end of this node's subtree id range.
    end: usize,
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.is_element(id))
    }

    /// Total number of nodes (attributes excluded).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified element name (`prefix:local` or `local`).
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Element name with any namespace prefix stripped.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(local_name)
    }

    /// Attributes of an element; empty for any other node.
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// All descendants of `id` in document order (excluding `id`).
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.subtree_range(id).skip(1).map(NodeId)
    }

    fn subtree_range(&self, id: NodeId) -> Range<usize> {
        id.0..self.nodes[id.0].end
    }

    /// Nodes after the end of `id`'s subtree, in document order.
    pub fn following(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (self.nodes[id.0].end..self.nodes.len()).map(NodeId)
    }

    /// Nodes before `id` that are not its ancestors, nearest first.
    pub fn preceding(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (1..id.0)
            .rev()
            .map(NodeId)
            .filter(move |&n| !self.is_ancestor(n, id))
    }

    /// True when `ancestor` contains `node` (strictly).
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor.0 < node.0 && node.0 < self.nodes[ancestor.0].end
    }

    /// The XPath string-value of a node: concatenated descendant text for
    /// documents and elements, the content itself for text and comments.
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::Document | NodeKind::Element { .. } => {
                let mut out = String::new();
                for d in self.descendants(id) {
                    if let NodeKind::Text(t) = &self.nodes[d.0].kind {
                        out.push_str(t);
                    }
                }
                out
            }
        }
    }
}

/// Strip a namespace prefix from a qualified name.
pub fn local_name(qname: &str) -> &str {
    match qname.find(':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

/// Incremental builder used by the parser. Nodes must be opened and closed
/// in document order.
#[derive(Debug)]
pub struct DocumentBuilder {
    nodes: Vec<NodeData>,
    open: Vec<NodeId>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                end: 1,
            }],
            open: vec![NodeId(0)],
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(NodeId(0))
    }

    /// Depth of currently open elements (0 at document level).
    pub fn depth(&self) -> usize {
        self.open.len().saturating_sub(1)
    }

    /// Name of the innermost open element.
    pub fn open_element_name(&self) -> Option<&str> {
        if self.depth() == 0 {
            return None;
        }
        match &self.nodes[self.current().0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let parent = self.current();
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            end: id.0 + 1,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn open_element(&mut self, name: impl Into<String>, attributes: Vec<Attribute>) -> NodeId {
        let id = self.push(NodeKind::Element {
            name: name.into(),
            attributes,
        });
        self.open.push(id);
        id
    }

    pub fn close_element(&mut self) {
        if self.open.len() > 1 {
            if let Some(id) = self.open.pop() {
                self.nodes[id.0].end = self.nodes.len();
            }
        }
    }

    /// Append text, merging with a directly preceding text sibling.
    pub fn text(&mut self, text: &str) {
        let parent = self.current();
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(NodeKind::Text(text.to_string()));
    }

    pub fn comment(&mut self, text: &str) {
        self.push(NodeKind::Comment(text.to_string()));
    }

    pub fn finish(mut self) -> Document {
        while self.open.len() > 1 {
            self.close_element();
        }
        self.nodes[0].end = self.nodes.len();
        Document { nodes: self.nodes }
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut b = DocumentBuilder::new();
        b.open_element(
            "ns:root",
            vec![Attribute {
                name: "id".into(),
                value: "r1".into(),
            }],
        );
        b.open_element("a", vec![]);
        b.text("hello");
        b.text(" world");
        b.close_element();
        b.comment("note");
        b.open_element("b", vec![]);
        b.close_element();
        b.close_element();
        b.finish()
    }

    #[test]
    fn test_document_element_and_names() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        assert_eq!(doc.name(root), Some("ns:root"));
        assert_eq!(doc.local_name(root), Some("root"));
        assert_eq!(doc.attribute(root, "id"), Some("r1"));
        assert_eq!(doc.parent(root), Some(doc.root()));
    }

    #[test]
    fn test_adjacent_text_is_merged() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        let a = doc.children(root)[0];
        assert_eq!(doc.children(a).len(), 1);
        assert_eq!(doc.string_value(a), "hello world");
    }

    #[test]
    fn test_descendants_are_in_document_order() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        let ids: Vec<usize> = doc.descendants(root).map(|n| n.index()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 4); // a, text, comment, b
        assert!(doc.is_ancestor(root, *doc.children(root).last().unwrap()));
    }

    #[test]
    fn test_following_and_preceding() {
        let doc = sample();
        let root = doc.document_element().unwrap();
        let a = doc.children(root)[0];
        let b = *doc.children(root).last().unwrap();
        assert!(doc.following(a).any(|n| n == b));
        assert!(doc.preceding(b).any(|n| n == a));
        assert!(!doc.preceding(b).any(|n| n == root));
    }

    #[test]
    fn test_string_value_skips_comments() {
        let doc = sample();
        assert_eq!(doc.string_value(doc.root()), "hello world");
    }
}
