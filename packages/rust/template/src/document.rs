//! Arena of rendered output nodes.
//!
//! Nodes are addressed by [`NodeId`] so a deferred branch can hold on to its
//! insertion point while the rest of the render carries on. Slot markers
//! stay in the arena as anchors and serialize to nothing.

use std::fmt::Write as _;

/// Index of a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Root or detached container; serializes its children only.
    Fragment,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    /// Insertion anchor left where an `iterate`/`await` template stood.
    Marker { key: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Fragment,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a node with no parent.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.create(kind);
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Detach and return all children of `parent`.
    pub fn take_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.nodes[parent.0].children);
        for child in &children {
            self.nodes[child.0].parent = None;
        }
        children
    }

    /// Insert `nodes` as siblings immediately after `anchor`, keeping their order.
    ///
    /// Returns `false` (and inserts nothing) if `anchor` has no parent.
    pub fn insert_after(&mut self, anchor: NodeId, nodes: &[NodeId]) -> bool {
        let Some(parent) = self.nodes[anchor.0].parent else {
            return false;
        };

        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|child| *child == anchor)
            .map_or(self.nodes[parent.0].children.len(), |i| i + 1);

        for node in nodes {
            self.nodes[node.0].parent = Some(parent);
        }
        self.nodes[parent.0]
            .children
            .splice(position..position, nodes.iter().copied());
        true
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

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: String) {
        self.take_children(id);
        self.append_child(id, NodeKind::Text(text));
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: String) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            match attrs.iter_mut().find(|(attr, _)| attr == name) {
                Some((_, existing)) => *existing = value,
                None => attrs.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.retain(|(attr, _)| attr != name);
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(attr, _)| attr == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Attached elements named `name`, in document order.
    pub fn elements_named(&self, name: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(self.root(), &mut |doc, id| {
            if matches!(doc.kind(id), NodeKind::Element { name: n, .. } if n == name) {
                found.push(id);
            }
        });
        found
    }

    fn walk(&self, id: NodeId, visit: &mut impl FnMut(&Self, NodeId)) {
        visit(self, id);
        for child in &self.nodes[id.0].children {
            self.walk(*child, visit);
        }
    }

    /// Serialize everything attached to the root.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_children(self.root(), &mut out);
        out
    }

    /// Serialize one node and its subtree.
    pub fn node_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_children(&self, id: NodeId, out: &mut String) {
        for child in &self.nodes[id.0].children {
            self.write_node(*child, out);
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Fragment => self.write_children(id, out),
            NodeKind::Marker { .. } => {}
            NodeKind::Text(text) => escape_into(text, false, out),
            NodeKind::Element { name, attrs } => {
                let _ = write!(out, "<{name}");
                for (attr, value) in attrs {
                    let _ = write!(out, " {attr}=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    return;
                }
                self.write_children(id, out);
                let _ = write!(out, "</{name}>");
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
