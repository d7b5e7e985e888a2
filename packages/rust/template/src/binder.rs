//! Recursive template binding.
//!
//! [`fill`] walks a [`Template`] against a [`Scope`] and materializes the
//! synchronous part of the output straight away: leaves and `iterate`
//! collections. Each `await` directive becomes an independent pending task
//! that remembers its marker node; [`Render::next_update`] settles whichever
//! task finishes first, fills a clone of its content with the resolved scope
//! and inserts it after the marker. Branches therefore land in resolution
//! order, not template order.
//!
//! Binding is lenient: a missing or mismatched key never aborts the render.
//! Each one is logged and recorded as a [`BindingIssue`]; only the affected
//! subtree is skipped.

use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use gobracket_shared::Result;

use crate::data::{Binding, Scope, leaf_text};
use crate::document::{Document, NodeId, NodeKind};
use crate::template::{Fragment, LeafBindings, SlotDirective, Template, TemplateNode};

/// Property that targets an element's text rather than an attribute.
const TEXT_CONTENT_PROP: &str = "textContent";

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// The directive that could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Text,
    Prop,
    Dataset,
    Iterate,
    Await,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Key absent from the scope.
    Missing,
    /// Key present with the wrong binding variant.
    Mismatch { found: &'static str },
    /// Deferred value settled with an error.
    Failed(String),
}

/// A binding step that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingIssue {
    pub directive: Directive,
    pub key: String,
    pub kind: IssueKind,
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Outcome of one settled `await` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Marker the clone was inserted after.
    pub marker: NodeId,
    pub key: String,
    /// Top-level nodes of the inserted clone; empty if the branch failed.
    pub inserted: Vec<NodeId>,
}

struct Settled {
    marker: NodeId,
    key: String,
    content: Arc<Fragment>,
    result: Result<Scope>,
}

/// A render in progress: the output so far plus unsettled `await` branches.
pub struct Render {
    document: Document,
    pending: FuturesUnordered<BoxFuture<'static, Settled>>,
    issues: Vec<BindingIssue>,
}

impl std::fmt::Debug for Render {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Render")
            .field("document", &self.document)
            .field("pending", &self.pending.len())
            .field("issues", &self.issues)
            .finish()
    }
}

/// Bind `scope` onto a fresh clone of `template`.
///
/// Returns once the synchronous pass is done; `await` branches are left
/// pending on the returned [`Render`].
#[instrument(skip_all)]
pub fn fill(template: &Template, mut scope: Scope) -> Render {
    let mut render = Render {
        document: Document::new(),
        pending: FuturesUnordered::new(),
        issues: Vec::new(),
    };

    let root = render.document.root();
    render.fill_nodes(root, &template.fragment().nodes, &mut scope);

    debug!(
        pending = render.pending.len(),
        issues = render.issues.len(),
        "initial paint complete"
    );
    render
}

impl Render {
    /// Output rendered so far.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Binding steps skipped so far.
    pub fn issues(&self) -> &[BindingIssue] {
        &self.issues
    }

    /// Unsettled `await` branches.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Settle the next `await` branch to finish and insert its clone.
    ///
    /// Returns `None` once no branches remain. Clones that contain further
    /// `await` directives add new pending branches.
    pub async fn next_update(&mut self) -> Option<Update> {
        let Settled {
            marker,
            key,
            content,
            result,
        } = self.pending.next().await?;

        let inserted = match result {
            Ok(mut scope) => {
                let clones = self.fill_detached(&content, &mut scope);
                if self.document.insert_after(marker, &clones) {
                    clones
                } else {
                    warn!(key, "await marker is detached, branch dropped");
                    Vec::new()
                }
            }
            Err(e) => {
                self.report(Directive::Await, &key, IssueKind::Failed(e.to_string()));
                Vec::new()
            }
        };

        debug!(
            key,
            inserted = inserted.len(),
            remaining = self.pending.len(),
            "await branch settled"
        );

        Some(Update {
            marker,
            key,
            inserted,
        })
    }

    /// Drive every pending branch to completion.
    pub async fn finish(mut self) -> Document {
        while self.next_update().await.is_some() {}
        self.document
    }

    /// Stop here, dropping unsettled branches.
    pub fn into_document(self) -> Document {
        self.document
    }

    // -----------------------------------------------------------------------
    // Recursive fill
    // -----------------------------------------------------------------------

    fn fill_nodes(&mut self, parent: NodeId, nodes: &[TemplateNode], scope: &mut Scope) {
        for node in nodes {
            match node {
                TemplateNode::Text(text) => {
                    self.document.append_child(parent, NodeKind::Text(text.clone()));
                }
                TemplateNode::Element(element) => {
                    let id = self.document.append_child(
                        parent,
                        NodeKind::Element {
                            name: element.name.clone(),
                            attrs: element.attrs.clone(),
                        },
                    );
                    let text_bound = self.apply_leaves(id, &element.bindings, scope);
                    if !text_bound {
                        self.fill_nodes(id, &element.children, scope);
                    }
                }
                TemplateNode::Slot(slot) => {
                    let key = slot.directive.key();
                    let marker = self.document.append_child(
                        parent,
                        NodeKind::Marker {
                            key: key.to_string(),
                        },
                    );
                    match &slot.directive {
                        SlotDirective::Iterate(_) => self.iterate(marker, key, &slot.content, scope),
                        SlotDirective::Await(_) => self.defer(marker, key, &slot.content, scope),
                    }
                }
            }
        }
    }

    /// Fill `content` into a detached container and hand back its top-level nodes.
    fn fill_detached(&mut self, content: &Fragment, scope: &mut Scope) -> Vec<NodeId> {
        let holder = self.document.create(NodeKind::Fragment);
        self.fill_nodes(holder, &content.nodes, scope);
        self.document.take_children(holder)
    }

    fn iterate(&mut self, marker: NodeId, key: &str, content: &Fragment, scope: &Scope) {
        let collection = match scope.get(key) {
            Some(Binding::Collection(collection)) => collection,
            Some(other) => {
                let found = other.kind();
                self.report(Directive::Iterate, key, IssueKind::Mismatch { found });
                return;
            }
            None => {
                self.report(Directive::Iterate, key, IssueKind::Missing);
                return;
            }
        };

        let mut clones = Vec::new();
        for mut child in collection.children() {
            clones.extend(self.fill_detached(content, &mut child));
        }
        if !self.document.insert_after(marker, &clones) {
            warn!(key, "iterate marker is detached, clones dropped");
            return;
        }

        debug!(key, items = collection.len(), "collection expanded");
    }

    fn defer(&mut self, marker: NodeId, key: &str, content: &Arc<Fragment>, scope: &mut Scope) {
        let deferred = match scope.get(key) {
            Some(Binding::Deferred(_)) => match scope.take(key) {
                Some(Binding::Deferred(deferred)) => deferred,
                _ => return,
            },
            Some(other) => {
                let found = other.kind();
                self.report(Directive::Await, key, IssueKind::Mismatch { found });
                return;
            }
            None => {
                debug!(key, "no deferred value, await branch skipped");
                return;
            }
        };

        let key = key.to_string();
        let content = Arc::clone(content);
        self.pending.push(
            async move {
                let result = deferred.into_future().await;
                Settled {
                    marker,
                    key,
                    content,
                    result,
                }
            }
            .boxed(),
        );
    }

    /// Apply `text`, `props` and `dataset`. Returns whether the text content was set.
    fn apply_leaves(&mut self, id: NodeId, bindings: &LeafBindings, scope: &Scope) -> bool {
        let mut text_bound = false;

        if let Some(key) = &bindings.text {
            if let Some(value) = self.leaf(Directive::Text, key, scope) {
                self.document.set_text(id, leaf_text(&value));
                text_bound = true;
            }
        }

        for prop in &bindings.props {
            let Some(value) = self.leaf(Directive::Prop, &prop.key, scope) else {
                continue;
            };
            if prop.target == TEXT_CONTENT_PROP {
                self.document.set_text(id, leaf_text(&value));
                text_bound = true;
            } else {
                self.assign_attr(id, &prop.target, &value);
            }
        }

        for entry in &bindings.dataset {
            if let Some(value) = self.leaf(Directive::Dataset, &entry.key, scope) {
                let attr = format!("data-{}", dataset_attr_name(&entry.target));
                self.assign_attr(id, &attr, &value);
            }
        }

        text_bound
    }

    fn leaf(&mut self, directive: Directive, key: &str, scope: &Scope) -> Option<Value> {
        match scope.get(key) {
            Some(Binding::Leaf(value)) => Some(value.clone()),
            Some(other) => {
                let found = other.kind();
                self.report(directive, key, IssueKind::Mismatch { found });
                None
            }
            None => {
                self.report(directive, key, IssueKind::Missing);
                None
            }
        }
    }

    /// Property semantics: `true` sets an empty attribute, `false`/`null` remove it.
    fn assign_attr(&mut self, id: NodeId, name: &str, value: &Value) {
        match value {
            Value::Bool(false) | Value::Null => self.document.remove_attr(id, name),
            Value::Bool(true) => self.document.set_attr(id, name, String::new()),
            other => self.document.set_attr(id, name, leaf_text(other)),
        }
    }

    fn report(&mut self, directive: Directive, key: &str, kind: IssueKind) {
        warn!(?directive, key, ?kind, "binding skipped");
        self.issues.push(BindingIssue {
            directive,
            key: key.to_string(),
            kind,
        });
    }
}

/// `playerId` → `player-id`, the way dataset keys map onto attributes.
fn dataset_attr_name(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for ch in property.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use gobracket_shared::GoBracketError;
    use tokio::sync::oneshot;

    use crate::data::{Collection, Deferred};

    fn template(markup: &str) -> Template {
        Template::parse(markup).expect("template parses")
    }

    /// A deferred value plus the sender that settles it.
    fn controlled() -> (oneshot::Sender<Scope>, Deferred) {
        let (tx, rx) = oneshot::channel();
        let deferred = Deferred::new(async move {
            rx.await
                .map_err(|_| GoBracketError::validation("sender dropped"))
        });
        (tx, deferred)
    }

    #[test]
    fn text_props_and_dataset_bind_leaves() {
        let t = template(
            r#"<a class="p" data-props="href:link title:name" data-dataset="playerId:id" data-text="name">?</a>"#,
        );
        let scope = Scope::new()
            .leaf("name", "A")
            .leaf("link", "https://online-go.com/player/1")
            .leaf("id", 1);

        let render = fill(&t, scope);

        assert_eq!(
            render.document().to_html(),
            r#"<a class="p" href="https://online-go.com/player/1" title="A" data-player-id="1">A</a>"#
        );
        assert!(render.issues().is_empty());
    }

    #[test]
    fn text_content_prop_and_boolean_props() {
        let t = template(r#"<button data-props="textContent:label disabled:off hidden:on"></button>"#);
        let scope = Scope::new()
            .leaf("label", "Go")
            .leaf("off", false)
            .leaf("on", true);

        let render = fill(&t, scope);
        assert_eq!(render.document().to_html(), r#"<button hidden="">Go</button>"#);
    }

    #[test]
    fn missing_text_key_keeps_template_content() {
        let t = template(r#"<span data-text="nope">fallback</span><b data-text="ok"></b>"#);
        let render = fill(&t, Scope::new().leaf("ok", "yes"));

        assert_eq!(render.document().to_html(), "<span>fallback</span><b>yes</b>");
        assert_eq!(
            render.issues(),
            &[BindingIssue {
                directive: Directive::Text,
                key: "nope".into(),
                kind: IssueKind::Missing,
            }]
        );
    }

    #[test]
    fn iterate_inserts_clones_in_item_order() {
        let t = template(
            r#"<ul><template data-iterate="items"><li data-text="name"></li></template><li>end</li></ul>"#,
        );
        let scope = Scope::new().collection(
            "items",
            Collection::new(vec!["x", "y", "z"], |item| Scope::new().leaf("name", *item)),
        );

        let render = fill(&t, scope);
        let doc = render.document();

        assert_eq!(
            doc.to_html(),
            "<ul><li>x</li><li>y</li><li>z</li><li>end</li></ul>"
        );
        assert_eq!(doc.elements_named("li").len(), 4);
    }

    #[test]
    fn nested_iterate_uses_child_scopes() {
        let t = template(
            r#"<template data-iterate="rounds"><h2 data-text="round"></h2><template data-iterate="games"><p data-text="result"></p></template></template>"#,
        );
        let rounds = vec![(1, vec!["B + 5.5"]), (2, vec!["(7)", "W + R"])];
        let scope = Scope::new().collection(
            "rounds",
            Collection::new(rounds, |(round, games)| {
                Scope::new().leaf("round", *round).collection(
                    "games",
                    Collection::new(games.clone(), |result| Scope::new().leaf("result", *result)),
                )
            }),
        );

        let render = fill(&t, scope);
        assert_eq!(
            render.document().to_html(),
            "<h2>1</h2><p>B + 5.5</p><h2>2</h2><p>(7)</p><p>W + R</p>"
        );
    }

    #[test]
    fn iterate_over_missing_key_renders_siblings() {
        let t = template(
            r#"<p data-text="title"></p><template data-iterate="missing"><li></li></template><p data-text="footer"></p>"#,
        );
        let scope = Scope::new().leaf("title", "T").leaf("footer", "F");

        let render = fill(&t, scope);

        assert_eq!(render.document().to_html(), "<p>T</p><p>F</p>");
        assert_eq!(render.issues().len(), 1);
        assert_eq!(render.issues()[0].directive, Directive::Iterate);
        assert_eq!(render.issues()[0].kind, IssueKind::Missing);
    }

    #[test]
    fn iterate_over_leaf_is_a_mismatch() {
        let t = template(r#"<template data-iterate="items"><li></li></template>"#);
        let render = fill(&t, Scope::new().leaf("items", "not a list"));

        assert_eq!(render.document().to_html(), "");
        assert_eq!(
            render.issues()[0].kind,
            IssueKind::Mismatch { found: "leaf" }
        );
    }

    #[tokio::test]
    async fn await_inserts_after_resolution() {
        let t = template(
            r#"<p>static</p><template data-await="later"><span data-text="greeting"></span></template><p>after</p>"#,
        );
        let (tx, deferred) = controlled();
        let mut render = fill(&t, Scope::new().deferred("later", deferred));

        assert_eq!(render.document().to_html(), "<p>static</p><p>after</p>");
        assert_eq!(render.pending(), 1);

        tx.send(Scope::new().leaf("greeting", "hi")).unwrap();
        let update = render.next_update().await.expect("one update");

        assert_eq!(update.key, "later");
        assert_eq!(update.inserted.len(), 1);
        assert_eq!(
            render.document().to_html(),
            "<p>static</p><span>hi</span><p>after</p>"
        );
        assert!(render.next_update().await.is_none());
    }

    #[tokio::test]
    async fn await_branches_insert_in_resolution_order() {
        let t = template(
            r#"<template data-await="a"><i data-text="v"></i></template><template data-await="b"><b data-text="v"></b></template>"#,
        );
        let (tx_a, a) = controlled();
        let (tx_b, b) = controlled();
        let mut render = fill(&t, Scope::new().deferred("a", a).deferred("b", b));

        tx_b.send(Scope::new().leaf("v", "second")).unwrap();
        let first = render.next_update().await.unwrap();
        assert_eq!(first.key, "b");
        assert_eq!(render.document().to_html(), "<b>second</b>");

        tx_a.send(Scope::new().leaf("v", "first")).unwrap();
        let second = render.next_update().await.unwrap();
        assert_eq!(second.key, "a");

        // Positions follow the markers even though arrival order did not.
        assert_eq!(render.document().to_html(), "<i>first</i><b>second</b>");
    }

    #[tokio::test]
    async fn absent_await_key_is_skipped_silently() {
        let t = template(r#"<template data-await="later"><p>x</p></template><p>ok</p>"#);
        let render = fill(&t, Scope::new());

        assert_eq!(render.pending(), 0);
        assert!(render.issues().is_empty());
        assert_eq!(render.finish().await.to_html(), "<p>ok</p>");
    }

    #[tokio::test]
    async fn failed_deferred_leaves_branch_empty() {
        let t = template(r#"<template data-await="later"><p>x</p></template><p>ok</p>"#);
        let failing = Deferred::new(async { Err(GoBracketError::Network("boom".into())) });
        let mut render = fill(&t, Scope::new().deferred("later", failing));

        let update = render.next_update().await.unwrap();
        assert!(update.inserted.is_empty());
        assert!(matches!(render.issues()[0].kind, IssueKind::Failed(_)));
        assert_eq!(render.document().to_html(), "<p>ok</p>");
    }

    #[tokio::test]
    async fn deferred_clone_may_contain_iterate_and_await() {
        let t = template(
            r#"<ul><template data-iterate="rounds"><li><template data-await="detail"><span data-text="games"></span></template></li></template></ul>"#,
        );
        let scope = Scope::new().collection(
            "rounds",
            Collection::new(vec![3, 1], |games| {
                Scope::new().deferred("detail", Deferred::ready(Scope::new().leaf("games", *games)))
            }),
        );

        let render = fill(&t, scope);
        assert_eq!(render.pending(), 2);
        assert_eq!(render.document().to_html(), "<ul><li></li><li></li></ul>");

        let doc = render.finish().await;
        assert_eq!(
            doc.to_html(),
            "<ul><li><span>3</span></li><li><span>1</span></li></ul>"
        );
    }

    #[test]
    fn dataset_names_are_kebab_cased() {
        assert_eq!(dataset_attr_name("playerId"), "player-id");
        assert_eq!(dataset_attr_name("round"), "round");
    }

    #[test]
    fn one_collection_feeds_two_iterates() {
        let t = template(
            r#"<ol><template data-iterate="players"><li data-text="name"></li></template></ol><ul><template data-iterate="players"><li data-text="name"></li></template></ul>"#,
        );
        let scope = Scope::new().collection(
            "players",
            Collection::new(vec!["a", "b"], |name| Scope::new().leaf("name", *name)),
        );

        let render = fill(&t, scope);

        assert_eq!(
            render.document().to_html(),
            "<ol><li>a</li><li>b</li></ol><ul><li>a</li><li>b</li></ul>"
        );
        assert!(render.issues().is_empty());
    }
}
