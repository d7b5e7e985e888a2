//! Declarative template trees parsed from HTML markup.
//!
//! Binding directives are ordinary `data-*` attributes:
//!
//! | Attribute | Node | Effect |
//! |---|---|---|
//! | `data-text="key"` | any element | text content ← leaf |
//! | `data-props="href:link title:name"` | any element | attributes ← leaves |
//! | `data-dataset="playerId:id"` | any element | `data-player-id` ← leaf |
//! | `data-iterate="key"` | `<template>` | one filled clone per collection item |
//! | `data-await="key"` | `<template>` | filled clone inserted once the deferred value settles |
//!
//! A `<template>` without a directive is inert and renders nothing.

use std::sync::Arc;

use scraper::{ElementRef, Html, Node};
use tracing::debug;

use gobracket_shared::{GoBracketError, Result};

const ATTR_TEXT: &str = "data-text";
const ATTR_PROPS: &str = "data-props";
const ATTR_DATASET: &str = "data-dataset";
const ATTR_ITERATE: &str = "data-iterate";
const ATTR_AWAIT: &str = "data-await";

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// A parsed template: the fragment cloned for every render.
#[derive(Debug, Clone)]
pub struct Template {
    fragment: Arc<Fragment>,
}

/// Ordered sibling nodes. Shared between a template and its renders.
#[derive(Debug, Default)]
pub struct Fragment {
    pub nodes: Vec<TemplateNode>,
}

#[derive(Debug)]
pub enum TemplateNode {
    Element(ElementTemplate),
    Text(String),
    Slot(SlotTemplate),
}

/// A regular element plus the leaf bindings attached to it.
#[derive(Debug)]
pub struct ElementTemplate {
    pub name: String,
    /// Static attributes, directive attributes removed.
    pub attrs: Vec<(String, String)>,
    pub bindings: LeafBindings,
    pub children: Vec<TemplateNode>,
}

/// `data-text`, `data-props`, `data-dataset` on one element.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LeafBindings {
    pub text: Option<String>,
    pub props: Vec<PropBinding>,
    pub dataset: Vec<PropBinding>,
}

impl LeafBindings {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.props.is_empty() && self.dataset.is_empty()
    }
}

/// One `target:key` pair of a props or dataset spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropBinding {
    pub target: String,
    pub key: String,
}

/// A `<template data-iterate|data-await>` marker and its content.
#[derive(Debug)]
pub struct SlotTemplate {
    pub directive: SlotDirective,
    pub content: Arc<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotDirective {
    Iterate(String),
    Await(String),
}

impl SlotDirective {
    pub fn key(&self) -> &str {
        match self {
            Self::Iterate(key) | Self::Await(key) => key,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl Template {
    /// Parse `markup` as a fragment; every top-level node becomes template content.
    pub fn parse(markup: &str) -> Result<Self> {
        let html = Html::parse_fragment(markup);
        let nodes = parse_children(html.root_element())?;
        Ok(Self::from_fragment(Fragment { nodes }))
    }

    /// Parse a full page and use the content of `<template id="{id}">`.
    pub fn from_page(markup: &str, id: &str) -> Result<Self> {
        let html = Html::parse_document(markup);

        let element = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "template" && el.value().id() == Some(id))
            .ok_or_else(|| GoBracketError::template(format!("no <template id=\"{id}\"> in page")))?;

        let nodes = parse_children(element)?;
        debug!(id, top_level = nodes.len(), "template extracted from page");
        Ok(Self::from_fragment(Fragment { nodes }))
    }

    pub fn from_fragment(fragment: Fragment) -> Self {
        Self {
            fragment: Arc::new(fragment),
        }
    }

    pub fn fragment(&self) -> &Arc<Fragment> {
        &self.fragment
    }
}

fn parse_children(parent: ElementRef<'_>) -> Result<Vec<TemplateNode>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        match child.value() {
            // A <template>'s content sits under a single fragment node.
            Node::Fragment => {
                for content in child.children() {
                    push_node(content.value(), ElementRef::wrap(content), &mut nodes)?;
                }
            }
            value => push_node(value, ElementRef::wrap(child), &mut nodes)?,
        }
    }
    Ok(nodes)
}

fn push_node(
    value: &Node,
    element: Option<ElementRef<'_>>,
    nodes: &mut Vec<TemplateNode>,
) -> Result<()> {
    match (value, element) {
        (Node::Text(text), _) => nodes.push(TemplateNode::Text(text.to_string())),
        (Node::Element(_), Some(element)) => {
            if let Some(node) = parse_element(element)? {
                nodes.push(node);
            }
        }
        // Comments, doctypes and processing instructions carry no content.
        _ => {}
    }
    Ok(())
}

fn parse_element(element: ElementRef<'_>) -> Result<Option<TemplateNode>> {
    let value = element.value();
    let name = value.name().to_string();

    let iterate = value.attr(ATTR_ITERATE);
    let awaited = value.attr(ATTR_AWAIT);

    let directive = match (iterate, awaited) {
        (Some(_), Some(_)) => {
            return Err(GoBracketError::template(format!(
                "<{name}> carries both {ATTR_ITERATE} and {ATTR_AWAIT}"
            )));
        }
        (Some(key), None) => Some(SlotDirective::Iterate(key.to_string())),
        (None, Some(key)) => Some(SlotDirective::Await(key.to_string())),
        (None, None) => None,
    };

    if name == "template" {
        return match directive {
            Some(directive) => Ok(Some(TemplateNode::Slot(SlotTemplate {
                directive,
                content: Arc::new(Fragment {
                    nodes: parse_children(element)?,
                }),
            }))),
            None => Ok(None),
        };
    }

    if let Some(directive) = directive {
        return Err(GoBracketError::template(format!(
            "{} on <{name}>: slot directives are only allowed on <template>",
            match directive {
                SlotDirective::Iterate(_) => ATTR_ITERATE,
                SlotDirective::Await(_) => ATTR_AWAIT,
            }
        )));
    }

    let bindings = LeafBindings {
        text: value.attr(ATTR_TEXT).map(str::to_string),
        props: value
            .attr(ATTR_PROPS)
            .map(|spec| parse_prop_spec(ATTR_PROPS, spec))
            .transpose()?
            .unwrap_or_default(),
        dataset: value
            .attr(ATTR_DATASET)
            .map(|spec| parse_prop_spec(ATTR_DATASET, spec))
            .transpose()?
            .unwrap_or_default(),
    };

    let attrs = value
        .attrs()
        .filter(|(attr, _)| !matches!(*attr, ATTR_TEXT | ATTR_PROPS | ATTR_DATASET))
        .map(|(attr, val)| (attr.to_string(), val.to_string()))
        .collect();

    Ok(Some(TemplateNode::Element(ElementTemplate {
        name,
        attrs,
        bindings,
        children: parse_children(element)?,
    })))
}

/// Parse a space-separated list of `target:key` pairs.
pub fn parse_prop_spec(attr: &str, spec: &str) -> Result<Vec<PropBinding>> {
    spec.split_whitespace()
        .map(|pair| match pair.split_once(':') {
            Some((target, key)) if !target.is_empty() && !key.is_empty() => Ok(PropBinding {
                target: target.to_string(),
                key: key.to_string(),
            }),
            _ => Err(GoBracketError::template(format!(
                "{attr}: expected 'property:key', got '{pair}'"
            ))),
        })
        .collect()
}
