//! The data tree bound onto a template.
//!
//! A [`Scope`] maps keys named by template directives to [`Binding`]s. The
//! binding's variant must match the directive: leaves feed `text`, `props`
//! and `dataset`; collections feed `iterate`; deferred values feed `await`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use gobracket_shared::Result;

/// One bound value.
pub enum Binding {
    Leaf(Value),
    Collection(Collection),
    Deferred(Deferred),
}

impl Binding {
    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::Collection(_) => "collection",
            Self::Deferred(_) => "deferred",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(value) => f.debug_tuple("Leaf").field(value).finish(),
            Self::Collection(c) => c.fmt(f),
            Self::Deferred(d) => d.fmt(f),
        }
    }
}

/// Ordered items plus the mapping from item to child scope.
///
/// The mapping runs lazily, once per item, in item order, each time the
/// binder fills the collection. Binding reads a collection without consuming
/// it, so the same key may feed several `iterate` nodes.
#[derive(Clone)]
pub struct Collection {
    len: usize,
    child_at: Arc<dyn Fn(usize) -> Scope + Send + Sync>,
}

impl Collection {
    pub fn new<I, F>(items: Vec<I>, child_data: F) -> Self
    where
        I: Send + Sync + 'static,
        F: Fn(&I) -> Scope + Send + Sync + 'static,
    {
        let items: Arc<[I]> = items.into();
        Self {
            len: items.len(),
            child_at: Arc::new(move |index| child_data(&items[index])),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Child scopes in item order, built as the iterator advances.
    pub(crate) fn children(&self) -> impl Iterator<Item = Scope> + '_ {
        (0..self.len).map(|index| (self.child_at)(index))
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("len", &self.len).finish()
    }
}

/// A scope that arrives later. Resolves exactly once.
pub struct Deferred {
    pending: BoxFuture<'static, Result<Scope>>,
}

impl Deferred {
    pub fn new<F>(pending: F) -> Self
    where
        F: Future<Output = Result<Scope>> + Send + 'static,
    {
        Self {
            pending: pending.boxed(),
        }
    }

    /// Already-settled value; still inserted asynchronously.
    pub fn ready(scope: Scope) -> Self {
        Self::new(async move { Ok(scope) })
    }

    pub(crate) fn into_future(self) -> BoxFuture<'static, Result<Scope>> {
        self.pending
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Key → binding mapping for one template fragment.
#[derive(Debug, Default)]
pub struct Scope {
    values: HashMap<String, Binding>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Scope::insert`] for a leaf value.
    pub fn leaf(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, Binding::Leaf(value.into()));
        self
    }

    pub fn collection(mut self, key: impl Into<String>, collection: Collection) -> Self {
        self.insert(key, Binding::Collection(collection));
        self
    }

    pub fn deferred(mut self, key: impl Into<String>, deferred: Deferred) -> Self {
        self.insert(key, Binding::Deferred(deferred));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.values.insert(key.into(), binding)
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.values.get(key)
    }

    /// Remove a binding. Deferred values are taken out when their `await` is bound.
    pub fn take(&mut self, key: &str) -> Option<Binding> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Text form of a leaf: strings verbatim, `null` empty, everything else as JSON.
pub fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
