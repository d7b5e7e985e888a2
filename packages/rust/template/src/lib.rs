//! Template binding engine.
//!
//! This crate provides:
//! - [`template`] — templates parsed from HTML with `data-*` binding directives
//! - [`data`] — the data tree ([`Scope`], [`Binding`], [`Collection`], [`Deferred`])
//! - [`binder`] — [`fill`] and the incremental [`Render`]
//! - [`document`] — the output arena and its HTML serialization

pub mod binder;
pub mod data;
pub mod document;
pub mod template;

pub use binder::{BindingIssue, Directive, IssueKind, Render, Update, fill};
pub use data::{Binding, Collection, Deferred, Scope, leaf_text};
pub use document::{Document, NodeId, NodeKind};
pub use template::{Fragment, Template};
