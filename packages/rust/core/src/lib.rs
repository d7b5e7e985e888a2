//! Core render orchestration for gobracket.
//!
//! This crate ties together the API client, the tournament data-tree
//! assembler, and the template binder into [`render_tournament`].

pub mod assembler;
pub mod pipeline;

pub use assembler::{Assembled, Assembler, RenderMode, connected_groups, focus_group, result_string};
pub use pipeline::{
    DEFAULT_PAGE, PageParams, ProgressReporter, RenderConfig, RenderResult, SilentProgress,
    load_template, render_tournament,
};
