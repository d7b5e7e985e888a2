//! Rate-limited JSON API client.
//!
//! This crate provides:
//! - [`Request`] — immutable `{method, path, query}` call description
//! - [`Scheduler`] — admission-controlled, retrying call primitive
//! - [`PaginatedFetcher`] / [`PageStream`] — lazy cursor-pagination on top of it

pub mod pagination;
pub mod request;
pub mod scheduler;

pub use pagination::{PageStream, PaginatedFetcher};
pub use request::Request;
pub use scheduler::{Scheduler, backoff_delay};
