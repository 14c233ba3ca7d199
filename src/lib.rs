//! Scribe: a file-backed personal blog server.
//!
//! Posts live on disk as front-matter + Markdown files. Requests are mapped
//! to a paginated listing, a single post, or the RSS feed; rendered bodies
//! are memoized on disk when the site runs live.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
