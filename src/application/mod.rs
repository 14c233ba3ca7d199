//! Post enumeration, rendering and request dispatch.

pub mod dispatch;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod render;
pub mod syndication;
