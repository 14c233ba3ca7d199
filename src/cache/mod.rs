//! Disk-backed memoization of rendered responses.
//!
//! Entries are whole response bodies stored one file per request key.
//! There is no eviction or invalidation; `scribe cache clear` empties the
//! directory. The cache is only consulted when the site runs live.

mod keys;
mod store;

pub use keys::entry_file_name;
pub use store::{CacheError, DiskCache};

pub const METRIC_CACHE_HIT_TOTAL: &str = "scribe_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "scribe_cache_miss_total";
pub const METRIC_CACHE_WRITE_ERROR_TOTAL: &str = "scribe_cache_write_error_total";
