//! Build dependency cache
//!
//! Each cache entry is keyed by target triple, so the verify job and every
//! release job own disjoint namespaces and parallel jobs never write the
//! same entry.
//!
//! # Entry lifecycle
//!
//! | Moment | Action |
//! |--------|--------|
//! | Job start | restore if present, otherwise miss |
//! | Job end, all steps green | save, replacing the previous entry |
//! | `cache gc` / `cache clear` | removed by the operator |

pub mod lease;
pub mod lockfile;
pub mod store;

pub use lease::{CacheLease, CacheLeases};
pub use lockfile::{detect_lockfile, LockfileInfo};
pub use store::{format_bytes, CacheEntry, CacheKey, CachePayload, CacheStore, FsCacheStore};
