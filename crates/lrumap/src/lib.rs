//! # lrumap
//!
//! Bounded, thread-safe LRU map.
//!
//! ## Architecture
//! - **HashMap**: AHash index from key to list slot (O(1))
//! - **LRU List**: Index-linked doubly-linked list for recency (O(1) promote/evict)
//! - **RwLock**: One `parking_lot` lock over index and list together
//! - **Snapshots**: `keys`/`values`/`entries` copy out, never expose live views
//!
//! ## Example
//! ```
//! use lrumap::LruMap;
//!
//! let map = LruMap::new(2)?;
//! map.put("a", 1);
//! map.put("b", 2);
//! map.get("a");      // "a" is now most recently used
//! map.put("c", 3);   // evicts "b"
//!
//! assert!(map.contains_key("a"));
//! assert!(!map.contains_key("b"));
//! # Ok::<(), lrumap::Error>(())
//! ```

#![warn(missing_docs)]

mod error;
mod lru;
mod map;
mod stats;

pub use error::{Error, Result};
pub use lru::{Iter, LruCache};
pub use map::LruMap;
pub use stats::{CacheStats, StatsSnapshot};
