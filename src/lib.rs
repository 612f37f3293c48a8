//! Concurrent containers.
//!
//! The main type is [`DenseIntMap`], a growable map from small non-negative
//! integer keys (node ordinals, as handed out by a graph index) to values.
//! It supports lock-free lookups alongside concurrent inserts and removals,
//! and keeps an exact element count once writers quiesce.
//!
//! ```
//! use synchronized::DenseIntMap;
//!
//! let map = DenseIntMap::with_capacity(100);
//! std::thread::scope(|s| {
//!     for t in 0..4 {
//!         let map = &map;
//!         s.spawn(move || {
//!             let pinned = map.pin();
//!             for i in 0..250 {
//!                 pinned.put(t * 250 + i, i).unwrap();
//!             }
//!         });
//!     }
//! });
//! assert_eq!(map.size(), 1000);
//! assert_eq!(map.get_cloned(999).unwrap(), Some(249));
//! ```

pub mod config;
pub mod containers;
pub mod error;
pub mod util;

pub use config::{GrowthPolicy, DEFAULT_CAPACITY};
pub use containers::{DenseIntMap, DenseIntMapRef, Slot};
pub use error::{Error, Result};
