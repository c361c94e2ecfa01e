#![forbid(unsafe_code)]

//! Balanced kd-tree over borrowed descriptor vectors.
//!
//! `kdspace` indexes `n` points of any dimension stored row-major in a `&[f64]` and answers
//! nearest-neighbour, k-nearest and radius queries without recursion: every query walks the tree
//! with a reusable [`SearchStack`], so a warmed-up stack never allocates and call-stack usage is
//! constant regardless of how the data is distributed.
//!
//! ```
//! use kdspace::KdTree;
//!
//! let corners = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
//! let tree = KdTree::build(&corners, 2)?;
//! let mut searcher = tree.searcher();
//! let hit = searcher.nearest_neighbor(&[0.9, 0.8], false)?;
//! assert_eq!(hit.index, 3);
//! # Ok::<(), kdspace::Error>(())
//! ```

pub mod error;
pub mod metric;
mod search;
pub mod stack;
mod tree;

pub use error::{Error, Result};
pub use metric::Metric;
pub use search::{Neighbor, Searcher};
pub use stack::{SearchStack, SearchStats};
pub use tree::{BuildOptions, KdTree, SplitRule};
