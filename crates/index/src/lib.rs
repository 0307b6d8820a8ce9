//! Index structures for Quiver
//!
//! - [`IndexStore`]: records of one collection plus its search structure
//! - [`FilterExpr`]: parsed metadata filter
//! - [`ivf`], [`pq`], [`kmeans`]: approximate search building blocks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distance;
pub mod filter;
pub mod ivf;
pub mod kmeans;
pub mod pq;
pub mod store;

pub use filter::{CmpOp, Field, FilterExpr};
pub use ivf::{IvfIndex, PqCodes, UNASSIGNED};
pub use kmeans::Centroids;
pub use pq::ProductQuantizer;
pub use store::{AuxState, IndexState, IndexStore};
