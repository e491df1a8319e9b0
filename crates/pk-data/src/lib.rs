//! pointkit dataset support: in-memory point-cloud datasets with batching
//! loaders, plus ModelNet40-style verified record directories.

mod error;

pub mod dataset;
pub mod modelnet;

pub use crate::dataset::{Batches, DataLoader, Dataset};
pub use crate::error::{DataError, Result};
pub use crate::modelnet::ModelNet40;
