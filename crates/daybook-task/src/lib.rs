//! Persistence of the task collection and the `Planner` application state
//! built on top of the core `KvStore` contract.

pub mod persistence;
pub mod planner;

pub use persistence::{ExportDocument, TaskPersistence};
pub use planner::Planner;
