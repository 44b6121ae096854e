// Common types shared by the catalog, planner and executor

pub mod types;

pub use self::types::{NodeId, PredId, RelId, TableSet, MAX_RELATIONS};
