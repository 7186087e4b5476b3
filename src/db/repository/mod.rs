//! Repository layer: table-scoped database operations.
//!
//! One sub-module per table group; all public functions are re-exported here.

mod audit;
mod health_parameter;
mod normalized;
mod reference;

pub use audit::*;
pub use health_parameter::*;
pub use normalized::*;
pub use reference::*;
