//! Builders for test models and workflows.

mod model;
mod workflow;

pub use model::*;
pub use workflow::*;
