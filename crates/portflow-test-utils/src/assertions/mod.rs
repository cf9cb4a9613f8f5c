//! Assertion utilities for model instances.

mod port_flow;

pub use port_flow::*;
