//! Mock implementations of the Portflow collaborator traits.
//!
//! `mock!`-generated types cover strict expectation checks. The scripted
//! port and recording broker are fakes for driving whole workflows.

pub mod collaborators;
pub mod recording_broker;
pub mod scripted;

pub use collaborators::*;
pub use recording_broker::*;
pub use scripted::*;
