/// Port definitions and the handler traits they carry
pub mod port;

/// Registrable workflow specifications
pub mod workflow_spec;

/// Running workflow instances and their port flow history
pub mod model;

/// Generated workflow event names
pub mod events;

/// Collaborator interfaces consumed by the engine
pub mod repository;
