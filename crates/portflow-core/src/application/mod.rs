/// Shared orchestrator context
pub mod context;

/// Workflow spec builder
pub mod spec_builder;

/// Starting and resuming workflows
pub mod workflow_runner;

/// LIFO compensation of completed ports
pub mod compensation;

/// Forward port execution
pub mod port_invoker;

/// Internal bus for workflow generation requests
pub mod event_bus;

#[cfg(test)]
pub(crate) mod test_support;
