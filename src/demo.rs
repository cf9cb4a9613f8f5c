//! A certificate issuing workflow with simulated services.
//!
//! `requestCert` asks a certificate authority for a certificate and
//! `installCert` writes it to disk. Both can be undone. The installer can be
//! told to fail so the run ends in compensation.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

use portflow_core::{
    CoreError, ModelInstance, Port, PortAdapter, PortDirection, UndoHandler, WorkflowDefinition,
};

/// Workflow name
pub const CACERT: &str = "cacert";

/// Event emitted once the certificate files are written
pub const CERT_FILES_WRITTEN: &str = "certFilesWritten";

/// Simulated certificate authority
#[derive(Debug, Default)]
pub struct CertificateAuthority {
    revoked: AtomicU32,
}

impl CertificateAuthority {
    /// Certificates revoked so far
    pub fn revoked(&self) -> u32 {
        self.revoked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortAdapter for CertificateAuthority {
    async fn invoke(&self, model: &ModelInstance) -> Result<Value, CoreError> {
        let domain = model
            .key("domain")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::ValidationError("model has no domain".to_string()))?;
        info!(domain = %domain, "Issuing certificate");
        Ok(json!({ "cert": format!("CERT({})", domain) }))
    }
}

#[async_trait]
impl UndoHandler for CertificateAuthority {
    async fn undo(&self, model: &ModelInstance) -> Result<(), CoreError> {
        self.revoked.fetch_add(1, Ordering::SeqCst);
        info!(model_id = %model.id, "Certificate revoked");
        Ok(())
    }
}

/// Simulated file installer
#[derive(Debug)]
pub struct FileInstaller {
    fail: bool,
}

impl FileInstaller {
    /// An installer that fails every write when `fail` is set
    pub fn new(fail: bool) -> Self {
        Self { fail }
    }
}

#[async_trait]
impl PortAdapter for FileInstaller {
    async fn invoke(&self, model: &ModelInstance) -> Result<Value, CoreError> {
        if self.fail {
            return Err(CoreError::PortExecutionError(
                "certificate directory is read-only".to_string(),
            ));
        }
        let cert = model.key("cert").cloned().unwrap_or(Value::Null);
        info!(cert = %cert, "Certificate files written");
        Ok(json!({ "certPath": "/etc/ssl/portflow.pem" }))
    }
}

#[async_trait]
impl UndoHandler for FileInstaller {
    async fn undo(&self, _model: &ModelInstance) -> Result<(), CoreError> {
        info!("Certificate files removed");
        Ok(())
    }
}

/// Build the certificate workflow definition
pub fn cacert_workflow(
    domain: &str,
    authority: Arc<CertificateAuthority>,
    installer: Arc<FileInstaller>,
) -> WorkflowDefinition {
    WorkflowDefinition::new(CACERT, json!({ "domain": domain }))
        .with_port(
            Port::new("requestCert", "acme")
                .with_direction(PortDirection::Outbound)
                .with_keys(["domain"])
                .consumes(CACERT)
                .produces("certReceived")
                .with_adapter(authority.clone())
                .with_undo(authority),
        )
        .with_port(
            Port::new("installCert", "filesystem")
                .with_keys(["cert"])
                .consumes("certReceived")
                .produces(CERT_FILES_WRITTEN)
                .with_forward_retries(2)
                .with_adapter(installer.clone())
                .with_undo(installer),
        )
}
