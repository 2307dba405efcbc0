/*!
 * Services
 * User-space service collaborators and the health-gated registry
 */

pub mod builtin;
pub mod registry;

pub use builtin::{DriverService, FsService, NetService, SecurityService};
pub use registry::{ServiceRegistry, ServiceStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Service operation result
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Unified service error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("service '{0}' already registered")]
    DuplicateName(String),

    #[error("no service named '{0}'")]
    UnknownService(String),

    #[error("service '{0}' is marked failed")]
    Unavailable(String),

    #[error("service '{service}' has no operation '{op}'")]
    UnknownOperation { service: String, op: String },

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

/// Health state of a registered service
///
/// Mutated only by explicit fail/recover control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Failed,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Failed => write!(f, "failed"),
        }
    }
}

/// The fixed capability interface every service collaborator implements
///
/// The registry depends only on this trait, never on concrete service types.
pub trait Service: Send + Sync {
    /// Bring the service up; called once at registration time
    fn start(&self) -> ServiceResult<()>;

    /// Shut the service down
    fn stop(&self) -> ServiceResult<()>;

    /// The canonical self-test invoked by the control surface
    fn health_check(&self) -> ServiceResult<()>;

    /// Dispatch a named operation with string arguments
    fn operation(&self, op: &str, args: &[&str]) -> ServiceResult<String>;
}
