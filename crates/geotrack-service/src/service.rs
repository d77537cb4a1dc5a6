//! Host service management for geotrack-service.
//!
//! Installs the binary with a restart-on-failure policy. That restart is what
//! brings the controller back after the host kills it, and the new process
//! resumes the open session from the persisted snapshot.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use service_manager::{
    RestartPolicy, ServiceInstallCtx, ServiceLabel, ServiceLevel, ServiceManager, ServiceStartCtx,
    ServiceStopCtx, ServiceUninstallCtx,
};
use thiserror::Error;

const SERVICE_LABEL: &str = "io.github.geotrack";

/// Errors that can occur during service management.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No service manager available on this platform")]
    NoServiceManager,

    #[error("Service manager error: {0}")]
    Manager(String),

    #[error("Could not find geotrack-service executable")]
    ExecutableNotFound,

    #[error("User-level services not supported on this platform")]
    UserLevelNotSupported,

    #[error("Invalid service label: {0}")]
    InvalidLabel(String),
}

/// Service management level.
#[derive(Debug, Clone, Copy, Default)]
pub enum Level {
    /// System-level service (requires root/admin)
    #[default]
    System,
    /// User-level service
    User,
}

fn manager(level: Level) -> Result<Box<dyn ServiceManager>, ServiceError> {
    let mut manager = <dyn ServiceManager>::native().map_err(|_| ServiceError::NoServiceManager)?;

    let service_level = match level {
        Level::System => ServiceLevel::System,
        Level::User => ServiceLevel::User,
    };

    manager
        .set_level(service_level)
        .map_err(|_| ServiceError::UserLevelNotSupported)?;

    Ok(manager)
}

fn executable_path() -> Result<PathBuf, ServiceError> {
    env::current_exe().map_err(|_| ServiceError::ExecutableNotFound)
}

fn label() -> Result<ServiceLabel, ServiceError> {
    SERVICE_LABEL
        .parse::<ServiceLabel>()
        .map_err(|e| ServiceError::InvalidLabel(e.to_string()))
}

/// Install geotrack-service as a host service.
pub fn install(level: Level) -> Result<(), ServiceError> {
    let manager = manager(level)?;

    manager
        .install(ServiceInstallCtx {
            label: label()?,
            program: executable_path()?,
            args: vec![OsString::from("run")],
            contents: None,
            username: None,
            working_directory: None,
            environment: None,
            autostart: true,
            restart_policy: RestartPolicy::OnFailure {
                delay_secs: Some(5),
            },
        })
        .map_err(|e| ServiceError::Manager(e.to_string()))
}

/// Uninstall the host service.
pub fn uninstall(level: Level) -> Result<(), ServiceError> {
    manager(level)?
        .uninstall(ServiceUninstallCtx { label: label()? })
        .map_err(|e| ServiceError::Manager(e.to_string()))
}

/// Start the host service.
pub fn start(level: Level) -> Result<(), ServiceError> {
    manager(level)?
        .start(ServiceStartCtx { label: label()? })
        .map_err(|e| ServiceError::Manager(e.to_string()))
}

/// Stop the host service.
pub fn stop(level: Level) -> Result<(), ServiceError> {
    manager(level)?
        .stop(ServiceStopCtx { label: label()? })
        .map_err(|e| ServiceError::Manager(e.to_string()))
}

/// Service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

/// Get the status of the host service.
///
/// The service manager has no status query, so this asks the running service
/// over HTTP instead.
pub async fn status(bind: &str) -> ServiceStatus {
    let url = format!("http://{bind}/api/health");
    match reqwest::get(&url).await {
        Ok(response) if response.status().is_success() => ServiceStatus::Running,
        _ => ServiceStatus::Stopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parses() {
        assert!(label().is_ok());
    }

    #[tokio::test]
    async fn test_status_of_unbound_address_is_stopped() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert_eq!(status(&addr.to_string()).await, ServiceStatus::Stopped);
    }
}
