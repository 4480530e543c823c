//! Windows service state probing.
//!
//! The packet engine rendezvous needs to observe the `windivert` kernel
//! service reaching `Running` or `Stopped`. The [`ServiceProbe`] capability
//! isolates the service control manager so tests can script transitions.

use winfault_shared::FaultError;

/// Observable states of a Windows service, reduced to what the engine
/// rendezvous cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    StartPending,
    StopPending,
    /// The service is not registered (the driver unloads itself on stop).
    NotFound,
}

pub trait ServiceProbe: Send + Sync {
    fn query(&self, service: &str) -> Result<ServiceState, FaultError>;
}

/// Probe backed by the OS service control manager.
#[derive(Debug, Default, Clone)]
pub struct SystemServiceProbe;

#[cfg(windows)]
impl ServiceProbe for SystemServiceProbe {
    fn query(&self, service: &str) -> Result<ServiceState, FaultError> {
        use windows::core::HSTRING;
        use windows::Win32::System::Services::{
            CloseServiceHandle, OpenSCManagerW, OpenServiceW, QueryServiceStatus,
            SC_MANAGER_CONNECT, SERVICE_QUERY_STATUS, SERVICE_RUNNING, SERVICE_START_PENDING,
            SERVICE_STATUS, SERVICE_STOPPED, SERVICE_STOP_PENDING,
        };

        unsafe {
            let manager = OpenSCManagerW(None, None, SC_MANAGER_CONNECT).map_err(|e| {
                FaultError::ServiceControl {
                    message: format!("failed to connect to service manager: {e}"),
                }
            })?;

            let handle = match OpenServiceW(manager, &HSTRING::from(service), SERVICE_QUERY_STATUS)
            {
                Ok(handle) => handle,
                Err(_) => {
                    let _ = CloseServiceHandle(manager);
                    return Ok(ServiceState::NotFound);
                }
            };

            let mut status = SERVICE_STATUS::default();
            let result = QueryServiceStatus(handle, &mut status);
            let _ = CloseServiceHandle(handle);
            let _ = CloseServiceHandle(manager);

            result.map_err(|e| FaultError::ServiceControl {
                message: format!("failed to query service '{service}': {e}"),
            })?;

            let current = status.dwCurrentState;
            Ok(if current == SERVICE_RUNNING {
                ServiceState::Running
            } else if current == SERVICE_STOPPED {
                ServiceState::Stopped
            } else if current == SERVICE_STOP_PENDING {
                ServiceState::StopPending
            } else if current == SERVICE_START_PENDING {
                ServiceState::StartPending
            } else {
                ServiceState::StartPending
            })
        }
    }
}

#[cfg(not(windows))]
impl ServiceProbe for SystemServiceProbe {
    fn query(&self, service: &str) -> Result<ServiceState, FaultError> {
        Err(FaultError::ServiceControl {
            message: format!("service '{service}' can only be queried on Windows hosts"),
        })
    }
}
