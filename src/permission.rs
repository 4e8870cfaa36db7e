//! Camera permission check.
//!
//! The runtime asks off the controller thread and delivers each answer as a
//! `ControllerEvent::Permission`. Only `Pending` is asked again.

use std::fs::OpenOptions;
use std::io::ErrorKind;

use crate::ingest::{replay, synthetic};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// No decision yet. The controller waits up to its permission timeout.
    Pending,
}

pub trait CameraPermission: Send {
    fn request(&self) -> PermissionStatus;
}

/// Fixed answer, for tests and headless deployments.
#[derive(Clone, Copy, Debug)]
pub struct StaticPermission(pub PermissionStatus);

impl CameraPermission for StaticPermission {
    fn request(&self) -> PermissionStatus {
        self.0
    }
}

/// Checks whether the configured source can actually be opened.
#[derive(Clone, Debug)]
pub struct DevicePermission {
    location: String,
}

impl DevicePermission {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl CameraPermission for DevicePermission {
    fn request(&self) -> PermissionStatus {
        let location = self.location.trim();
        if location.starts_with(synthetic::SCHEME) || location.starts_with(replay::SCHEME) {
            return PermissionStatus::Granted;
        }
        match OpenOptions::new().read(true).write(true).open(location) {
            Ok(_) => PermissionStatus::Granted,
            Err(err) if matches!(err.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => {
                log::warn!("DevicePermission: cannot open {}: {}", location, err);
                PermissionStatus::Denied
            }
            Err(err) => {
                log::warn!("DevicePermission: {} not ready: {}", location, err);
                PermissionStatus::Pending
            }
        }
    }
}
