//! Error types shared by the engine, the run controller and the HTTP layer.

use reqwest::StatusCode;
use thiserror::Error;

/// The output line could not be driven. Treated as fatal to the process.
#[derive(Debug, Clone, Error)]
pub enum ActuatorFault {
    #[error("output line write failed: {0}")]
    Write(String),
    #[error("output line already released")]
    Released,
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("camera returned HTTP {0}")]
    Status(u16),
    #[error("camera address {0:?} does not form a valid URL")]
    InvalidAddress(String),
}

/// Rejections returned synchronously to the caller of a controller operation.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("System is currently capturing.")]
    Busy,
    #[error("DigiCamControl is not available.")]
    CameraUnavailable,
    #[error("No capture run is active.")]
    NothingToAbort,
    #[error("Slide count must be between 1 and {max}, got {requested}.")]
    InvalidSlideCount { requested: u32, max: u32 },
    #[error("Invalid camera address: {0:?}")]
    InvalidCamera(String),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Projector actuator fault: {0}")]
    ActuatorFault(#[from] ActuatorFault),
}

impl ControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Busy | ControlError::NothingToAbort => StatusCode::CONFLICT,
            ControlError::CameraUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::InvalidSlideCount { .. }
            | ControlError::InvalidCamera(_)
            | ControlError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::ActuatorFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            ControlError::Busy => "busy",
            ControlError::CameraUnavailable => "camera_unavailable",
            ControlError::NothingToAbort => "nothing_to_abort",
            ControlError::InvalidSlideCount { .. } => "invalid_slide_count",
            ControlError::InvalidCamera(_) => "invalid_camera",
            ControlError::MalformedRequest(_) => "malformed_request",
            ControlError::ActuatorFault(_) => "actuator_fault",
        }
    }
}
