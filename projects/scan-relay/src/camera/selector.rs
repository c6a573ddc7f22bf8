//! Rear camera selection.
//!
//! Labels are unreliable across platforms and are often empty until the
//! camera permission is granted, so selection cascades from the most specific
//! signal down to positional guesses. When nothing can be pinned the caller
//! asks the engine for an environment-facing camera instead.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use super::device::{CameraDevice, video_inputs};

/// Label reported by some Android builds for the main rear sensor. Matched
/// case-sensitively.
pub const EXACT_REAR_LABEL: &str = "camera 0, facing back";

pub const REAR_CAMERA_KEYWORDS: [&str; 5] = ["back", "rear", "environment", "traseira", "camera 0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    Environment,
}

/// Constraint handed to the scanning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoConstraint {
    DeviceId { exact: String },
    FacingMode(FacingMode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "selection", rename_all = "snake_case")]
pub enum CameraSelection {
    Device { device_id: String },
    None,
}

impl CameraSelection {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self::Device {
            device_id: device_id.into(),
        }
    }

    #[cfg(test)]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Device { device_id } => Some(device_id),
            Self::None => None,
        }
    }

    pub fn constraint(&self) -> VideoConstraint {
        match self {
            Self::Device { device_id } => VideoConstraint::DeviceId {
                exact: device_id.clone(),
            },
            Self::None => VideoConstraint::FacingMode(FacingMode::Environment),
        }
    }
}

pub fn select_rear_camera(devices: &[CameraDevice]) -> CameraSelection {
    if let Some(device) = devices
        .iter()
        .find(|device| device.label.contains(EXACT_REAR_LABEL))
    {
        debug!("rear camera matched exact label: {}", device.device_id);
        return CameraSelection::device(&device.device_id);
    }

    if let Some(device) = devices
        .iter()
        .find(|device| has_rear_keyword(&device.label))
    {
        debug!(
            "rear camera matched keyword in label {:?}: {}",
            device.label, device.device_id
        );
        return CameraSelection::device(&device.device_id);
    }

    match devices {
        [] => CameraSelection::None,
        [only] => CameraSelection::device(&only.device_id),
        // Without labels the rear sensor is most often enumerated last.
        [.., last] => CameraSelection::device(&last.device_id),
    }
}

/// Selects from the raw result of an enumeration call. Enumeration failures
/// count as an empty device list.
pub fn select_from_enumeration(enumerated: Result<Vec<CameraDevice>>) -> CameraSelection {
    match enumerated {
        Ok(devices) => select_rear_camera(&video_inputs(devices)),
        Err(err) => {
            warn!("camera enumeration failed, falling back to facing mode: {err:#}");
            CameraSelection::None
        }
    }
}

fn has_rear_keyword(label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    let label = label.to_lowercase();
    REAR_CAMERA_KEYWORDS
        .iter()
        .any(|keyword| label.contains(keyword))
}
