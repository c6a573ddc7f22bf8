use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::scan::pipeline::{ConfirmError, StartError};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(format!("{value:#}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Advisory classification of scanner start failures, derived from the
/// engine's error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartErrorCategory {
    Permission,
    NotFound,
    NotSupported,
    InUse,
    Generic,
}

impl StartErrorCategory {
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

        if mentions(&["not supported", "notsupported", "unsupported"]) {
            Self::NotSupported
        } else if mentions(&["permission", "notallowed", "access denied"]) {
            Self::Permission
        } else if mentions(&["busy", "notreadable", "in use"]) {
            Self::InUse
        } else if mentions(&["notfound", "not found", "no such device"]) {
            Self::NotFound
        } else {
            Self::Generic
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Permission => "Camera permission denied.",
            Self::NotFound => "No camera found.",
            Self::NotSupported => "Camera scanning is not supported here.",
            Self::InUse => "Camera is in use by another application.",
            Self::Generic => "Failed to start the scanner.",
        }
    }
}

impl From<StartError> for AppError {
    fn from(value: StartError) -> Self {
        let status = match value.category {
            StartErrorCategory::Permission => StatusCode::FORBIDDEN,
            StartErrorCategory::NotFound => StatusCode::NOT_FOUND,
            StartErrorCategory::NotSupported => StatusCode::NOT_IMPLEMENTED,
            StartErrorCategory::InUse => StatusCode::CONFLICT,
            StartErrorCategory::Generic => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, value.to_string())
    }
}

impl From<ConfirmError> for AppError {
    fn from(value: ConfirmError) -> Self {
        let status = match &value {
            ConfirmError::Quantity(_) => StatusCode::BAD_REQUEST,
            ConfirmError::NothingPending | ConfirmError::Busy => StatusCode::CONFLICT,
            ConfirmError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ConfirmError::Submit(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, value.to_string())
    }
}
