use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::scan::formats::BarcodeFormat;

use super::{
    device::CameraDevice,
    focus::{FocusCapabilities, FocusRequest},
    selector::VideoConstraint,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Decoded {
        decoded_text: String,
        format: Option<BarcodeFormat>,
    },
    /// Per-frame failure, mostly noise.
    DecodeError(String),
}

#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<CameraDevice>>;
}

#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Opens the camera and starts decoding. Events arrive on the returned
    /// channel until the engine is stopped.
    async fn start(
        &mut self,
        constraint: &VideoConstraint,
        formats: &[BarcodeFormat],
    ) -> Result<mpsc::Receiver<EngineEvent>>;
    /// Keeps the camera open but drops decodes.
    async fn pause(&mut self) -> Result<()>;
    /// Stops decoding and releases the camera.
    async fn stop(&mut self) -> Result<()>;
    async fn focus_capabilities(&self) -> Result<FocusCapabilities>;
    async fn apply_focus(&self, request: FocusRequest) -> Result<()>;
}
