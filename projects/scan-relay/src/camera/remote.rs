use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::scan::formats::BarcodeFormat;

use super::{
    focus::{FocusCapabilities, FocusRequest},
    selector::VideoConstraint,
    traits::{EngineEvent, ScanEngine},
};

/// Engine running outside this process, typically a page decoding frames
/// from the browser camera. Its decodes are reported over HTTP and fed to the
/// gate directly; this side only tracks whether a session is open.
#[derive(Debug, Default)]
pub struct RemoteEngine {
    session: Option<mpsc::Sender<EngineEvent>>,
}

impl RemoteEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanEngine for RemoteEngine {
    async fn start(
        &mut self,
        _constraint: &VideoConstraint,
        _formats: &[BarcodeFormat],
    ) -> Result<mpsc::Receiver<EngineEvent>> {
        if self.session.is_some() {
            bail!("scanner already running");
        }
        let (tx, rx) = mpsc::channel(1);
        self.session = Some(tx);
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // Dropping the sender ends the capture loop waiting on the receiver.
        self.session = None;
        Ok(())
    }

    async fn focus_capabilities(&self) -> Result<FocusCapabilities> {
        Ok(FocusCapabilities::default())
    }

    async fn apply_focus(&self, _request: FocusRequest) -> Result<()> {
        bail!("focus control is not supported by remote engines")
    }
}
