use std::str::FromStr;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::scan::formats::BarcodeFormat;

use super::{
    focus::{FocusCapabilities, FocusRequest},
    remote::RemoteEngine,
    selector::VideoConstraint,
    traits::{EngineEvent, ScanEngine},
    zbar_backend::ZbarBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Zbar,
    Remote,
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zbar" => Ok(Self::Zbar),
            "remote" => Ok(Self::Remote),
            other => bail!("unknown scan engine: {other}"),
        }
    }
}

/// Engine selected at startup.
#[derive(Debug)]
pub enum HostEngine {
    Zbar(ZbarBackend),
    Remote(RemoteEngine),
}

impl HostEngine {
    pub fn new(kind: EngineKind, default_device: String) -> Self {
        match kind {
            EngineKind::Zbar => Self::Zbar(ZbarBackend::new(default_device)),
            EngineKind::Remote => Self::Remote(RemoteEngine::new()),
        }
    }
}

#[async_trait]
impl ScanEngine for HostEngine {
    async fn start(
        &mut self,
        constraint: &VideoConstraint,
        formats: &[BarcodeFormat],
    ) -> Result<mpsc::Receiver<EngineEvent>> {
        match self {
            Self::Zbar(engine) => engine.start(constraint, formats).await,
            Self::Remote(engine) => engine.start(constraint, formats).await,
        }
    }

    async fn pause(&mut self) -> Result<()> {
        match self {
            Self::Zbar(engine) => engine.pause().await,
            Self::Remote(engine) => engine.pause().await,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        match self {
            Self::Zbar(engine) => engine.stop().await,
            Self::Remote(engine) => engine.stop().await,
        }
    }

    async fn focus_capabilities(&self) -> Result<FocusCapabilities> {
        match self {
            Self::Zbar(engine) => engine.focus_capabilities().await,
            Self::Remote(engine) => engine.focus_capabilities().await,
        }
    }

    async fn apply_focus(&self, request: FocusRequest) -> Result<()> {
        match self {
            Self::Zbar(engine) => engine.apply_focus(request).await,
            Self::Remote(engine) => engine.apply_focus(request).await,
        }
    }
}
