use std::sync::Arc;

use crate::{
    camera::{engine::HostEngine, traits::DeviceEnumerator},
    config::AppConfig,
    scan::{gate::ScanGate, pipeline::ScanController},
    submit::client::SubmissionClient,
};

pub type Scanner = ScanController<HostEngine>;

pub struct AppState {
    pub config: AppConfig,
    pub scanner: Arc<Scanner>,
}

impl AppState {
    pub fn new(config: AppConfig, enumerator: Arc<dyn DeviceEnumerator>) -> anyhow::Result<Self> {
        let engine = HostEngine::new(config.scan_engine, config.camera_device.clone());
        let gate = ScanGate::new(config.barcode_policy, config.dedup_window);
        let submitter = SubmissionClient::from_config(&config)?;
        let scanner = Arc::new(ScanController::new(
            engine,
            gate,
            enumerator,
            submitter,
            config.timings,
            config.camera_override.clone(),
        ));

        Ok(Self { config, scanner })
    }
}
