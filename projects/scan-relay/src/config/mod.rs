use std::{env, net::SocketAddr, time::Duration};

use anyhow::Context;
use reqwest::Url;

use crate::{
    camera::engine::EngineKind,
    scan::{
        gate::{BarcodePolicy, DEFAULT_DEDUP_WINDOW},
        pipeline::PipelineTimings,
    },
    submit::client::Transport,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub bind_addr: SocketAddr,
    pub scan_engine: EngineKind,
    pub camera_device: String,
    pub camera_override: Option<String>,
    pub barcode_policy: BarcodePolicy,
    pub dedup_window: Duration,
    pub submit_endpoint: Option<Url>,
    pub submit_transport: Transport,
    pub submit_timeout: Duration,
    pub timings: PipelineTimings,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "ScanRelay".to_owned());
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_owned())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;
        let scan_engine = env::var("SCAN_ENGINE")
            .unwrap_or_else(|_| "zbar".to_owned())
            .parse::<EngineKind>()?;

        let camera_device = env::var("CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_owned());
        let camera_override = non_empty_var("CAMERA_OVERRIDE");

        let barcode_policy = match non_empty_var("BARCODE_POLICY") {
            Some(value) => value.parse::<BarcodePolicy>()?,
            None => BarcodePolicy::default(),
        };
        let dedup_window = millis_var("DEDUP_WINDOW_MS", DEFAULT_DEDUP_WINDOW);

        let submit_endpoint = non_empty_var("SUBMIT_ENDPOINT")
            .map(|value| Url::parse(&value).context("invalid SUBMIT_ENDPOINT"))
            .transpose()?;
        let submit_transport = match non_empty_var("SUBMIT_TRANSPORT") {
            Some(value) => value.parse::<Transport>()?,
            None => Transport::default(),
        };
        let submit_timeout = Duration::from_secs(
            env::var("SUBMIT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(15),
        );

        let defaults = PipelineTimings::default();
        let timings = PipelineTimings {
            pause_grace: millis_var("PAUSE_GRACE_MS", defaults.pause_grace),
            save_close: millis_var("SAVE_CLOSE_MS", defaults.save_close),
            resume_after_save: millis_var("RESUME_AFTER_SAVE_MS", defaults.resume_after_save),
            resume_after_cancel: millis_var("RESUME_AFTER_CANCEL_MS", defaults.resume_after_cancel),
            autofocus_delay: defaults.autofocus_delay,
            focus_cycle_pause: defaults.focus_cycle_pause,
        };

        Ok(Self {
            app_name,
            bind_addr,
            scan_engine,
            camera_device,
            camera_override,
            barcode_policy,
            dedup_window,
            submit_endpoint,
            submit_transport,
            submit_timeout,
            timings,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn millis_var(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
