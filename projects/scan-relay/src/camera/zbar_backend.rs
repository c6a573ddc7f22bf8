use std::{
    path::Path,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{Child, Command},
    sync::mpsc,
    time::sleep,
};
use tracing::{info, warn};

use crate::scan::formats::BarcodeFormat;

use super::{
    focus::{
        FocusCapabilities, FocusRequest, V4L2_CONTINUOUS_CONTROLS, V4L2_DISTANCE_CONTROL,
        V4L2_SINGLE_SHOT_CONTROL, parse_v4l2_controls,
    },
    selector::VideoConstraint,
    traits::{EngineEvent, ScanEngine},
};

const EVENT_BUFFER: usize = 32;
/// How long a freshly spawned `zbarcam` gets to fail on a busy or missing
/// device before it is considered started.
const STARTUP_PROBE: Duration = Duration::from_millis(300);

/// Scanning engine backed by the `zbarcam` process from zbar-tools.
#[derive(Debug)]
pub struct ZbarBackend {
    default_device: String,
    active_device: Option<String>,
    child: Option<Child>,
    paused: Arc<AtomicBool>,
}

impl ZbarBackend {
    /// `default_device` is opened when the constraint only asks for an
    /// environment-facing camera.
    pub fn new(default_device: String) -> Self {
        Self {
            default_device,
            active_device: None,
            child: None,
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    fn resolve_device(&self, constraint: &VideoConstraint) -> String {
        match constraint {
            VideoConstraint::DeviceId { exact } => exact.clone(),
            VideoConstraint::FacingMode(_) => self.default_device.clone(),
        }
    }

    fn focus_device(&self) -> &str {
        self.active_device
            .as_deref()
            .unwrap_or(&self.default_device)
    }

    async fn set_controls(&self, assignment: &str) -> Result<()> {
        let output = Command::new("v4l2-ctl")
            .args(["-d", self.focus_device(), "--set-ctrl", assignment])
            .output()
            .await
            .context("failed to execute v4l2-ctl")?;
        if !output.status.success() {
            bail!(
                "v4l2-ctl --set-ctrl {assignment} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn zbarcam_args(device: &str, formats: &[BarcodeFormat]) -> Vec<String> {
    let mut args = vec!["--nodisplay".to_string(), "--quiet".to_string()];
    if !formats.is_empty() {
        args.push("-Sdisable".to_string());
        args.extend(
            formats
                .iter()
                .map(|format| format!("-S{}.enable", format.zbar_config_name())),
        );
    }
    args.push(device.to_string());
    args
}

/// Parses one `SYMBOL:data` line written by zbarcam.
pub fn parse_zbar_line(line: &str) -> Option<EngineEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let parsed = line.split_once(':').and_then(|(symbol, data)| {
        BarcodeFormat::from_zbar_symbol(symbol).map(|format| (data, Some(format)))
    });
    let (decoded_text, format) = parsed.unwrap_or((line, None));
    Some(EngineEvent::Decoded {
        decoded_text: decoded_text.to_string(),
        format,
    })
}

fn focus_assignments(request: FocusRequest) -> Vec<String> {
    match request {
        FocusRequest::Continuous => V4L2_CONTINUOUS_CONTROLS
            .iter()
            .map(|control| format!("{control}=1"))
            .collect(),
        FocusRequest::Manual => V4L2_CONTINUOUS_CONTROLS
            .iter()
            .map(|control| format!("{control}=0"))
            .collect(),
        FocusRequest::SingleShot => vec![format!("{V4L2_SINGLE_SHOT_CONTROL}=1")],
        FocusRequest::Distance(distance) => vec![format!("{V4L2_DISTANCE_CONTROL}={distance}")],
    }
}

#[async_trait]
impl ScanEngine for ZbarBackend {
    async fn start(
        &mut self,
        constraint: &VideoConstraint,
        formats: &[BarcodeFormat],
    ) -> Result<mpsc::Receiver<EngineEvent>> {
        if let Some(child) = self.child.as_mut() {
            if child.try_wait()?.is_none() {
                bail!("scanner already running");
            }
            warn!("previous zbarcam run had already exited");
            self.child = None;
            self.active_device = None;
        }

        let device = self.resolve_device(constraint);
        if !Path::new(&device).exists() {
            bail!("NotFoundError: camera device {device} not found");
        }

        let mut child = Command::new("zbarcam")
            .args(zbarcam_args(&device, formats))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("zbarcam could not be spawned; scanning is not supported on this host")?;

        sleep(STARTUP_PROBE).await;
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            bail!("zbarcam exited during startup ({status}): {}", stderr.trim());
        }

        let stdout = child
            .stdout
            .take()
            .context("missing zbarcam stdout pipe")?;
        let stderr = child
            .stderr
            .take()
            .context("missing zbarcam stderr pipe")?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.paused.store(false, Ordering::SeqCst);

        let decode_tx = tx.clone();
        let paused = self.paused.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if paused.load(Ordering::SeqCst) {
                            continue;
                        }
                        let Some(event) = parse_zbar_line(&line) else {
                            continue;
                        };
                        if decode_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("failed to read zbarcam output: {err}");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(EngineEvent::DecodeError(line)).await.is_err() {
                    break;
                }
            }
        });

        info!("zbarcam started on {device}");
        self.child = Some(child);
        self.active_device = Some(device);
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Err(err) = child.kill().await {
            warn!("failed to kill zbarcam child: {err}");
        }
        if let Some(device) = self.active_device.take() {
            info!("zbarcam released {device}");
        }
        Ok(())
    }

    async fn focus_capabilities(&self) -> Result<FocusCapabilities> {
        let output = Command::new("v4l2-ctl")
            .args(["-d", self.focus_device(), "--list-ctrls"])
            .output()
            .await
            .context("failed to execute v4l2-ctl")?;
        if !output.status.success() {
            return Ok(FocusCapabilities::default());
        }

        Ok(parse_v4l2_controls(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn apply_focus(&self, request: FocusRequest) -> Result<()> {
        let mut last_error = None;
        for assignment in focus_assignments(request) {
            match self.set_controls(&assignment).await {
                Ok(()) => return Ok(()),
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
