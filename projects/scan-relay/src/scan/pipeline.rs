//! Sequencing around an accepted scan.
//!
//! An acceptance runs as named stages: the engine is paused, given a short
//! grace delay to unwind the current frame, stopped, and the code waits for
//! confirmation. A save or dismissal later schedules the resume. Every
//! deferred stage checks one cancellation flag at its boundary, so a user
//! action such as stop or a new start aborts whatever is still pending.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Result, bail};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{Mutex, mpsc, watch},
    time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{
    camera::{
        discovery::{ProbeReport, probe_report},
        focus::{force_focus_sequence, negotiate_autofocus},
        selector::{CameraSelection, select_from_enumeration},
        traits::{DeviceEnumerator, EngineEvent, ScanEngine},
    },
    core::{
        errors::StartErrorCategory,
        state::ScannerStatus,
        status::{StatusBoard, StatusKind},
    },
    submit::{
        client::{SubmissionClient, SubmitError},
        quantity::{Quantity, QuantityError},
    },
};

use super::{
    formats::{BarcodeFormat, SUPPORTED_FORMATS},
    gate::{Decision, ScanGate, is_reportable_decode_error},
    session::{ScanEvents, ScanSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimings {
    /// Pause → stop, lets the engine finish the frame that produced the code.
    pub pause_grace: Duration,
    /// Success message stays on the confirmation step this long.
    pub save_close: Duration,
    pub resume_after_save: Duration,
    pub resume_after_cancel: Duration,
    pub autofocus_delay: Duration,
    pub focus_cycle_pause: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            pause_grace: Duration::from_millis(100),
            save_close: Duration::from_millis(1500),
            resume_after_save: Duration::from_millis(1000),
            resume_after_cancel: Duration::from_millis(500),
            autofocus_delay: Duration::from_millis(1000),
            focus_cycle_pause: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pausing,
    Releasing,
    AwaitingConfirmation,
    Submitting,
    Closing,
    Resuming,
}

#[derive(Debug, Error)]
#[error("{}", .category.user_message())]
pub struct StartError {
    pub category: StartErrorCategory,
    pub cause: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error("no scanned code is waiting for confirmation")]
    NothingPending,
    #[error("a save is already in progress")]
    Busy,
    #[error("no submission endpoint is configured")]
    NotConfigured,
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReceipt {
    pub code: String,
    pub quantity: Quantity,
}

pub struct ScanController<E: ScanEngine> {
    session: Mutex<ScanSession<E>>,
    enumerator: Arc<dyn DeviceEnumerator>,
    submitter: Option<SubmissionClient>,
    status: StatusBoard,
    timings: PipelineTimings,
    camera_override: Option<String>,
    formats: Vec<BarcodeFormat>,
    pending_stage: Mutex<Option<watch::Sender<bool>>>,
    submitting: AtomicBool,
}

impl<E: ScanEngine + 'static> ScanController<E> {
    pub fn new(
        engine: E,
        gate: ScanGate,
        enumerator: Arc<dyn DeviceEnumerator>,
        submitter: Option<SubmissionClient>,
        timings: PipelineTimings,
        camera_override: Option<String>,
    ) -> Self {
        Self {
            session: Mutex::new(ScanSession::new(engine, gate)),
            enumerator,
            submitter,
            status: StatusBoard::default(),
            timings,
            camera_override,
            formats: SUPPORTED_FORMATS.to_vec(),
            pending_stage: Mutex::new(None),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    pub async fn status(&self) -> ScannerStatus {
        self.session.lock().await.status()
    }

    pub async fn select_camera(&self) -> CameraSelection {
        if let Some(device) = &self.camera_override {
            return CameraSelection::device(device);
        }
        select_from_enumeration(self.enumerator.enumerate().await)
    }

    pub async fn camera_report(&self) -> ProbeReport {
        let mut report = probe_report(self.enumerator.as_ref()).await;
        if let Some(device) = &self.camera_override {
            report.selection = CameraSelection::device(device);
        }
        report
    }

    /// Posts the initial readiness message.
    pub async fn announce_ready(&self) {
        let has_camera = self
            .enumerator
            .enumerate()
            .await
            .map(|devices| devices.iter().any(|device| device.is_video_input()))
            .unwrap_or(false);
        if has_camera || self.camera_override.is_some() {
            self.status.post(StatusKind::Success, "Ready to scan").await;
        } else {
            self.status
                .post(StatusKind::Info, "No camera detected yet; check permissions")
                .await;
        }
    }

    /// User start. Supersedes any resume that is still pending.
    pub async fn start_scanning(self: &Arc<Self>) -> Result<ScannerStatus, StartError> {
        self.cancel_pending().await;
        self.begin().await
    }

    async fn begin(self: &Arc<Self>) -> Result<ScannerStatus, StartError> {
        self.status.post(StatusKind::Info, "Starting camera...").await;
        let selection = self.select_camera().await;

        let mut session = self.session.lock().await;
        let started = match session.start(&selection, &self.formats).await {
            Ok(started) => started,
            Err(cause) => {
                let category = StartErrorCategory::classify(&format!("{cause:#}"));
                error!("failed to start scanner ({category:?}): {cause:#}");
                self.status
                    .post(StatusKind::Error, category.user_message())
                    .await;
                return Err(StartError { category, cause });
            }
        };

        if let Some(ScanEvents { generation, events }) = started {
            info!("scanner started with {selection:?} (generation {generation})");
            tokio::spawn(self.clone().run_capture(generation, events));
            tokio::spawn(self.clone().autofocus_after_start(generation));
            self.status
                .post(StatusKind::Success, "Scanner active! Point at a code...")
                .await;
        }
        Ok(session.status())
    }

    pub async fn stop_scanning(&self) -> Result<ScannerStatus> {
        self.cancel_pending().await;
        let mut session = self.session.lock().await;
        let was_scanning = session.is_scanning();
        session.stop().await?;
        if was_scanning {
            info!("scanner stopped by user");
            self.status.post(StatusKind::Info, "Scanner stopped.").await;
        }
        Ok(session.status())
    }

    async fn run_capture(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Decoded { decoded_text, format } => {
                    debug!("decoded {format:?}: {decoded_text:?}");
                    if let Some(Decision::Accept(_)) = self.handle_decode(&decoded_text).await {
                        return;
                    }
                }
                EngineEvent::DecodeError(message) => {
                    if is_reportable_decode_error(&message) {
                        debug!("scan error: {message}");
                    }
                }
            }
        }

        self.session.lock().await.engine_closed(generation).await;
    }

    /// Runs one decode through the gate. On acceptance the release stage is
    /// scheduled after the grace delay.
    pub async fn handle_decode(self: &Arc<Self>, raw_text: &str) -> Option<Decision> {
        let decision = {
            let mut session = self.session.lock().await;
            session.on_decoded(raw_text, Instant::now()).await
        };

        if let Some(Decision::Accept(code)) = &decision {
            info!("stage {:?}: {code}", PipelineStage::Pausing);
            self.status
                .post(StatusKind::Success, format!("Code detected: {code}"))
                .await;
            let cancel = self.arm_stage().await;
            tokio::spawn(self.clone().release_after_grace(code.clone(), cancel));
        }
        decision
    }

    async fn release_after_grace(self: Arc<Self>, code: String, cancel: watch::Receiver<bool>) {
        sleep(self.timings.pause_grace).await;
        if is_cancelled(&cancel, PipelineStage::Releasing) {
            return;
        }

        if self.session.lock().await.release(&code).await {
            info!("stage {:?}: {code}", PipelineStage::AwaitingConfirmation);
        } else {
            debug!("release of {code} skipped, session moved on");
        }
    }

    /// Submits the pending code with the entered quantity. On success the
    /// confirmation closes and scanning resumes after the configured delays.
    pub async fn confirm(self: &Arc<Self>, quantity: &str) -> Result<SaveReceipt, ConfirmError> {
        let quantity: Quantity = match quantity.parse() {
            Ok(quantity) => quantity,
            Err(err) => {
                self.status
                    .post(StatusKind::Error, "Enter a valid quantity!")
                    .await;
                return Err(ConfirmError::from(err));
            }
        };

        let code = self
            .session
            .lock()
            .await
            .pending_code()
            .map(str::to_string)
            .ok_or(ConfirmError::NothingPending)?;
        let submitter = self
            .submitter
            .as_ref()
            .ok_or(ConfirmError::NotConfigured)?;

        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(ConfirmError::Busy);
        }
        info!("stage {:?}: {code} x{quantity}", PipelineStage::Submitting);
        let saved = submitter.save(&code, quantity).await;
        self.submitting.store(false, Ordering::SeqCst);

        if let Err(err) = saved {
            // The code stays pending so the user can retry.
            error!("failed to save {code}: {err}");
            self.status
                .post(StatusKind::Error, format!("Error: {err}"))
                .await;
            return Err(ConfirmError::from(err));
        }

        self.status
            .post(
                StatusKind::Success,
                format!("Saved! {code} - Qty: {quantity}"),
            )
            .await;
        {
            let mut session = self.session.lock().await;
            if session.pending_code() == Some(code.as_str()) {
                session.clear_pending();
            }
        }

        let cancel = self.arm_stage().await;
        let controller = self.clone();
        tokio::spawn(async move {
            sleep(controller.timings.save_close).await;
            if is_cancelled(&cancel, PipelineStage::Closing) {
                return;
            }
            sleep(controller.timings.resume_after_save).await;
            controller.resume(cancel).await;
        });

        Ok(SaveReceipt { code, quantity })
    }

    /// Dismisses the pending code without saving and resumes scanning after
    /// the cancel delay.
    pub async fn dismiss(self: &Arc<Self>) -> Result<Option<String>> {
        let code = {
            let mut session = self.session.lock().await;
            session.stop().await?;
            session.clear_pending()
        };
        if let Some(code) = &code {
            info!("confirmation of {code} dismissed");
        }

        let cancel = self.arm_stage().await;
        let controller = self.clone();
        tokio::spawn(async move {
            sleep(controller.timings.resume_after_cancel).await;
            controller.resume(cancel).await;
        });
        Ok(code)
    }

    async fn resume(self: &Arc<Self>, cancel: watch::Receiver<bool>) {
        if is_cancelled(&cancel, PipelineStage::Resuming) {
            return;
        }
        info!("stage {:?}", PipelineStage::Resuming);
        if let Err(err) = self.begin().await {
            warn!("failed to resume scanning: {err}: {:#}", err.cause);
        }
    }

    async fn autofocus_after_start(self: Arc<Self>, generation: u64) {
        sleep(self.timings.autofocus_delay).await;

        let session = self.session.lock().await;
        if !session.is_active() || session.generation() != generation {
            return;
        }

        let capabilities = match session.focus_capabilities().await {
            Ok(capabilities) => capabilities,
            Err(err) => {
                debug!("focus capabilities unavailable: {err:#}");
                return;
            }
        };
        let Some(request) = negotiate_autofocus(capabilities) else {
            debug!("device exposes no autofocus control");
            return;
        };
        match session.apply_focus(request).await {
            Ok(()) => info!("autofocus enabled: {request:?}"),
            Err(err) => debug!("could not enable autofocus: {err:#}"),
        }
    }

    /// Cycles the focus mode to make the lens refocus. Returns `false` when
    /// the device has no focus modes to cycle.
    pub async fn force_focus(&self) -> Result<bool> {
        let capabilities = {
            let session = self.session.lock().await;
            if !session.is_active() {
                bail!("scanner is not active");
            }
            session.focus_capabilities().await?
        };

        let steps = force_focus_sequence(capabilities);
        if steps.is_empty() {
            return Ok(false);
        }
        for (index, request) in steps.into_iter().enumerate() {
            if index > 0 {
                sleep(self.timings.focus_cycle_pause).await;
            }
            self.session.lock().await.apply_focus(request).await?;
        }

        info!("focus cycle forced");
        self.status.post(StatusKind::Info, "Adjusting focus...").await;
        Ok(true)
    }

    /// Pings the submission endpoint and reports the outcome on the status
    /// board.
    pub async fn test_connection(&self) -> bool {
        let Some(submitter) = &self.submitter else {
            self.status
                .post(StatusKind::Error, "No submission endpoint configured")
                .await;
            return false;
        };

        self.status
            .post(StatusKind::Info, "Testing connection to server...")
            .await;
        match submitter.ping().await {
            Ok(_) => {
                self.status
                    .post(StatusKind::Success, "Connection to server OK!")
                    .await;
                true
            }
            Err(err) => {
                warn!("submission endpoint ping failed: {err}");
                self.status
                    .post(StatusKind::Error, format!("Connection failed: {err}"))
                    .await;
                false
            }
        }
    }

    /// Replaces the pending-stage flag, cancelling whatever held it before.
    async fn arm_stage(&self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        if let Some(previous) = self.pending_stage.lock().await.replace(tx) {
            let _ = previous.send(true);
        }
        rx
    }

    async fn cancel_pending(&self) {
        if let Some(pending) = self.pending_stage.lock().await.take() {
            let _ = pending.send(true);
        }
    }
}

fn is_cancelled(cancel: &watch::Receiver<bool>, stage: PipelineStage) -> bool {
    let cancelled = *cancel.borrow();
    if cancelled {
        info!("pipeline cancelled before stage {stage:?}");
    }
    cancelled
}
