use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    camera::{
        focus::{FocusCapabilities, FocusRequest},
        selector::{CameraSelection, VideoConstraint},
        traits::{EngineEvent, ScanEngine},
    },
    core::state::{ScannerStatus, SessionState},
};

use super::{
    formats::BarcodeFormat,
    gate::{Decision, ScanGate, ScanGateState},
};

/// Event stream of one started session, tagged with the session generation
/// so late events from a previous run can be told apart.
#[derive(Debug)]
pub struct ScanEvents {
    pub generation: u64,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Owns the engine and the gate state of the single scan session.
///
/// `Idle → Starting → Active → Pausing → Stopped`; a stopped session holds
/// the accepted code until it is confirmed or dismissed.
pub struct ScanSession<E: ScanEngine> {
    engine: E,
    gate: ScanGate,
    gate_state: ScanGateState,
    state: SessionState,
    device: Option<String>,
    pending_code: Option<String>,
    generation: u64,
}

impl<E: ScanEngine> ScanSession<E> {
    pub fn new(engine: E, gate: ScanGate) -> Self {
        Self {
            engine,
            gate,
            gate_state: ScanGateState::default(),
            state: SessionState::Idle,
            device: None,
            pending_code: None,
            generation: 0,
        }
    }

    /// Starts the engine. Returns `None` when a session is already running,
    /// so repeated start requests are harmless.
    pub async fn start(
        &mut self,
        selection: &CameraSelection,
        formats: &[BarcodeFormat],
    ) -> Result<Option<ScanEvents>> {
        if self.is_scanning() {
            return Ok(None);
        }

        self.state = SessionState::Starting;
        self.pending_code = None;
        let constraint = selection.constraint();
        let events = match self.engine.start(&constraint, formats).await {
            Ok(events) => events,
            Err(err) => {
                self.state = SessionState::Idle;
                self.device = None;
                return Err(err);
            }
        };

        self.device = Some(match constraint {
            VideoConstraint::DeviceId { exact } => exact,
            VideoConstraint::FacingMode(_) => "environment".to_string(),
        });
        self.state = SessionState::Active;
        self.generation += 1;
        Ok(Some(ScanEvents {
            generation: self.generation,
            events,
        }))
    }

    /// Gates a decode. Decodes arriving while the session is not active are
    /// ignored and yield `None`. An acceptance pauses the engine; a failed
    /// pause still moves to `Pausing`, since the release stops the engine
    /// either way.
    pub async fn on_decoded(&mut self, raw_text: &str, now: Instant) -> Option<Decision> {
        if self.state != SessionState::Active {
            debug!("decode ignored while {:?}", self.state);
            return None;
        }

        let decision = self.gate.evaluate(raw_text, now, &mut self.gate_state);
        match &decision {
            Decision::Accept(code) => {
                info!("code accepted: {code}");
                self.state = SessionState::Pausing;
                if let Err(err) = self.engine.pause().await {
                    warn!("engine pause failed: {err:#}");
                }
            }
            Decision::Reject(reason) => debug!("decode rejected ({reason}): {raw_text:?}"),
        }
        Some(decision)
    }

    /// Second half of an acceptance: stops the engine, releases the camera
    /// and parks the code for confirmation. No-op unless still pausing.
    pub async fn release(&mut self, code: &str) -> bool {
        if self.state != SessionState::Pausing {
            return false;
        }

        if let Err(err) = self.engine.stop().await {
            warn!("engine stop failed: {err:#}");
        }
        self.state = SessionState::Stopped;
        self.pending_code = Some(code.to_string());
        true
    }

    /// User stop. A code already waiting for confirmation is kept.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_scanning() {
            return Ok(());
        }

        if let Err(err) = self.engine.stop().await {
            warn!("engine stop failed: {err:#}");
        }
        self.state = SessionState::Idle;
        self.device = None;
        Ok(())
    }

    /// The event stream of `generation` ended without a stop request. The
    /// engine is stopped so it lets go of whatever the exited run still holds.
    pub async fn engine_closed(&mut self, generation: u64) {
        if self.generation != generation || self.state != SessionState::Active {
            return;
        }

        warn!("scanning engine closed unexpectedly");
        if let Err(err) = self.engine.stop().await {
            warn!("engine stop after exit failed: {err:#}");
        }
        self.state = SessionState::Idle;
        self.device = None;
    }

    pub fn pending_code(&self) -> Option<&str> {
        self.pending_code.as_deref()
    }

    /// Drops the pending code after it was saved or dismissed.
    pub fn clear_pending(&mut self) -> Option<String> {
        let code = self.pending_code.take();
        if self.state == SessionState::Stopped {
            self.state = SessionState::Idle;
            self.device = None;
        }
        code
    }

    pub fn is_scanning(&self) -> bool {
        matches!(
            self.state,
            SessionState::Starting | SessionState::Active | SessionState::Pausing
        )
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn gate_state(&self) -> &ScanGateState {
        &self.gate_state
    }

    pub async fn focus_capabilities(&self) -> Result<FocusCapabilities> {
        self.engine.focus_capabilities().await
    }

    pub async fn apply_focus(&self, request: FocusRequest) -> Result<()> {
        self.engine.apply_focus(request).await
    }

    pub fn status(&self) -> ScannerStatus {
        ScannerStatus {
            state: self.state,
            device: self.device.clone(),
            pending_code: self.pending_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::{
        camera::selector::CameraSelection,
        core::state::SessionState,
        scan::{
            formats::SUPPORTED_FORMATS,
            gate::{Decision, RejectReason, ScanGate},
        },
        testing::MockEngine,
    };

    use super::ScanSession;

    const CODE: &str = "7891234567890";

    #[tokio::test]
    async fn start_is_idempotent_while_scanning() {
        let (engine, probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());

        let events = session
            .start(&CameraSelection::device("/dev/video2"), &SUPPORTED_FORMATS)
            .await
            .expect("first start should succeed");
        assert!(events.is_some());
        let again = session
            .start(&CameraSelection::device("/dev/video2"), &SUPPORTED_FORMATS)
            .await
            .expect("second start should succeed");
        assert!(again.is_none());

        assert_eq!(probe.calls(), vec!["start:/dev/video2"]);
        assert_eq!(session.status().device.as_deref(), Some("/dev/video2"));
    }

    #[tokio::test]
    async fn unpinned_selection_starts_environment_facing() {
        let (engine, probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());

        session
            .start(&CameraSelection::None, &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");
        assert_eq!(probe.calls(), vec!["start:environment"]);
        assert_eq!(session.status().device.as_deref(), Some("environment"));
    }

    #[tokio::test]
    async fn failed_start_returns_to_idle() {
        let (engine, _probe) = MockEngine::failing("NotAllowedError: Permission denied");
        let mut session = ScanSession::new(engine, ScanGate::default());

        let err = session
            .start(&CameraSelection::None, &SUPPORTED_FORMATS)
            .await
            .expect_err("start should fail");
        assert!(err.to_string().contains("Permission"));
        assert_eq!(session.status().state, SessionState::Idle);
        assert!(!session.is_scanning());
    }

    #[tokio::test]
    async fn acceptance_pauses_then_release_stops() {
        let (engine, probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");

        let decision = session.on_decoded(CODE, Instant::now()).await;
        assert_eq!(decision, Some(Decision::Accept(CODE.to_string())));
        assert_eq!(session.status().state, SessionState::Pausing);

        // Second frame of the same code while pausing never reaches the gate.
        let late = session.on_decoded(CODE, Instant::now()).await;
        assert_eq!(late, None);

        assert!(session.release(CODE).await);
        assert_eq!(session.status().state, SessionState::Stopped);
        assert_eq!(session.pending_code(), Some(CODE));
        assert_eq!(probe.calls(), vec!["start:cam", "pause", "stop"]);
    }

    #[tokio::test]
    async fn rejected_decodes_keep_scanning() {
        let (engine, probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");

        let decision = session.on_decoded("12345", Instant::now()).await;
        assert_eq!(decision, Some(Decision::Reject(RejectReason::InvalidFormat)));
        assert!(session.is_active());
        assert_eq!(session.gate_state().last_accepted_code(), None);
        assert_eq!(probe.calls(), vec!["start:cam"]);
    }

    #[tokio::test]
    async fn user_stop_during_pause_cancels_release() {
        let (engine, _probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");
        session.on_decoded(CODE, Instant::now()).await;

        session.stop().await.expect("stop should succeed");
        assert!(!session.release(CODE).await);
        assert_eq!(session.pending_code(), None);
        assert_eq!(session.status().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn gate_state_survives_restart() {
        let (engine, _probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        let selection = CameraSelection::device("cam");
        let accepted_at = Instant::now();

        session
            .start(&selection, &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");
        session.on_decoded(CODE, accepted_at).await;
        session.release(CODE).await;
        assert_eq!(session.clear_pending().as_deref(), Some(CODE));

        session
            .start(&selection, &SUPPORTED_FORMATS)
            .await
            .expect("restart should succeed");
        let decision = session.on_decoded(CODE, accepted_at + Duration::from_millis(800)).await;
        assert_eq!(
            decision,
            Some(Decision::Reject(RejectReason::DuplicateWithinWindow))
        );
    }

    #[tokio::test]
    async fn engine_closing_returns_to_idle() {
        let (engine, _probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        let first = session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed")
            .expect("session should start");

        session.engine_closed(first.generation + 1).await;
        assert_eq!(session.status().state, SessionState::Active);

        session.engine_closed(first.generation).await;
        assert_eq!(session.status().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn engine_exit_releases_engine_for_restart() {
        let (engine, probe) = MockEngine::new();
        let mut session = ScanSession::new(engine, ScanGate::default());
        let selection = CameraSelection::device("cam");
        let first = session
            .start(&selection, &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed")
            .expect("session should start");

        probe.exit();
        session.engine_closed(first.generation).await;

        let second = session
            .start(&selection, &SUPPORTED_FORMATS)
            .await
            .expect("restart should succeed");
        assert!(second.is_some());
        assert_eq!(probe.calls(), vec!["start:cam", "stop", "start:cam"]);
    }

    #[tokio::test]
    async fn failed_pause_still_accepts_and_releases() {
        let (engine, probe) = MockEngine::faulty(&["pause"]);
        let mut session = ScanSession::new(engine, ScanGate::default());
        session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");

        let decision = session.on_decoded(CODE, Instant::now()).await;
        assert_eq!(decision, Some(Decision::Accept(CODE.to_string())));
        assert_eq!(session.status().state, SessionState::Pausing);

        assert!(session.release(CODE).await);
        assert_eq!(session.status().state, SessionState::Stopped);
        assert_eq!(probe.calls(), vec!["start:cam", "pause", "stop"]);
    }

    #[tokio::test]
    async fn failed_stop_still_parks_code() {
        let (engine, _probe) = MockEngine::faulty(&["stop"]);
        let mut session = ScanSession::new(engine, ScanGate::default());
        session
            .start(&CameraSelection::device("cam"), &SUPPORTED_FORMATS)
            .await
            .expect("start should succeed");
        session.on_decoded(CODE, Instant::now()).await;

        assert!(session.release(CODE).await);
        assert_eq!(session.status().state, SessionState::Stopped);
        assert_eq!(session.pending_code(), Some(CODE));
    }
}
