//! In-process stand-ins for the engine, the device provider and the
//! submission endpoint.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, header::CONTENT_TYPE},
    routing::get,
};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{
    camera::{
        device::CameraDevice,
        focus::{FocusCapabilities, FocusRequest},
        selector::VideoConstraint,
        traits::{DeviceEnumerator, EngineEvent, ScanEngine},
    },
    scan::formats::BarcodeFormat,
};

/// Shared view into a [`MockEngine`] after it moved into a session.
#[derive(Clone, Default)]
pub struct EngineProbe {
    calls: Arc<Mutex<Vec<String>>>,
    sender: Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>,
}

impl EngineProbe {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(call.into());
    }

    /// Emits a decode as if the camera had read `text`.
    pub async fn emit(&self, text: &str) -> bool {
        let sender = self.sender.lock().expect("sender lock").clone();
        match sender {
            Some(sender) => sender
                .send(EngineEvent::Decoded {
                    decoded_text: text.to_string(),
                    format: None,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Ends the event stream as if the engine process exited on its own.
    pub fn exit(&self) {
        self.sender.lock().expect("sender lock").take();
    }
}

pub struct MockEngine {
    probe: EngineProbe,
    fail_start: Option<String>,
    faults: Vec<&'static str>,
    running: bool,
    focus: FocusCapabilities,
}

impl MockEngine {
    pub fn new() -> (Self, EngineProbe) {
        let probe = EngineProbe::default();
        let engine = Self {
            probe: probe.clone(),
            fail_start: None,
            faults: Vec::new(),
            running: false,
            focus: FocusCapabilities {
                continuous: true,
                ..Default::default()
            },
        };
        (engine, probe)
    }

    pub fn failing(message: &str) -> (Self, EngineProbe) {
        let (mut engine, probe) = Self::new();
        engine.fail_start = Some(message.to_string());
        (engine, probe)
    }

    /// Engine whose `pause` and/or `stop` calls fail after being recorded.
    pub fn faulty(faults: &[&'static str]) -> (Self, EngineProbe) {
        let (mut engine, probe) = Self::new();
        engine.faults = faults.to_vec();
        (engine, probe)
    }

    fn check_fault(&self, call: &str) -> Result<()> {
        if self.faults.contains(&call) {
            bail!("{call} failed");
        }
        Ok(())
    }
}

#[async_trait]
impl ScanEngine for MockEngine {
    async fn start(
        &mut self,
        constraint: &VideoConstraint,
        _formats: &[BarcodeFormat],
    ) -> Result<mpsc::Receiver<EngineEvent>> {
        let target = match constraint {
            VideoConstraint::DeviceId { exact } => exact.clone(),
            VideoConstraint::FacingMode(_) => "environment".to_string(),
        };
        if let Some(message) = &self.fail_start {
            bail!("{message}");
        }
        if self.running {
            bail!("scanner already running");
        }

        self.probe.record(format!("start:{target}"));
        self.running = true;
        let (tx, rx) = mpsc::channel(8);
        *self.probe.sender.lock().expect("sender lock") = Some(tx);
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<()> {
        self.probe.record("pause");
        self.check_fault("pause")
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.record("stop");
        self.check_fault("stop")?;
        self.running = false;
        self.probe.sender.lock().expect("sender lock").take();
        Ok(())
    }

    async fn focus_capabilities(&self) -> Result<FocusCapabilities> {
        Ok(self.focus)
    }

    async fn apply_focus(&self, request: FocusRequest) -> Result<()> {
        self.probe.record(format!("focus:{request:?}"));
        Ok(())
    }
}

pub struct StaticEnumerator(pub Result<Vec<CameraDevice>, String>);

#[async_trait]
impl DeviceEnumerator for StaticEnumerator {
    async fn enumerate(&self) -> Result<Vec<CameraDevice>> {
        self.0.clone().map_err(|message| anyhow!(message))
    }
}

pub async fn spawn_endpoint(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, router).await.expect("serve endpoint") });
    Url::parse(&format!("http://{addr}/exec")).expect("endpoint url")
}

type Seen = Arc<Mutex<Vec<Value>>>;

/// Submission endpoint that records every request and answers success.
pub struct FakeEndpoint {
    url: Url,
    seen: Seen,
}

impl FakeEndpoint {
    pub async fn accepting() -> Self {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route("/exec", get(record_query).post(record_post))
            .with_state(seen.clone());
        let url = spawn_endpoint(router).await;
        Self { url, seen }
    }

    pub fn url(&self) -> Url {
        self.url.clone()
    }

    pub fn requests(&self) -> Vec<Value> {
        self.seen.lock().expect("seen lock").clone()
    }

    pub fn last_request(&self) -> Value {
        self.requests().pop().expect("endpoint should have a request")
    }
}

async fn record_query(
    State(seen): State<Seen>,
    Query(fields): Query<HashMap<String, String>>,
) -> Json<Value> {
    seen.lock()
        .expect("seen lock")
        .push(json!({"method": "GET", "fields": fields}));
    Json(json!({"success": true}))
}

async fn record_post(State(seen): State<Seen>, headers: HeaderMap, body: String) -> Json<Value> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let entry = if is_json {
        let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        json!({"method": "POST json", "body": body})
    } else {
        let url = Url::parse(&format!("http://form.local/?{body}")).expect("form body");
        let fields: HashMap<String, String> = url.query_pairs().into_owned().collect();
        json!({"method": "POST form", "fields": fields})
    };
    seen.lock().expect("seen lock").push(entry);
    Json(json!({"success": true}))
}
