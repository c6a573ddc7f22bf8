use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Pausing,
    /// Engine released; an accepted code waits for confirmation.
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerStatus {
    pub state: SessionState,
    pub device: Option<String>,
    pub pending_code: Option<String>,
}
