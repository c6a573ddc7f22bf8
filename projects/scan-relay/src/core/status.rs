use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

/// Non-error messages disappear after this long.
pub const STATUS_VISIBLE_FOR: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub message: String,
    pub kind: StatusKind,
}

/// Latest user-facing message. Errors stay until replaced.
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: Mutex<Option<(StatusMessage, Instant)>>,
}

impl StatusBoard {
    pub async fn post(&self, kind: StatusKind, message: impl Into<String>) {
        self.post_at(kind, message, Instant::now()).await;
    }

    pub async fn post_at(&self, kind: StatusKind, message: impl Into<String>, now: Instant) {
        let mut latest = self.latest.lock().await;
        *latest = Some((
            StatusMessage {
                message: message.into(),
                kind,
            },
            now,
        ));
    }

    pub async fn visible(&self) -> Option<StatusMessage> {
        self.visible_at(Instant::now()).await
    }

    pub async fn visible_at(&self, now: Instant) -> Option<StatusMessage> {
        let latest = self.latest.lock().await;
        let (message, posted_at) = latest.as_ref()?;
        let expired = now.saturating_duration_since(*posted_at) >= STATUS_VISIBLE_FOR;
        if message.kind != StatusKind::Error && expired {
            return None;
        }
        Some(message.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{StatusBoard, StatusKind};

    #[tokio::test]
    async fn info_messages_hide_after_four_seconds() {
        let board = StatusBoard::default();
        let posted = Instant::now();
        board.post_at(StatusKind::Success, "Saved", posted).await;

        let shown = board
            .visible_at(posted + Duration::from_millis(3999))
            .await
            .expect("message should still be visible");
        assert_eq!(shown.message, "Saved");
        assert!(board.visible_at(posted + Duration::from_secs(4)).await.is_none());
    }

    #[tokio::test]
    async fn errors_persist_until_replaced() {
        let board = StatusBoard::default();
        let posted = Instant::now();
        board.post_at(StatusKind::Error, "Network down", posted).await;
        assert!(board.visible_at(posted + Duration::from_secs(60)).await.is_some());

        board.post_at(StatusKind::Info, "Retrying", posted).await;
        let shown = board.visible_at(posted).await.expect("message visible");
        assert_eq!(shown.kind, StatusKind::Info);
    }
}
