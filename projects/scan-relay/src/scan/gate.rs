//! Acceptance of decoded text.
//!
//! Every decode reported by an engine passes through [`ScanGate::evaluate`]:
//! first the barcode policy, then de-duplication against the last accepted
//! code. Only acceptances touch [`ScanGateState`], so a burst of rejected
//! retries never extends the window.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use anyhow::bail;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(2000);

/// Anything longer than this is treated as a free-form QR payload.
const MAX_PRODUCT_CODE_LEN: usize = 13;
/// EAN-8, UPC-A, EAN-13 and EAN-14.
const PRODUCT_CODE_LENGTHS: [usize; 4] = [8, 12, 13, 14];
const LEGACY_MIN_DIGITS: usize = 8;
const LEGACY_MAX_DIGITS: usize = 13;

/// Engine noise emitted for frames in which no symbology matched.
const DECODE_NOISE_MARKERS: [&str; 2] = ["No MultiFormat Readers", "no symbols found"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodePolicy {
    /// Digit strings of product-code length, or any payload longer than 13.
    #[default]
    Canonical,
    /// Digit strings of 8 to 13 digits, or any other non-empty text.
    Legacy,
}

impl BarcodePolicy {
    pub fn is_valid_barcode(self, raw_text: &str) -> bool {
        let code = raw_text.trim();
        if code.is_empty() {
            return false;
        }

        let numeric = code.bytes().all(|b| b.is_ascii_digit());
        let len = code.chars().count();
        match self {
            Self::Canonical => {
                len > MAX_PRODUCT_CODE_LEN || (numeric && PRODUCT_CODE_LENGTHS.contains(&len))
            }
            Self::Legacy => !numeric || (LEGACY_MIN_DIGITS..=LEGACY_MAX_DIGITS).contains(&len),
        }
    }
}

impl FromStr for BarcodePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(Self::Canonical),
            "legacy" => Ok(Self::Legacy),
            other => bail!("unknown barcode policy: {other}"),
        }
    }
}

#[cfg(test)]
pub fn is_valid_barcode(raw_text: &str) -> bool {
    BarcodePolicy::Canonical.is_valid_barcode(raw_text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    InvalidFormat,
    DuplicateWithinWindow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => f.write_str("invalid-format"),
            Self::DuplicateWithinWindow => f.write_str("duplicate-within-window"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "value", rename_all = "snake_case")]
pub enum Decision {
    Accept(String),
    Reject(RejectReason),
}

#[derive(Debug, Clone, Default)]
pub struct ScanGateState {
    last_accepted: Option<(String, Instant)>,
}

impl ScanGateState {
    #[cfg(test)]
    pub fn last_accepted_code(&self) -> Option<&str> {
        self.last_accepted.as_ref().map(|(code, _)| code.as_str())
    }

    #[cfg(test)]
    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted.as_ref().map(|(_, at)| *at)
    }

    /// De-duplication step alone. `code` is trimmed before comparison.
    pub fn admit(&mut self, code: &str, now: Instant, window: Duration) -> Decision {
        let code = code.trim();
        if let Some((last_code, last_at)) = &self.last_accepted {
            if last_code == code && now.saturating_duration_since(*last_at) < window {
                return Decision::Reject(RejectReason::DuplicateWithinWindow);
            }
        }

        self.last_accepted = Some((code.to_string(), now));
        Decision::Accept(code.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanGate {
    policy: BarcodePolicy,
    window: Duration,
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new(BarcodePolicy::Canonical, DEFAULT_DEDUP_WINDOW)
    }
}

impl ScanGate {
    pub fn new(policy: BarcodePolicy, window: Duration) -> Self {
        Self { policy, window }
    }

    pub fn evaluate(&self, raw_text: &str, now: Instant, state: &mut ScanGateState) -> Decision {
        if !self.policy.is_valid_barcode(raw_text) {
            return Decision::Reject(RejectReason::InvalidFormat);
        }
        state.admit(raw_text, now, self.window)
    }
}

/// Whether a per-frame decode failure is worth logging.
pub fn is_reportable_decode_error(message: &str) -> bool {
    let message = message.trim();
    !message.is_empty()
        && !DECODE_NOISE_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
}
