use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
    Other,
}

/// One enumerable input device. `label` is empty when the provider could not
/// read a human-readable name for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl CameraDevice {
    #[cfg(test)]
    pub fn video_input(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    pub fn is_video_input(&self) -> bool {
        self.kind == DeviceKind::VideoInput
    }
}

pub fn video_inputs(devices: Vec<CameraDevice>) -> Vec<CameraDevice> {
    devices
        .into_iter()
        .filter(CameraDevice::is_video_input)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{CameraDevice, DeviceKind, video_inputs};

    #[test]
    fn keeps_only_video_inputs_in_order() {
        let devices = vec![
            CameraDevice::video_input("a", "front"),
            CameraDevice {
                device_id: "mic".to_string(),
                label: "Built-in microphone".to_string(),
                kind: DeviceKind::AudioInput,
            },
            CameraDevice::video_input("b", "back"),
        ];

        let ids: Vec<String> = video_inputs(devices)
            .into_iter()
            .map(|device| device.device_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn kind_uses_browser_style_names() {
        let json = serde_json::to_string(&CameraDevice::video_input("a", ""))
            .expect("device should serialize");
        assert!(json.contains("\"kind\":\"videoinput\""));
    }
}
