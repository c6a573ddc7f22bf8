use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

use super::{
    device::{CameraDevice, DeviceKind},
    selector::{CameraSelection, select_from_enumeration},
    traits::DeviceEnumerator,
};

/// Enumerates V4L2 capture nodes. Each `/dev/videoN` node becomes one device,
/// labelled with the card name `v4l2-ctl` reports for it. Nodes without any
/// capture format (metadata nodes) are reported with [`DeviceKind::Other`].
#[derive(Debug, Clone, Default)]
pub struct V4l2Enumerator;

#[async_trait]
impl DeviceEnumerator for V4l2Enumerator {
    async fn enumerate(&self) -> Result<Vec<CameraDevice>> {
        match v4l2_probe().await {
            Ok(list) if !list.is_empty() => Ok(list),
            _ => fallback_probe_from_dev().await,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub devices: Vec<CameraDevice>,
    pub selection: CameraSelection,
}

pub async fn probe_report(enumerator: &dyn DeviceEnumerator) -> ProbeReport {
    let enumerated = enumerator.enumerate().await;
    let devices = enumerated.as_ref().cloned().unwrap_or_default();
    ProbeReport {
        devices,
        selection: select_from_enumeration(enumerated),
    }
}

async fn v4l2_probe() -> Result<Vec<CameraDevice>> {
    let output = Command::new("v4l2-ctl")
        .arg("--list-devices")
        .output()
        .await?;
    if !output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut devices = Vec::new();
    for (label, paths) in parse_device_groups(&stdout) {
        for path in paths {
            let formats = probe_formats(&path).await.unwrap_or_default();
            let kind = if formats.is_empty() {
                DeviceKind::Other
            } else {
                DeviceKind::VideoInput
            };
            devices.push(CameraDevice {
                device_id: path,
                label: label.clone(),
                kind,
            });
        }
    }

    Ok(devices)
}

/// Groups `v4l2-ctl --list-devices` output into `(card name, device paths)`.
fn parse_device_groups(stdout: &str) -> Vec<(String, Vec<String>)> {
    let mut current_name = String::new();
    let mut current_devices: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for raw in stdout.lines() {
        let line = raw.trim_end();
        if line.is_empty() {
            if !current_name.is_empty() && !current_devices.is_empty() {
                groups.push((current_name.clone(), std::mem::take(&mut current_devices)));
            }
            current_name.clear();
            current_devices.clear();
            continue;
        }

        if raw.starts_with(' ') || raw.starts_with('\t') {
            let value = line.trim();
            if value.starts_with("/dev/video") {
                current_devices.push(value.to_string());
            }
        } else {
            if !current_name.is_empty() && !current_devices.is_empty() {
                groups.push((current_name.clone(), std::mem::take(&mut current_devices)));
            }
            current_name = line.trim_end_matches(':').to_string();
        }
    }
    if !current_name.is_empty() && !current_devices.is_empty() {
        groups.push((current_name, current_devices));
    }

    groups
}

async fn probe_formats(device_path: &str) -> Result<Vec<String>> {
    let output = Command::new("v4l2-ctl")
        .args(["--list-formats", "-d", device_path])
        .output()
        .await?;
    if !output.status.success() {
        return Ok(Vec::new());
    }

    Ok(parse_formats(&String::from_utf8_lossy(&output.stdout)))
}

/// Extracts the quoted fourcc codes from a `--list-formats` listing.
fn parse_formats(stdout: &str) -> Vec<String> {
    let mut formats: Vec<String> = stdout
        .lines()
        .filter_map(|line| {
            let (_, tail) = line.split_once('\'')?;
            let (value, _) = tail.split_once('\'')?;
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .collect();
    formats.sort();
    formats.dedup();
    formats
}

/// Used when `v4l2-ctl` is missing. Labels stay empty, so selection falls
/// through to the positional rules; secondary nodes of a camera (UVC
/// metadata) are kept out of them as [`DeviceKind::Other`].
async fn fallback_probe_from_dev() -> Result<Vec<CameraDevice>> {
    let mut names = Vec::new();
    let mut dir = tokio::fs::read_dir("/dev").await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("video") {
            names.push(name);
        }
    }
    names.sort_by_key(|name| video_index(&format!("/dev/{name}")));

    let mut devices = Vec::with_capacity(names.len());
    for name in names {
        let path = format!("/dev/{name}");
        let sysfs_index =
            tokio::fs::read_to_string(format!("/sys/class/video4linux/{name}/index"))
                .await
                .ok();
        let kind = fallback_kind(sysfs_index.as_deref(), video_index(&path));
        devices.push(CameraDevice {
            device_id: path,
            label: String::new(),
            kind,
        });
    }
    Ok(devices)
}

/// The sysfs `index` of a node is 0 for the primary capture node of a
/// camera. Without sysfs, UVC cameras pair each capture node with the odd
/// metadata node that follows it.
fn fallback_kind(sysfs_index: Option<&str>, node: u32) -> DeviceKind {
    let primary = match sysfs_index.and_then(|raw| raw.trim().parse::<u32>().ok()) {
        Some(index) => index == 0,
        None => node % 2 == 0,
    };
    if primary {
        DeviceKind::VideoInput
    } else {
        DeviceKind::Other
    }
}

fn video_index(path: &str) -> u32 {
    path.trim_start_matches("/dev/video")
        .parse()
        .unwrap_or(u32::MAX)
}
