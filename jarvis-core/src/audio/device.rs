//! Audio device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an input-capable audio device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Position in the host's device list; the value `/set_mic` accepts.
    pub index: usize,
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Heuristic flag for devices that likely capture system/output audio.
    pub is_loopback_like: bool,
    /// Highest channel count among the device's input configurations.
    pub max_input_channels: u16,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "speakers (",
    "headphones (",
];

/// Best-effort heuristic for loopback/system-output capture devices.
///
/// A loopback input on the same machine hears the assistant's own voice,
/// which defeats the suspend-while-speaking guard.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Render one device as a `/devices` listing line.
pub fn format_device_line(device: &DeviceInfo) -> String {
    let mut line = format!("[{}] {} (in", device.index, device.name);
    if device.is_default {
        line.push_str(", default");
    }
    if device.is_loopback_like {
        line.push_str(", loopback?");
    }
    line.push(')');
    line
}

/// List all input-capable devices on the default host.
///
/// Returns an empty `Vec` if cpal is not available or enumeration fails.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate audio devices: {e}");
            return vec![];
        }
    };

    devices
        .enumerate()
        .filter_map(|(index, device)| {
            let max_input_channels = device
                .supported_input_configs()
                .ok()?
                .map(|c| c.channels())
                .max()?;
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {index}"));
            Some(DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                is_loopback_like: is_loopback_like_name(&name),
                name,
                max_input_channels,
            })
        })
        .collect()
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}
