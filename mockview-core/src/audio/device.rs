//! Audio device enumeration for the `--list-devices` flag and for picking a
//! sensible microphone when the user has not configured one.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
    /// Inputs that capture system output (stereo mix, monitors) pick up the
    /// agent's own voice and are never recommended as a microphone.
    pub is_loopback_like: bool,
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "what u hear",
    "what you hear",
    "loopback",
    "monitor of",
    "virtual output",
];

const MIC_KEYWORDS: &[&str] = &["microphone", "mic", "headset", "array", "usb", "webcam"];

pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Higher is a better candidate microphone.
pub fn mic_score(name: &str, is_default: bool) -> i32 {
    let lowered = name.to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if MIC_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if is_default {
        score += 2;
    }
    score
}

/// Mark the best microphone among `devices` (inputs only).
pub fn recommend_input(devices: &mut [DeviceInfo]) {
    let best = devices
        .iter()
        .enumerate()
        .filter(|(_, d)| d.direction == DeviceDirection::Input && !d.is_loopback_like)
        .max_by_key(|(_, d)| mic_score(&d.name, d.is_default))
        .map(|(idx, _)| idx);
    for (idx, device) in devices.iter_mut().enumerate() {
        device.is_recommended = Some(idx) == best;
    }
}

#[cfg(feature = "audio-cpal")]
pub fn list_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let mut list = Vec::new();
    match host.input_devices() {
        Ok(devices) => list.extend(devices.filter_map(|d| d.name().ok()).map(|name| DeviceInfo {
            is_default: default_in.as_deref() == Some(name.as_str()),
            is_loopback_like: is_loopback_like_name(&name),
            direction: DeviceDirection::Input,
            is_recommended: false,
            name,
        })),
        Err(e) => tracing::warn!("failed to enumerate input devices: {e}"),
    }
    match host.output_devices() {
        Ok(devices) => list.extend(devices.filter_map(|d| d.name().ok()).map(|name| DeviceInfo {
            is_default: default_out.as_deref() == Some(name.as_str()),
            is_loopback_like: false,
            direction: DeviceDirection::Output,
            is_recommended: false,
            name,
        })),
        Err(e) => tracing::warn!("failed to enumerate output devices: {e}"),
    }
    recommend_input(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            direction: DeviceDirection::Input,
            is_default,
            is_loopback_like: is_loopback_like_name(name),
            is_recommended: false,
        }
    }

    #[test]
    fn loopback_names_are_detected() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio"));
        assert!(!is_loopback_like_name("MacBook Pro Microphone"));
    }

    #[test]
    fn loopback_default_is_not_recommended() {
        let mut devices = vec![
            input("Stereo Mix (Realtek Audio)", true),
            input("Headset Microphone (USB)", false),
        ];
        recommend_input(&mut devices);
        assert!(!devices[0].is_recommended);
        assert!(devices[1].is_recommended);
    }

    #[test]
    fn outputs_are_never_recommended() {
        let mut devices = vec![DeviceInfo {
            name: "Speakers".into(),
            direction: DeviceDirection::Output,
            is_default: true,
            is_loopback_like: false,
            is_recommended: false,
        }];
        recommend_input(&mut devices);
        assert!(!devices[0].is_recommended);
    }
}
