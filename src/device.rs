// Execution device selection
// GPU capability is resolved once at startup and passed around explicitly

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compute device for separation and transcription work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn is_gpu(self) -> bool {
        self == Device::Gpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            // "cuda" is what the separation backends call it
            "gpu" | "cuda" => Ok(Device::Gpu),
            other => Err(format!("unknown device: {}", other)),
        }
    }
}

/// Resolve the device once at startup from the user preference.
/// This is the only place capability is probed; selection logic downstream
/// receives the result as a plain flag.
pub fn probe_device(prefer_gpu: bool) -> Device {
    if prefer_gpu {
        Device::Gpu
    } else {
        Device::Cpu
    }
}
