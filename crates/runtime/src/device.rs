//! Device selection for GPU acceleration.
//!
//! This module provides automatic device selection with fallback:
//! Metal (Apple Silicon) → CUDA (NVIDIA) → CPU

use candle_core::Device;
use tracing::info;

use tts_core::{ComputeClass, DevicePreference, TtsError, TtsResult};

/// Select the best available device based on preference and compiled features.
///
/// # Returns
/// * `Ok((Device, ComputeClass))` - Selected device and its class
/// * `Err` - If the preferred device is not available
pub fn select_device(preference: DevicePreference) -> TtsResult<(Device, ComputeClass)> {
    let device = match preference {
        DevicePreference::Cpu => {
            info!("Using CPU device (forced)");
            Device::Cpu
        }
        DevicePreference::Metal => select_metal()?,
        DevicePreference::Cuda => select_cuda()?,
        DevicePreference::Auto => select_auto(),
    };
    let class = compute_class(&device);
    Ok((device, class))
}

/// Classify a device.
pub fn compute_class(device: &Device) -> ComputeClass {
    match device {
        Device::Cpu => ComputeClass::General,
        _ => ComputeClass::Accelerated,
    }
}

/// Check that this build can honour the preference at all.
///
/// Runs before any input is read; it does not initialize a device.
pub fn check_backend(preference: DevicePreference) -> TtsResult<()> {
    match preference {
        DevicePreference::Auto | DevicePreference::Cpu => Ok(()),
        DevicePreference::Cuda if cfg!(feature = "cuda") => Ok(()),
        DevicePreference::Metal if cfg!(feature = "metal") => Ok(()),
        DevicePreference::Cuda => Err(TtsError::device(
            "CUDA backend not compiled in; rebuild with --features cuda",
        )),
        DevicePreference::Metal => Err(TtsError::device(
            "Metal backend not compiled in; rebuild with --features metal",
        )),
    }
}

/// Automatically select the best available device.
fn select_auto() -> Device {
    // Try Metal first (Apple Silicon)
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Auto-selected Metal GPU (Apple Silicon)");
                return device;
            }
            Err(e) => {
                tracing::warn!("Metal GPU not available: {}", e);
            }
        }
    }

    // Try CUDA (NVIDIA)
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Auto-selected CUDA GPU (NVIDIA)");
                return device;
            }
            Err(e) => {
                tracing::warn!("CUDA GPU not available: {}", e);
            }
        }
    }

    info!("Using CPU device (no GPU available)");
    Device::Cpu
}

fn select_metal() -> TtsResult<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal GPU (Apple Silicon)");
                Ok(device)
            }
            Err(e) => Err(TtsError::device(format!(
                "Metal GPU requested but not available: {}",
                e
            ))),
        }
    }

    #[cfg(not(feature = "metal"))]
    {
        Err(TtsError::device(
            "Metal GPU requested but 'metal' feature not enabled",
        ))
    }
}

fn select_cuda() -> TtsResult<Device> {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU (NVIDIA)");
                Ok(device)
            }
            Err(e) => Err(TtsError::device(format!(
                "CUDA GPU requested but not available: {}",
                e
            ))),
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        Err(TtsError::device(
            "CUDA GPU requested but 'cuda' feature not enabled",
        ))
    }
}

/// Get device name for logging/display.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA GPU",
        Device::Metal(_) => "Metal GPU",
    }
}
