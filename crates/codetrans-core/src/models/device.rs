//! Device and dtype selection for native inference.

use candle_core::{DType, Device};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub device: Device,
    pub kind: DeviceKind,
}

impl DeviceProfile {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            kind: DeviceKind::Cpu,
        }
    }

    /// Select the weight dtype for T5-family checkpoints.
    ///
    /// T5 activations overflow in float16, so half precision is only used
    /// when explicitly asked for, and bfloat16 only on CUDA.
    pub fn select_dtype(&self, requested: Option<&str>) -> DType {
        let dtype = match requested.unwrap_or("") {
            "bfloat16" | "bf16" => match self.kind {
                DeviceKind::Cuda => DType::BF16,
                DeviceKind::Cpu | DeviceKind::Metal => {
                    debug!("bf16 requested on {:?}; using F32", self.kind);
                    DType::F32
                }
            },
            "float16" | "f16" => match self.kind {
                DeviceKind::Cpu => DType::F32,
                _ => {
                    warn!("float16 T5 weights may overflow and produce empty translations");
                    DType::F16
                }
            },
            _ => DType::F32,
        };

        debug!(
            "Selected dtype {:?} for device {:?} (requested: {:?})",
            dtype, self.kind, requested
        );

        dtype
    }
}

pub struct DeviceSelector;

impl DeviceSelector {
    fn try_metal() -> Option<DeviceProfile> {
        let device = std::panic::catch_unwind(|| Device::metal_if_available(0))
            .ok()?
            .ok()?;
        device.is_metal().then_some(DeviceProfile {
            device,
            kind: DeviceKind::Metal,
        })
    }

    fn try_cuda() -> Option<DeviceProfile> {
        let device = std::panic::catch_unwind(|| Device::cuda_if_available(0))
            .ok()?
            .ok()?;
        device.is_cuda().then_some(DeviceProfile {
            device,
            kind: DeviceKind::Cuda,
        })
    }

    pub fn detect() -> DeviceProfile {
        if let Some(profile) = Self::try_cuda() {
            info!("Using CUDA device for inference");
            return profile;
        }

        if let Some(profile) = Self::try_metal() {
            info!("Using Metal device for inference");
            return profile;
        }

        info!("Falling back to CPU for inference");
        DeviceProfile::cpu()
    }

    /// Resolve a device preference (`auto`, `cpu`, `cuda`, `metal`).
    ///
    /// An explicit accelerator that is not available is an error rather than
    /// a silent CPU fallback.
    pub fn detect_with_preference(preference: &str) -> Result<DeviceProfile> {
        match preference.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::detect()),
            "cpu" => Ok(DeviceProfile::cpu()),
            "cuda" | "gpu" => Self::try_cuda().ok_or_else(|| {
                Error::ConfigError("CUDA device requested but not available".to_string())
            }),
            "metal" | "mps" => Self::try_metal().ok_or_else(|| {
                Error::ConfigError("Metal device requested but not available".to_string())
            }),
            other => Err(Error::ConfigError(format!(
                "Unknown device '{}'; expected auto, cpu, cuda or metal",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_preference_returns_cpu() {
        let profile = DeviceSelector::detect_with_preference("cpu").unwrap();
        assert_eq!(profile.kind, DeviceKind::Cpu);
        assert!(profile.device.is_cpu());
    }

    #[test]
    fn detected_kind_matches_device() {
        let profile = DeviceSelector::detect();
        match profile.kind {
            DeviceKind::Cpu => assert!(profile.device.is_cpu()),
            DeviceKind::Metal => assert!(profile.device.is_metal()),
            DeviceKind::Cuda => assert!(profile.device.is_cuda()),
        }
    }

    #[test]
    fn unknown_preference_is_rejected() {
        assert!(matches!(
            DeviceSelector::detect_with_preference("tpu"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn cpu_always_f32() {
        let cpu = DeviceProfile::cpu();
        assert_eq!(cpu.select_dtype(None), DType::F32);
        assert_eq!(cpu.select_dtype(Some("bf16")), DType::F32);
        assert_eq!(cpu.select_dtype(Some("f16")), DType::F32);
    }

    #[test]
    fn cuda_defaults_to_f32_but_honours_bf16() {
        let cuda = DeviceProfile {
            device: Device::Cpu,
            kind: DeviceKind::Cuda,
        };
        assert_eq!(cuda.select_dtype(None), DType::F32);
        assert_eq!(cuda.select_dtype(Some("bf16")), DType::BF16);
    }
}
