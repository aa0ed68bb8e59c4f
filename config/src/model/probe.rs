//! Hardware capability detection.

use async_trait::async_trait;
use errors::ModelError;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// What the host can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HardwareProfile {
    pub cpu_cores: usize,
    pub memory_mb: u64,
    pub gpu: bool,
}

#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn detect(&self) -> Result<HardwareProfile, ModelError>;
}

/// Reads the running host.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    meminfo: PathBuf,
    gpu_devices: Vec<PathBuf>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
            gpu_devices: vec![
                PathBuf::from("/dev/nvidia0"),
                PathBuf::from("/dev/dri/renderD128"),
            ],
        }
    }
}

impl SystemProbe {
    pub fn with_paths(meminfo: PathBuf, gpu_devices: Vec<PathBuf>) -> Self {
        Self {
            meminfo,
            gpu_devices,
        }
    }
}

/// Total memory in MB from `/proc/meminfo` text.
pub fn parse_meminfo(text: &str) -> Option<u64> {
    let line = text.lines().find(|line| line.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib / 1024)
}

#[async_trait]
impl CapabilityProbe for SystemProbe {
    async fn detect(&self) -> Result<HardwareProfile, ModelError> {
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let text = tokio::fs::read_to_string(&self.meminfo)
            .await
            .map_err(|e| ModelError::Detection {
                reason: format!("cannot read {}: {e}", self.meminfo.display()),
            })?;
        let memory_mb = parse_meminfo(&text).ok_or_else(|| ModelError::Detection {
            reason: format!("no MemTotal in {}", self.meminfo.display()),
        })?;

        let mut gpu = false;
        for device in &self.gpu_devices {
            if tokio::fs::try_exists(device).await.unwrap_or(false) {
                gpu = true;
                break;
            }
        }

        let profile = HardwareProfile {
            cpu_cores,
            memory_mb,
            gpu,
        };
        debug!("Detected hardware: {:?}", profile);
        Ok(profile)
    }
}

/// Probe with a fixed answer, for hosts where detection is configured
/// rather than measured.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    result: Result<HardwareProfile, String>,
}

impl StaticProbe {
    pub fn new(profile: HardwareProfile) -> Self {
        Self {
            result: Ok(profile),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            result: Err(reason.into()),
        }
    }
}

#[async_trait]
impl CapabilityProbe for StaticProbe {
    async fn detect(&self) -> Result<HardwareProfile, ModelError> {
        self.result
            .clone()
            .map_err(|reason| ModelError::Detection { reason })
    }
}
