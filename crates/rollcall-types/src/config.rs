use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, RollcallError};

/// How annotation replies are reconciled against transmitted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationPolicy {
    /// Render a set only when its echoed `seq` is newer than the last
    /// rendered one. Replies without `seq` are dropped.
    #[default]
    SequenceGuard,
    /// Every reply overwrites the overlay. For services that cannot echo
    /// `seq`; out-of-order delivery may briefly show older detections.
    LastReceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Synthetic,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub interval_ms: u64,
    pub jpeg_quality: u8,
    #[serde(default)]
    pub annotation_policy: AnnotationPolicy,
    /// In-flight frames older than this are forgotten.
    pub frame_ttl_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 400,
            jpeg_quality: 80,
            annotation_policy: AnnotationPolicy::SequenceGuard,
            frame_ttl_ms: 5_000,
        }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn frame_ttl(&self) -> Duration {
        Duration::from_millis(self.frame_ttl_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub directory: Option<String>,
    /// Ticks reported as not ready after opening, mimicking a camera that
    /// needs to buffer before the first usable frame.
    #[serde(default)]
    pub warmup_ticks: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            width: 640,
            height: 480,
            directory: None,
            warmup_ticks: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub url: String,
    pub outbound_capacity: usize,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:5000/ws".into(),
            outbound_capacity: 4,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub timeout_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

impl RegistrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Oldest rows are evicted past this many. Unbounded when absent.
    #[serde(default)]
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub log_dir: String,
    #[serde(default)]
    pub activity_log_capacity: Option<usize>,
    /// When set, each redrawn overlay is also written here as a PNG.
    #[serde(default)]
    pub snapshot_dir: Option<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_dir: "logs".into(),
            activity_log_capacity: None,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl KioskConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            RollcallError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            RollcallError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.interval_ms == 0 {
            return Err(RollcallError::Configuration(
                "capture.interval_ms must be greater than zero".into(),
            ));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(RollcallError::Configuration(
                "capture.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(RollcallError::Configuration(
                "source.width and source.height must be greater than zero".into(),
            ));
        }
        if self.source.kind == SourceKind::Directory && self.source.directory.is_none() {
            return Err(RollcallError::Configuration(
                "source.directory is required for the directory source".into(),
            ));
        }
        if !(self.channel.url.starts_with("ws://") || self.channel.url.starts_with("wss://")) {
            return Err(RollcallError::Configuration(
                "channel.url must be a ws:// or wss:// URL".into(),
            ));
        }
        if self.channel.outbound_capacity == 0 {
            return Err(RollcallError::Configuration(
                "channel.outbound_capacity must be greater than zero".into(),
            ));
        }
        if self.channel.reconnect_initial_ms == 0
            || self.channel.reconnect_max_ms < self.channel.reconnect_initial_ms
        {
            return Err(RollcallError::Configuration(
                "channel.reconnect_initial_ms must be >0 and <= reconnect_max_ms".into(),
            ));
        }
        if self.registration.timeout_ms == 0 {
            return Err(RollcallError::Configuration(
                "registration.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.attendance.max_rows == Some(0) {
            return Err(RollcallError::Configuration(
                "attendance.max_rows must be greater than zero when set".into(),
            ));
        }
        if self.ops.activity_log_capacity == Some(0) {
            return Err(RollcallError::Configuration(
                "ops.activity_log_capacity must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}
