use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub listen: SocketAddr,
    pub camera_port: u16,
    pub relay_pin: u8,
    pub simulate: bool,
    #[serde(with = "humantime_serde")]
    pub advance_pulse: Duration,
    #[serde(with = "humantime_serde")]
    pub reverse_pulse: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub transfer_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub capture_timeout: Duration,
    pub max_slides: u32,
    pub user_agent: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            camera_port: 5513,
            relay_pin: 2,
            simulate: true,
            advance_pulse: Duration::from_millis(250),
            reverse_pulse: Duration::from_millis(750),
            settle_delay: Duration::from_millis(1500),
            transfer_delay: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(30),
            max_slides: 140,
            user_agent: format!("slide-capture/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Host (IP or name) of the machine running the camera-control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraTarget(String);

impl CameraTarget {
    /// Accepts a bare host; rejects empty input and anything carrying a scheme, path or port.
    pub fn parse(raw: &str) -> Option<Self> {
        let host = raw.trim();
        if host.is_empty()
            || host
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '-'))
        {
            return None;
        }
        Some(Self(host.to_string()))
    }

    pub fn host(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub camera: CameraTarget,
    pub slide_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    InProgress {
        current_slide: u32,
        total_slides: u32,
    },
    Aborted,
    Error {
        message: String,
    },
    Completed,
}

impl ProgressEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::InProgress { .. } => "in_progress",
            ProgressEvent::Aborted => "aborted",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::InProgress { .. })
    }
}

/// A progress event tagged with the run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub run_id: u64,
    /// 1-based position of this frame within its run.
    pub sequence: u64,
    pub event: ProgressEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub camera: CameraTarget,
    pub requested: u32,
    /// Slides whose capture was confirmed by the camera.
    pub captured: u32,
    pub outcome: RunOutcome,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    Idle,
    /// Liveness probe in flight for a start request.
    Preflight,
    Running,
    Reversing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRun {
    pub run_id: u64,
    pub camera: CameraTarget,
    pub total_slides: u32,
    pub current_slide: u32,
    pub abort_requested: bool,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: ControllerPhase,
    pub active: Option<ActiveRun>,
    pub last_run: Option<RunSummary>,
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
