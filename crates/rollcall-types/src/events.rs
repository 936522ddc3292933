use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{annotation::AnnotationSet, attendance::AttendanceRow};

/// Envelope for everything the kiosk reports to its display surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    /// An annotation set passed the staleness guard and was redrawn.
    Overlay(OverlayEvent),
    Attendance(AttendanceRow),
    Activity(ActivityLine),
    Status(StatusMessage),
    Connection(ConnectionState),
    /// Contents of the identity input after the kiosk changed it.
    IdentityInput(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    Ready,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEvent {
    pub annotations: AnnotationSet,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLine {
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Info,
    Success,
    Error,
}

/// Long-lived condition a status line reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    Camera,
    Channel,
}

/// Operator-facing status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub text: String,
    pub tone: Tone,
    /// An error about a condition stays up until a non-error status about
    /// the same condition clears it. Other statuses are replaced by the
    /// next one.
    pub condition: Option<Condition>,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Info,
            condition: None,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Success,
            condition: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Error,
            condition: None,
        }
    }

    pub fn about(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// The condition this status puts into a failed state.
    pub fn raises(&self) -> Option<Condition> {
        self.condition.filter(|_| self.tone == Tone::Error)
    }

    /// The condition this status reports as recovered.
    pub fn clears(&self) -> Option<Condition> {
        self.condition.filter(|_| self.tone != Tone::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { reason: String },
}

impl KioskEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}
