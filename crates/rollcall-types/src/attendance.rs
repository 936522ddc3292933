use serde::{Deserialize, Serialize};

/// Push notification that one identity was recognized and logged.
///
/// `name` is optional on the wire so that malformed events can be parsed and
/// rejected by the feed instead of failing the whole channel read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub time: String,
}

impl AttendanceEvent {
    pub fn new(name: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            time: time.into(),
        }
    }

    /// Identity with surrounding whitespace removed, `None` when blank.
    pub fn identity(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// One line of the attendance display list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    /// Position in receipt order, starting at 1.
    pub receipt: u64,
    pub name: String,
    /// Local calendar date at receipt, `YYYY-MM-DD`.
    pub date: String,
    /// Time field exactly as delivered by the service.
    pub time: String,
}
