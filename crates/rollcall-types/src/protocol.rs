//! Message catalogue for the kiosk <-> recognition service channel.
//!
//! Every text frame is a JSON envelope `{"event": "<name>", "data": {...}}`.
//! `seq` on frames/results and `request_id` on registrations are the
//! correlation extensions; both are optional inbound so services that do
//! not echo them still parse.

use serde::{Deserialize, Serialize};

use crate::{
    annotation::Detection,
    attendance::AttendanceEvent,
    registration::{RegistrationRequest, RegistrationResponse},
    Result, RollcallError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFrame {
    pub image: String,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResults {
    #[serde(default)]
    pub results: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Client to service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    ProcessFrame(ProcessFrame),
    AddNewPerson(RegistrationRequest),
}

/// Service to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServiceMessage {
    RecognitionResults(RecognitionResults),
    UpdateAttendance(AttendanceEvent),
    AddPersonResponse(RegistrationResponse),
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::ProcessFrame(_) => "process_frame",
            ClientMessage::AddNewPerson(_) => "add_new_person",
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| {
            RollcallError::Protocol(format!("failed to encode {}: {err}", self.event_name()))
        })
    }

    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| RollcallError::Protocol(format!("malformed client message: {err}")))
    }
}

impl ServiceMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServiceMessage::RecognitionResults(_) => "recognition_results",
            ServiceMessage::UpdateAttendance(_) => "update_attendance",
            ServiceMessage::AddPersonResponse(_) => "add_person_response",
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| {
            RollcallError::Protocol(format!("failed to encode {}: {err}", self.event_name()))
        })
    }

    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| RollcallError::Protocol(format!("malformed service message: {err}")))
    }
}
