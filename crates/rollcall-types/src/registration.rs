use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outgoing `add_new_person` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    /// Encoded still as a data URI.
    pub image: String,
    pub request_id: Uuid,
}

/// Incoming `add_person_response` payload. Services that predate request
/// correlation omit `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

/// Terminal result of one registration exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted { name: String, message: String },
    Rejected { name: String, message: String },
    TimedOut { name: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Outcome::Accepted { name, .. }
            | Outcome::Rejected { name, .. }
            | Outcome::TimedOut { name } => name,
        }
    }

    /// Text surfaced to the operator.
    pub fn message(&self) -> String {
        match self {
            Outcome::Accepted { message, .. } | Outcome::Rejected { message, .. } => {
                message.clone()
            }
            Outcome::TimedOut { name } => {
                format!("No response from the service while registering {name}.")
            }
        }
    }
}
