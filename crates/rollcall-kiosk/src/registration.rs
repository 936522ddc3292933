//! Single-flight registration of a new identity from a captured still.
//!
//! `Idle -> Pending -> Idle`. A failed validation never leaves `Idle` and
//! never transmits. While `Pending`, further requests are rejected as
//! [`RegistrationError::Busy`]; they are not queued.

use rollcall_types::{
    registration::{Outcome, RegistrationRequest, RegistrationResponse},
    vision::EncodedStill,
    RegistrationError,
};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const EMPTY_IDENTITY: &str = "Please enter a name.";
pub const NO_STILL: &str = "No camera image is available yet. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Pending {
        request_id: Uuid,
        name: String,
        deadline: Instant,
    },
}

#[derive(Debug, Clone)]
pub struct RegistrationExchange {
    state: ExchangeState,
    timeout: Duration,
}

/// Trimmed identity, or the operator-facing validation error.
pub fn validate_identity(identity: &str) -> Result<&str, RegistrationError> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(RegistrationError::Validation(EMPTY_IDENTITY.into()));
    }
    Ok(trimmed)
}

impl RegistrationExchange {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ExchangeState::Idle,
            timeout,
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ExchangeState::Pending { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            ExchangeState::Pending { deadline, .. } => Some(*deadline),
            ExchangeState::Idle => None,
        }
    }

    /// Refuse early when a request is already out, before any still is
    /// captured for the new one.
    pub fn ensure_idle(&self) -> Result<(), RegistrationError> {
        if self.is_pending() {
            return Err(RegistrationError::Busy);
        }
        Ok(())
    }

    /// Validate and move to `Pending`, returning the request to transmit.
    /// `video_dims` are the dimensions of the live feed when the still was
    /// taken; a still of any other size is refused.
    pub fn begin(
        &mut self,
        identity: &str,
        still: Option<EncodedStill>,
        video_dims: Option<(u32, u32)>,
        now: Instant,
    ) -> Result<RegistrationRequest, RegistrationError> {
        self.ensure_idle()?;
        let name = validate_identity(identity)?.to_string();
        let still = match (still, video_dims) {
            (Some(still), Some(dims)) if still.dimensions() == dims => still,
            (Some(still), Some(dims)) => {
                warn!(
                    still = ?still.dimensions(),
                    video = ?dims,
                    "Still does not match the current video dimensions"
                );
                return Err(RegistrationError::Validation(NO_STILL.into()));
            }
            _ => return Err(RegistrationError::Validation(NO_STILL.into())),
        };

        let request_id = Uuid::new_v4();
        info!(%request_id, name = %name, "Registration pending");
        self.state = ExchangeState::Pending {
            request_id,
            name: name.clone(),
            deadline: now + self.timeout,
        };
        Ok(RegistrationRequest {
            name,
            image: still.data_uri,
            request_id,
        })
    }

    /// Match a response against the pending request. Responses without a
    /// `request_id` are attributed to the pending request.
    pub fn complete(&mut self, response: RegistrationResponse) -> Option<Outcome> {
        let ExchangeState::Pending {
            request_id, name, ..
        } = &self.state
        else {
            warn!(
                request_id = ?response.request_id,
                "Ignoring registration response with nothing pending"
            );
            return None;
        };
        if let Some(answered) = response.request_id {
            if answered != *request_id {
                warn!(%answered, pending = %request_id, "Ignoring registration response for another request");
                return None;
            }
        }

        let name = name.clone();
        self.state = ExchangeState::Idle;
        debug!(name = %name, success = response.success, "Registration answered");
        Some(if response.success {
            Outcome::Accepted {
                name,
                message: response.message,
            }
        } else {
            Outcome::Rejected {
                name,
                message: response.message,
            }
        })
    }

    /// Time out the pending request once its deadline has passed. A reply
    /// arriving afterwards is ignored by `complete`.
    pub fn expire(&mut self, now: Instant) -> Option<Outcome> {
        match &self.state {
            ExchangeState::Pending { deadline, name, .. } if now >= *deadline => {
                let name = name.clone();
                warn!(name = %name, "Registration timed out");
                self.state = ExchangeState::Idle;
                Some(Outcome::TimedOut { name })
            }
            _ => None,
        }
    }

    /// Back to `Idle` without an outcome; used when the request could not be
    /// handed to the transport.
    pub fn abort(&mut self) {
        if self.is_pending() {
            debug!("Registration aborted before transmission");
        }
        self.state = ExchangeState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(width: u32, height: u32) -> Option<EncodedStill> {
        Some(EncodedStill {
            data_uri: "data:image/jpeg;base64,AAAA".into(),
            width,
            height,
        })
    }

    fn exchange() -> RegistrationExchange {
        RegistrationExchange::new(Duration::from_secs(15))
    }

    fn response(success: bool, request_id: Option<Uuid>) -> RegistrationResponse {
        RegistrationResponse {
            success,
            message: if success {
                "Alice was added successfully!".into()
            } else {
                "No face could be detected. Please try again.".into()
            },
            request_id,
        }
    }

    #[test]
    fn blank_identity_stays_idle() {
        let mut exchange = exchange();
        let err = exchange
            .begin("  \t", still(640, 480), Some((640, 480)), Instant::now())
            .unwrap_err();
        assert_eq!(err, RegistrationError::Validation(EMPTY_IDENTITY.into()));
        assert_eq!(exchange.state(), &ExchangeState::Idle);
    }

    #[test]
    fn missing_or_mismatched_still_is_a_validation_error() {
        let mut exchange = exchange();
        let now = Instant::now();
        for (image, dims) in [
            (None, Some((640, 480))),
            (still(320, 240), Some((640, 480))),
            (still(640, 480), None),
        ] {
            let err = exchange.begin("Alice", image, dims, now).unwrap_err();
            assert_eq!(err, RegistrationError::Validation(NO_STILL.into()));
            assert!(!exchange.is_pending());
        }
    }

    #[test]
    fn begin_trims_and_goes_pending() {
        let mut exchange = exchange();
        let now = Instant::now();
        let request = exchange
            .begin("  Alice ", still(640, 480), Some((640, 480)), now)
            .expect("valid");
        assert_eq!(request.name, "Alice");
        assert_eq!(exchange.deadline(), Some(now + Duration::from_secs(15)));
        let ExchangeState::Pending { request_id, .. } = exchange.state() else {
            panic!("expected pending");
        };
        assert_eq!(*request_id, request.request_id);
    }

    #[test]
    fn second_request_while_pending_is_busy() {
        let mut exchange = exchange();
        let now = Instant::now();
        let first = exchange
            .begin("Alice", still(640, 480), Some((640, 480)), now)
            .expect("first");
        let err = exchange
            .begin("Bob", still(640, 480), Some((640, 480)), now)
            .unwrap_err();
        assert_eq!(err, RegistrationError::Busy);
        let ExchangeState::Pending { request_id, name, .. } = exchange.state() else {
            panic!("still pending");
        };
        assert_eq!(*request_id, first.request_id);
        assert_eq!(name, "Alice");
    }

    #[test]
    fn matching_response_completes() {
        let mut exchange = exchange();
        let request = exchange
            .begin("Alice", still(640, 480), Some((640, 480)), Instant::now())
            .expect("valid");
        let outcome = exchange
            .complete(response(true, Some(request.request_id)))
            .expect("outcome");
        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "Alice was added successfully!");
        assert!(!exchange.is_pending());
    }

    #[test]
    fn legacy_response_without_id_is_attributed_to_pending() {
        let mut exchange = exchange();
        exchange
            .begin("Alice", still(640, 480), Some((640, 480)), Instant::now())
            .expect("valid");
        let outcome = exchange.complete(response(false, None)).expect("outcome");
        assert_eq!(
            outcome,
            Outcome::Rejected {
                name: "Alice".into(),
                message: "No face could be detected. Please try again.".into(),
            }
        );
    }

    #[test]
    fn foreign_or_unsolicited_responses_are_ignored() {
        let mut exchange = exchange();
        assert!(exchange.complete(response(true, None)).is_none());

        exchange
            .begin("Alice", still(640, 480), Some((640, 480)), Instant::now())
            .expect("valid");
        assert!(exchange
            .complete(response(true, Some(Uuid::new_v4())))
            .is_none());
        assert!(exchange.is_pending());
    }

    #[test]
    fn deadline_times_out_and_late_reply_is_ignored() {
        let mut exchange = exchange();
        let now = Instant::now();
        let request = exchange
            .begin("Alice", still(640, 480), Some((640, 480)), now)
            .expect("valid");

        assert!(exchange.expire(now + Duration::from_secs(14)).is_none());
        let outcome = exchange
            .expire(now + Duration::from_secs(15))
            .expect("timed out");
        assert_eq!(
            outcome,
            Outcome::TimedOut {
                name: "Alice".into()
            }
        );
        assert!(exchange
            .complete(response(true, Some(request.request_id)))
            .is_none());
    }

    #[test]
    fn abort_returns_to_idle() {
        let mut exchange = exchange();
        exchange
            .begin("Alice", still(640, 480), Some((640, 480)), Instant::now())
            .expect("valid");
        exchange.abort();
        assert_eq!(exchange.state(), &ExchangeState::Idle);
    }
}
