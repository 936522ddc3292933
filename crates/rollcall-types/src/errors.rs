use thiserror::Error;

pub type Result<T, E = RollcallError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("kiosk error: {0}")]
    Kiosk(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Local failures of the registration exchange. None of these put anything
/// on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(String),
    #[error("a registration is already pending")]
    Busy,
    #[error("could not capture a still: {0}")]
    Capture(String),
    #[error("could not send registration: {0}")]
    Transport(String),
}
