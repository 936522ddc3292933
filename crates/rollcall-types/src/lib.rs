//! Shared domain types for the rollcall kiosk.

pub mod annotation;
pub mod attendance;
pub mod config;
pub mod events;
pub mod protocol;
pub mod registration;
pub mod telemetry;
pub mod vision;

mod errors;

pub use errors::{RegistrationError, Result, RollcallError};
