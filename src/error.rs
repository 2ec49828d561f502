use std::io;

use thiserror::Error;

/// Errors returned by every fallible operation in this crate.
///
/// Background workers never panic the process on failure; they stop
/// themselves and park the error where [`crate::pwm::PwmHandle::take_fault`]
/// (or the equivalent accessor) can pick it up.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve pin identifier {0:?} with the {1} numbering")]
    UnresolvedPin(String, &'static str),
    #[error("pin {0} is not set up; call setup() first")]
    NotSetup(u32),
    #[error("pin {0} has no edge detection attached; call add_event_detect() first")]
    NotAttached(u32),
    #[error("pin {0} already has edge detection attached; call remove_event_detect() first")]
    AlreadyAttached(u32),
    #[error("invalid pin state: {0}")]
    InvalidState(String),
    #[error("invalid level value: {0:?}")]
    InvalidValue(String),
    #[error("invalid PWM frequency: {0} Hz (must be > 0)")]
    InvalidFrequency(f64),
    #[error("invalid PWM duty cycle: {0} (expected 0-100)")]
    InvalidDutyCycle(f64),
    #[error("pin {pin}: {what} failed: {source}")]
    Io {
        pin: u32,
        what: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
