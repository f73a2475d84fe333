//! An error that carries the process exit code it should cause.
//!
//! Commands return `ExitError` instead of calling `std::process::exit`
//! themselves, so `main` is the only place the process actually terminates.
//!
//! Codes: 0 success, 1 usage, 2 runtime, 3 not found, 4 unauthorized.

use std::fmt;

pub const USAGE: i32 = 1;
pub const RUNTIME: i32 = 2;
pub const NOT_FOUND: i32 = 3;
pub const UNAUTHORIZED: i32 = 4;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(RUNTIME, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND, message)
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<skillforge_checkpoint::CheckpointError> for ExitError {
    fn from(err: skillforge_checkpoint::CheckpointError) -> Self {
        ExitError::runtime(err.to_string())
    }
}

impl From<serde_json::Error> for ExitError {
    fn from(err: serde_json::Error) -> Self {
        ExitError::runtime(err.to_string())
    }
}
