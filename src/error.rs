//! Error types for the session layer.
//!
//! Errors fall into a few categories:
//!
//! - Capacity errors: every interactive slot is occupied
//! - State errors: an operation was issued in the wrong lifecycle state
//! - Compile errors: the engine rejected submitted code and produced
//!   diagnostics
//! - Usage errors: a malformed argument that never reached the engine
//! - Mode errors: an operation that needs direct engine memory access was
//!   issued against a remote-addressed session

use thiserror::Error;

/// Errors produced by sessions, the slot registry, and the performance
/// thread.
#[derive(Error, Debug)]
pub enum SessionError {
    /// All interactive slots are occupied.
    ///
    /// This is a capacity condition, not a bug: destroy an existing
    /// session to free a slot.
    #[error("no free engine slot available")]
    NoFreeSlot,

    /// The operation is invalid for the current lifecycle state,
    /// e.g. starting an engine that is already rendering.
    #[error("invalid state: {0}")]
    State(String),

    /// The engine rejected submitted orchestra or score code.
    ///
    /// Carries the diagnostic text drained from the engine's message
    /// buffer, so the cause is not lost even if the log is never read.
    #[error("compilation failed:\n{log}")]
    Compile {
        /// Diagnostics accumulated during the failed compile.
        log: String,
    },

    /// A malformed argument was rejected before any engine mutation.
    #[error("usage error: {0}")]
    Usage(String),

    /// The operation requires direct access to a local engine and is not
    /// available while the session forwards to a remote listener.
    #[error("operation not supported for client interface: {0}")]
    UnsupportedInMode(&'static str),

    /// The engine failed to come up, typically because the listen port or
    /// the audio device is already in use.
    #[error("engine failed to start: {0}")]
    ResourceBusy(String),

    /// An opaque failure reported by the engine binding.
    #[error("engine error: {0}")]
    Engine(#[from] anyhow::Error),

    /// A socket error while dispatching to a remote engine.
    #[error("remote dispatch failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        SessionError::State(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        SessionError::Usage(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_carries_log() {
        let err = SessionError::Compile {
            log: "error: syntax error, unexpected T_IDENT".to_string(),
        };
        assert!(err.to_string().contains("unexpected T_IDENT"));
    }

    #[test]
    fn test_engine_error_from_anyhow() {
        let err: SessionError = anyhow::anyhow!("device busy").into();
        assert!(matches!(err, SessionError::Engine(_)));
    }
}
