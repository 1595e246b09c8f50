// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Error types
//!
//! Errors from the target itself are [`swiofrog_swio::SwioError`]s, which
//! the Target turns into replies.  These are the firmware's own failures,
//! talking to the host and the target's UART.

use core::fmt;

/// Swiofrog firmware error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwiofrogError {
    /// The host stopped sending part way through a request, or stopped
    /// reading
    Timeout,

    /// A request line was longer than the line buffer
    TooLong,

    /// A request line wasn't valid UTF-8
    Encoding,

    /// Reading from or writing to the host failed
    Transport,

    /// Reading from or writing to the target's UART failed
    Uart,
}

impl fmt::Display for SwiofrogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwiofrogError::Timeout => write!(f, "Timeout"),
            SwiofrogError::TooLong => write!(f, "Line too long"),
            SwiofrogError::Encoding => write!(f, "Invalid encoding"),
            SwiofrogError::Transport => write!(f, "Transport error"),
            SwiofrogError::Uart => write!(f, "UART error"),
        }
    }
}
