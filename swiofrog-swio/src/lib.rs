// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog-swio library
//!
//! WCH single wire SWIO debug and programming implementation.
//!
//! This can be used to debug, program, and talk to the WCH CH32V003 (and
//! other parts with the same single wire debug interface) using a single
//! open-drain GPIO.
//!
//! It is `no_std` and hardware agnostic - the GPIO and the delay primitive
//! are injected through the [`protocol::SwioPin`] and
//! [`protocol::PreciseDelay`] traits.  It requires an `alloc`
//! implementation (such as `esp-alloc`).
//!
//! The following diagram shows the key `swiofrog-swio` concepts.
//!
//! ```text
//!   swiofrog Application |  bin::Api  == Transport ==   Host/UI
//! ----------------------   Flasher/TerminalSession   ----------------
//!     DebugInterface      \
//! ----------------------   \
//!     SwioInterface         |--  SwioError
//! ----------------------   /
//!      SwioProtocol       /                          e.g. CH32V003
//! ----------------------                            -----------------
//!    ESP32 GPIO pin      >======================<       SWIO Target
//!                              3.3V SWIO/GND
//! ```
//!
//! * [`DebugInterface`] provides halt/reset control, flash programming and
//!   terminal polling.
//! * [`SwioInterface`] provides word and byte memory access, caching the
//!   program loaded into the target's program buffer between accesses.
//! * [`SwioProtocol`] implements the SWIO wire protocol through
//!   bit-banging.
//!
//! Also included is the server side of the session command protocol,
//! [`bin::Api`], together with the [`flasher::FlasherSession`] and
//! [`terminal::TerminalSession`] state machines it drives.
//!
//! `swiofrog-swio` uses the [`swiofrog_core`] library, which describes the
//! target's debug module and flash controller.

#![cfg_attr(not(test), no_std)]

pub mod bin;
pub mod config;
pub mod debug;
pub mod flash;
pub mod flasher;
pub mod interface;
pub mod protocol;
pub mod terminal;

#[cfg(test)]
pub(crate) mod sim;

#[doc(inline)]
pub use crate::debug::DebugInterface;
#[doc(inline)]
pub use crate::interface::SwioInterface;
#[doc(inline)]
pub use crate::protocol::SwioProtocol;

extern crate alloc;
use alloc::format;
use core::fmt;
use serde::Serialize;

use swiofrog_core::rv::dm::CmdErr;

/// Core error type used by all swiofrog-swio objects
///
/// Each error also has a legacy signed numeric code, [`SwioError::code()`],
/// which is what is reported to users alongside failure messages.
///
/// Methods are provided to make it easier to handle errors:
///
/// - [`SwioError::requires_reinit()`]
/// - [`SwioError::requires_retry()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwioError {
    /// The target did not release the line within the bit read timeout.
    /// Only seen inside the protocol layer - a frame containing a timed out
    /// bit is reported as [`SwioError::BusFault`].
    BitTimeout,

    /// A register read frame failed because one of its bits timed out.
    /// Usually means no target, the target is unpowered, or the link has
    /// lost sync.  Re-initialize the link using
    /// [`DebugInterface::init_link()`].
    BusFault,

    /// The debug module reported an error in ABSTRACTCS after an abstract
    /// command.  The error has already been cleared.
    AbstractCommand(CmdErr),

    /// The flash controller stayed busy for longer than expected.
    FlashBusyTimeout,

    /// The flash controller reported a write protection error.
    FlashWriteProtected,

    /// The flash lock bits were still set after writing the unlock keys.
    FlashUnlockFailed,

    /// An erase failed at the given stage.
    EraseFailed(EraseStage),

    /// The data read back after programming didn't match, even after
    /// retrying.  Contains the address of the failing block.
    VerifyMismatch(u32),

    /// DMSTATUS read back as all zeros or all ones - there is nothing on the
    /// other end of the line.  Contains the value read.
    NoTarget(u32),

    /// The link could not be initialized before a flash operation.
    InitFailed,

    /// The target could not be halted within the allowed number of
    /// attempts.
    HaltTimeout,

    /// Fewer (or more) bytes were uploaded than were declared.
    UploadSizeMismatch { expected: u32, actual: u32 },

    /// A required parameter was not supplied.
    ParameterMissing(&'static str),

    /// A parameter, usually a size or address, is out of range.
    OutOfRange,

    /// Another flasher operation is already in progress.
    SessionBusy,

    /// A flasher session made no progress before its watchdog expired.
    Timeout,

    /// The requested operation is not supported, for example power cycling
    /// without a power control pin.
    Unsupported,

    /// The API was called incorrectly.
    Api,
}

/// The point at which an erase failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseStage {
    /// Waiting for a whole chip erase to complete
    Chip,

    /// Waiting for the flash to become idle before a page erase
    PageIdle,

    /// Waiting for a page erase to complete
    Page,
}

impl SwioError {
    /// Returns the signed numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            SwioError::BitTimeout | SwioError::BusFault => -1,
            SwioError::InitFailed => -2,
            SwioError::FlashBusyTimeout | SwioError::HaltTimeout => -5,
            SwioError::FlashUnlockFailed | SwioError::NoTarget(_) => -9,
            SwioError::EraseFailed(EraseStage::Chip) => -13,
            SwioError::EraseFailed(EraseStage::PageIdle) => -14,
            SwioError::EraseFailed(EraseStage::Page) => -15,
            SwioError::AbstractCommand(_) => -33,
            SwioError::FlashWriteProtected => -44,
            SwioError::VerifyMismatch(_) => -99,
            SwioError::UploadSizeMismatch { .. } => -101,
            SwioError::ParameterMissing(_) => -102,
            SwioError::OutOfRange => -103,
            SwioError::SessionBusy => -104,
            SwioError::Timeout => -105,
            SwioError::Unsupported => -106,
            SwioError::Api => -107,
        }
    }

    /// Returns true if the link's view of the target can no longer be
    /// trusted, and [`DebugInterface::init_link()`] should be called before
    /// anything else.
    pub fn requires_reinit(&self) -> bool {
        matches!(
            self,
            SwioError::BitTimeout
                | SwioError::BusFault
                | SwioError::AbstractCommand(_)
                | SwioError::NoTarget(_)
                | SwioError::InitFailed
        )
    }

    /// Returns true if the error is a transient error, and repeating the
    /// whole operation may succeed.
    pub fn requires_retry(&self) -> bool {
        matches!(
            self,
            SwioError::BitTimeout
                | SwioError::BusFault
                | SwioError::AbstractCommand(_)
                | SwioError::FlashBusyTimeout
                | SwioError::VerifyMismatch(_)
                | SwioError::EraseFailed(_)
                | SwioError::InitFailed
                | SwioError::HaltTimeout
        )
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwioError::BitTimeout => "Bit Timeout",
            SwioError::BusFault => "Bus Fault",
            SwioError::AbstractCommand(_) => "Abstract Command Error",
            SwioError::FlashBusyTimeout => "Flash Busy Timeout",
            SwioError::FlashWriteProtected => "Flash Write Protected",
            SwioError::FlashUnlockFailed => "Flash Unlock Failed",
            SwioError::EraseFailed(_) => "Erase Failed",
            SwioError::VerifyMismatch(_) => "Verify Mismatch",
            SwioError::NoTarget(_) => "No Target",
            SwioError::InitFailed => "Link Init Failed",
            SwioError::HaltTimeout => "Halt Timeout",
            SwioError::UploadSizeMismatch { .. } => "Upload Size Mismatch",
            SwioError::ParameterMissing(_) => "Parameter Missing",
            SwioError::OutOfRange => "Out Of Range",
            SwioError::SessionBusy => "Session Busy",
            SwioError::Timeout => "Timeout",
            SwioError::Unsupported => "Unsupported Operation",
            SwioError::Api => "API Error",
        }
    }
}

impl Serialize for SwioError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwioError", 3)?;

        let kind = match self {
            SwioError::BitTimeout => "bit timeout",
            SwioError::BusFault => "bus fault",
            SwioError::AbstractCommand(_) => "abstract command",
            SwioError::FlashBusyTimeout => "flash busy",
            SwioError::FlashWriteProtected => "flash write protected",
            SwioError::FlashUnlockFailed => "flash unlock",
            SwioError::EraseFailed(_) => "erase",
            SwioError::VerifyMismatch(_) => "verify mismatch",
            SwioError::NoTarget(_) => "no target",
            SwioError::InitFailed => "init failed",
            SwioError::HaltTimeout => "halt timeout",
            SwioError::UploadSizeMismatch { .. } => "upload size mismatch",
            SwioError::ParameterMissing(_) => "parameter missing",
            SwioError::OutOfRange => "out of range",
            SwioError::SessionBusy => "session busy",
            SwioError::Timeout => "timeout",
            SwioError::Unsupported => "unsupported",
            SwioError::Api => "api error",
        };
        state.serialize_field("kind", kind)?;
        state.serialize_field("code", &self.code())?;

        let detail = match self {
            SwioError::AbstractCommand(err) => format!("{err}"),
            SwioError::EraseFailed(stage) => format!("{stage:?}"),
            SwioError::VerifyMismatch(addr) => format!("0x{addr:08X}"),
            SwioError::NoTarget(status) => format!("0x{status:08X}"),
            SwioError::UploadSizeMismatch { expected, actual } => {
                format!("expected {expected}, actual {actual}")
            }
            SwioError::ParameterMissing(name) => format!("{name}"),
            _ => format!(""),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for SwioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwioError::AbstractCommand(err) => write!(f, "{}: {err}", self.as_str()),
            SwioError::EraseFailed(stage) => write!(f, "{}: {stage:?}", self.as_str()),
            SwioError::VerifyMismatch(addr) => write!(f, "{}: 0x{addr:08X}", self.as_str()),
            SwioError::NoTarget(status) => write!(f, "{}: 0x{status:08X}", self.as_str()),
            SwioError::UploadSizeMismatch { expected, actual } => write!(
                f,
                "{}: expected {expected}, actual {actual}",
                self.as_str()
            ),
            SwioError::ParameterMissing(name) => write!(f, "{}: {name}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}
