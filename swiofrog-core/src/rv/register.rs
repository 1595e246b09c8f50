// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Typed Debug Module register access
//!
//! Each DM register is a zero-sized marker carrying the 7-bit address sent in
//! the SWIO frame and the type its 32 bits decode to.  The access direction
//! is a marker trait, so reading `COMMAND` or writing `DMSTATUS` through
//! `SwioInterface::read_dm_register`/`write_dm_register` does not compile.
//!
//! Markers are declared with [`dm_registers!`](crate::dm_registers) and
//! value types get their `u32` conversions from
//! [`register_value!`](crate::register_value).

/// A Debug Module register reachable by a single SWIO frame.
pub trait DmRegister {
    const ADDRESS: u8;
    const NAME: &'static str;
    type Value;
}

/// Marker: the target answers reads of this register.
pub trait Readable: DmRegister {}

/// Marker: the target accepts writes to this register.
pub trait Writable: DmRegister {}

/// Declare DM register markers.
///
/// ```rust,ignore
/// dm_registers! {
///     /// DMSTATUS
///     DmStatusRegister @ 0x11: DmStatus, Readable;
///     /// DATA0
///     Data0Register @ 0x04: DmData, Readable Writable;
/// }
/// ```
#[macro_export]
macro_rules! dm_registers {
    ($($(#[$meta:meta])* $marker:ident @ $addr:literal : $value:ty, $($access:ident)+;)*) => {
        $(
            $(#[$meta])*
            pub struct $marker;

            impl $crate::rv::register::DmRegister for $marker {
                const ADDRESS: u8 = $addr;
                const NAME: &'static str = stringify!($marker);
                type Value = $value;
            }

            $(impl $crate::rv::register::$access for $marker {})+
        )*
    };
}

/// Conversions and hex `Display` for a `u32` newtype held in a register.
///
/// Values only ever written to the target pass `write_only`, so they can't
/// be built from arbitrary raw words.
#[macro_export]
macro_rules! register_value {
    ($name:ident) => {
        $crate::register_value!($name, write_only);

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                $name(raw)
            }
        }
    };
    ($name:ident, write_only) => {
        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "0x{:08X}", self.0)
            }
        }
    };
}
