// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Swiofrog is a tiny programmer and terminal for the WCH CH32V003.
//!
//! swiofrog-core - Core protocol and MCU concepts used by Swiofrog.
//!
//! Designed to be used in conjunction with the `swiofrog-swio` library,
//! which implements the single wire SWIO debug protocol.  This crate only
//! describes the target:
//!
//! - [`rv`] - the debug module register map, abstract commands and the
//!   program buffer micro-programs used for memory access.
//! - [`ch32`] - the CH32V003 memory map, flash controller registers and
//!   identification data.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod ch32;
pub mod rv;

extern crate alloc;

pub use ch32::ChipInfo;
