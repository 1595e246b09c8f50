// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Target Request and related types

use alloc::string::String;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::target::Response;

/// A request sent to the Target to get it to perform an operation on
/// behalf of the host or the UART.
pub struct Request {
    pub command: Command,
    pub response_signal: &'static Signal<CriticalSectionRawMutex, Response>,
}

impl Request {
    pub fn new(
        command: Command,
        response_signal: &'static Signal<CriticalSectionRawMutex, Response>,
    ) -> Self {
        Self {
            command,
            response_signal,
        }
    }
}

// Different commands that can be sent to Target as part of a Request
#[derive(Debug)]
pub enum Command {
    // A request line from the host, without its line ending
    Line(String),

    // Part of an upload's payload
    Upload { data: Vec<u8>, is_final: bool },

    // Bytes received from the target's UART
    UartInput(Vec<u8>),
}
