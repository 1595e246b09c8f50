// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Bridge to the target's UART
//!
//! When the terminal is in UART mode, text from the target's UART is
//! passed to the Target like SWIO terminal output, and keystrokes queued by
//! the host are written out here.

use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::signal::Signal;
use embedded_io_async::{Read, Write};
use esp_hal::Async;
use esp_hal::uart::{UartRx, UartTx};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_swio::terminal::INBOUND_SIZE;

use crate::target::{Command, REQUEST_CHANNEL_SIZE, Request, Response};
use crate::SwiofrogError;

/// Baud rate of the target's UART
pub const UART_BAUD: u32 = 115_200;

// Size of the UART read buffer
const UART_READ_BUF_SIZE: usize = 64;

/// Keystrokes waiting to be written to the target's UART
pub(crate) static UART_TX: Channel<
    CriticalSectionRawMutex,
    heapless::Vec<u8, INBOUND_SIZE>,
    2,
> = Channel::new();

static RESPONSE_SIGNAL: Signal<CriticalSectionRawMutex, Response> = Signal::new();

/// Task reading from the target's UART
#[embassy_executor::task]
pub(crate) async fn rx_task(
    mut rx: UartRx<'static, Async>,
    sender: Sender<'static, CriticalSectionRawMutex, Request, REQUEST_CHANNEL_SIZE>,
) -> ! {
    info!("Exec:  UART RX task started");

    let mut buf = [0u8; UART_READ_BUF_SIZE];
    loop {
        match Read::read(&mut rx, &mut buf).await {
            Ok(0) => {}
            Ok(len) => {
                let bytes: Vec<u8> = buf[..len].to_vec();
                sender
                    .send(Request::new(Command::UartInput(bytes), &RESPONSE_SIGNAL))
                    .await;
                RESPONSE_SIGNAL.wait().await;
            }
            Err(e) => {
                let error = SwiofrogError::Uart;
                warn!("Error: {error} reading: {e:?}");
            }
        }
    }
}

/// Task writing keystrokes to the target's UART
#[embassy_executor::task]
pub(crate) async fn tx_task(mut tx: UartTx<'static, Async>) -> ! {
    info!("Exec:  UART TX task started");

    loop {
        let keys = UART_TX.receive().await;
        trace!("Exec:  Writing {} keystrokes to UART", keys.len());
        if let Err(e) = Write::write_all(&mut tx, &keys).await {
            let error = SwiofrogError::Uart;
            warn!("Error: {error} writing: {e:?}");
        }
    }
}
