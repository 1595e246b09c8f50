// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - CH32V003 target objects and routines
//!
//! The Target owns the SWIO link.  Everything that touches the link runs in
//! the Target task, either as a [`Request`] from the transport or UART
//! tasks, or from the periodic tick which drives the flasher and the
//! terminal.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Duration, Instant, Timer};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use static_cell::make_static;

use swiofrog_swio::bin::Api;
use swiofrog_swio::config::Settings;
use swiofrog_swio::terminal::TerminalOutput;
use swiofrog_swio::{DebugInterface, SwioProtocol};

use crate::pin::{CycleDelay, GpioPin};
use crate::transport::{OUTBOUND, Outbound};
use crate::uart::UART_TX;

pub(crate) mod request;
pub(crate) mod response;

pub(crate) use request::{Command, Request};
pub(crate) use response::Response;

/// Number of requests to this Target object that can be queued.
pub const REQUEST_CHANNEL_SIZE: usize = 2;

/// The SWIO link, as driven by this firmware
pub(crate) type Link = SwioProtocol<GpioPin<'static>, CycleDelay>;

// How often the flasher and terminal are run when there are no requests.
const TARGET_TICK_DURATION: Duration = Duration::from_millis(1);

// Log a count of output dropped because the host isn't reading every this
// many drops.
const DROPPED_LOG_INTERVAL: u32 = 100;

/// Task to run target operations
#[embassy_executor::task]
pub(crate) async fn task(target: &'static mut Target) -> ! {
    info!("Exec:  Target task started");

    loop {
        match select(
            target.request_receiver.receive(),
            Timer::after(TARGET_TICK_DURATION),
        )
        .await
        {
            Either::First(request) => target.handle_request(request),
            Either::Second(_) => target.tick(),
        }
    }
}

pub(crate) struct Target {
    debug: DebugInterface<Link>,
    api: Api,
    request_receiver:
        Receiver<'static, CriticalSectionRawMutex, Request, REQUEST_CHANNEL_SIZE>,
    request_sender: Sender<'static, CriticalSectionRawMutex, Request, REQUEST_CHANNEL_SIZE>,
    dropped: u32,
}

impl Target {
    /// Creates the Target.
    ///
    /// Arguments:
    /// - `settings`: The runtime settings to start with.
    /// - `swio_pin`: The pin connected to the target's SWIO pin.
    /// - `power_pin`: The pin switching the target's power, if fitted.
    pub(crate) fn new(
        settings: Settings,
        swio_pin: GpioPin<'static>,
        power_pin: Option<GpioPin<'static>>,
    ) -> Self {
        let link = SwioProtocol::new(swio_pin, CycleDelay::new(), settings.t1coeff);
        let link = match power_pin {
            Some(power) => link.with_power_pin(power),
            None => link,
        };
        let mut debug = DebugInterface::new(link);

        // The pins are peripherals taken at startup, so can't be changed
        let api = Api::new(settings).with_fixed_pins();
        api.configure(&mut debug);

        let channel = make_static!(Channel::<
            CriticalSectionRawMutex,
            Request,
            REQUEST_CHANNEL_SIZE,
        >::new());

        Self {
            debug,
            api,
            request_receiver: channel.receiver(),
            request_sender: channel.sender(),
            dropped: 0,
        }
    }

    pub(crate) fn request_sender(
        &self,
    ) -> Sender<'static, CriticalSectionRawMutex, Request, REQUEST_CHANNEL_SIZE> {
        self.request_sender
    }

    fn handle_request(&mut self, request: Request) {
        let now = Instant::now();
        let response = match request.command {
            Command::Line(line) => {
                Response::Reply(self.api.handle_line(&line, &mut self.debug, now))
            }
            Command::Upload { data, is_final } => {
                match self.api.upload(&data, is_final, now) {
                    Ok(event) => Response::Event(event),
                    Err(reply) => Response::Reply(reply),
                }
            }
            Command::UartInput(bytes) => {
                self.api.uart_input(&bytes, now);
                Response::Done
            }
        };
        request.response_signal.signal(response);
    }

    // Runs the flasher and the terminal, and queues what they produce.
    // Output is dropped rather than blocking the link when the host isn't
    // reading.
    fn tick(&mut self) {
        let now = Instant::now();

        if let Some(event) = self.api.control_step(&mut self.debug, now) {
            self.send(Outbound::Event(event));
        }

        for output in self.api.terminal_step(&mut self.debug, now) {
            match output {
                TerminalOutput::Text(text) => self.send(Outbound::Terminal(text)),
                TerminalOutput::Event(event) => self.send(Outbound::Event(event)),
                TerminalOutput::Uart(keys) => {
                    if UART_TX.try_send(keys).is_err() {
                        warn!("Error: UART busy, keystrokes dropped");
                    }
                }
            }
        }
    }

    fn send(&mut self, outbound: Outbound) {
        if OUTBOUND.try_send(outbound).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            if self.dropped % DROPPED_LOG_INTERVAL == 1 {
                debug!("Note:  Host not reading, {} lines dropped", self.dropped);
            }
        }
    }
}
