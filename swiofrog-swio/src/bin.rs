// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog-swio - Session command API
//!
//! See [`swiofrog_bin`] for the line protocol itself.
//!
//! [`Api`] is the server side of the protocol.  It owns the
//! [`FlasherSession`], the [`TerminalSession`] and the runtime
//! [`Settings`], and is driven by its owner in three ways:
//!
//! - [`Api::handle()`] (or [`Api::handle_line()`]) for each request, which
//!   always produces exactly one [`Reply`].
//! - [`Api::upload()`] with each chunk of a binary following `#w`.
//! - [`Api::control_step()`] and [`Api::terminal_step()`] from the owner's
//!   main loop, to run flasher jobs and poll the terminal.
//!
//! The API does no I/O of its own, so the transport is entirely up to the
//! owner.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_bin::{Event, Op, Reply, ReplyCode};
use swiofrog_core::ch32::MAX_BINARY_SIZE;

use crate::SwioError;
use crate::config::{ConfigObserver, Settings};
use crate::debug::{DebugInterface, HaltMode};
use crate::flasher::FlasherSession;
use crate::protocol::SwioLink;
use crate::terminal::{TerminalOutput, TerminalSession};

// Log every X API calls
const API_CALL_LOG_INTERVAL: usize = 1000;

const OK: &str = "OK";
const FLASH_IN_PROGRESS: &str = "Flash in progress";

/// Represents the session command API.
///
/// Create with [`Self::new()`], then call [`Self::configure()`] once the
/// link exists so it picks up the settings.
#[derive(Debug)]
pub struct Api {
    flasher: FlasherSession,
    terminal: TerminalSession,
    settings: Settings,
    pin_change: Option<(u8, Option<u8>)>,
    fixed_pins: bool,

    /// The number of API calls handled by this instance.
    pub api_calls: usize,
}

impl Default for Api {
    fn default() -> Self {
        Api::new(Settings::default())
    }
}

// Reacts to changed settings on behalf of the API
struct SettingsObserver<'a, L: SwioLink> {
    terminal: &'a mut TerminalSession,
    debug: &'a mut DebugInterface<L>,
    pin_change: &'a mut Option<(u8, Option<u8>)>,
}

impl<L: SwioLink> ConfigObserver for SettingsObserver<'_, L> {
    fn on_uart_changed(&mut self, uart: bool) {
        self.terminal.set_uart(uart);
    }

    fn on_pin_changed(&mut self, swio_pin: u8, power_pin: Option<u8>) {
        if !self.terminal.uart() {
            self.terminal.disconnect();
        }
        *self.pin_change = Some((swio_pin, power_pin));
    }

    fn on_timing_changed(&mut self, t1coeff: u32) {
        self.debug.swio_if().link_mut().set_t1coeff(t1coeff);
    }
}

impl Api {
    /// Creates a new instance of the API.
    pub fn new(settings: Settings) -> Self {
        let mut terminal = TerminalSession::new();
        terminal.set_uart(settings.uart);
        Api {
            flasher: FlasherSession::new(),
            terminal,
            settings,
            pin_change: None,
            fixed_pins: false,
            api_calls: 0,
        }
    }

    /// Refuses settings changes to the SWIO and power pins, for hosts whose
    /// pins are fixed when built.
    pub fn with_fixed_pins(mut self) -> Self {
        self.fixed_pins = true;
        self
    }

    /// Pushes the current settings down to the link.
    pub fn configure<L: SwioLink>(&self, debug: &mut DebugInterface<L>) {
        debug.set_wake_sequence(self.settings.wake_sequence);
        debug
            .swio_if()
            .link_mut()
            .set_t1coeff(self.settings.t1coeff);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn flasher(&self) -> &FlasherSession {
        &self.flasher
    }

    pub fn terminal(&self) -> &TerminalSession {
        &self.terminal
    }

    /// Returns the new SWIO and power pins if they have been changed since
    /// the last call.  The link must be rebuilt to use them.
    pub fn take_pin_change(&mut self) -> Option<(u8, Option<u8>)> {
        self.pin_change.take()
    }

    /// The interval at which terminal output is sent to the host.
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.settings.poll_delay_ms as u64)
    }

    /// Parses and handles a single request line.
    ///
    /// Arguments:
    /// - `line`: The request, with or without a line ending.
    /// - `debug`: The target.
    /// - `now`: The current time.
    ///
    /// Returns:
    /// - The reply to send to the host.
    pub fn handle_line<L: SwioLink>(
        &mut self,
        line: &str,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Reply {
        match Op::parse(line) {
            Ok(op) => self.handle(op, debug, now),
            Err(e) => {
                warn!("Error: API failed to parse request: {e}");
                Reply::from(e)
            }
        }
    }

    /// Handles a single API operation.
    ///
    /// Operations which use the link are refused while the flasher is
    /// active.
    pub fn handle<L: SwioLink>(
        &mut self,
        op: Op,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Reply {
        trace!("Exec:  API operation {op:#}");
        let reply = self.handle_op(op, debug, now);
        if !reply.is_ok() {
            debug!("Note:  API reply {reply}");
        }

        // Log every so often
        self.api_calls += 1;
        if self.api_calls.is_multiple_of(API_CALL_LOG_INTERVAL) {
            info!("Note:  API handled {} calls so far", self.api_calls);
        }

        reply
    }

    fn handle_op<L: SwioLink>(
        &mut self,
        op: Op,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Reply {
        let uses_link = !matches!(
            op,
            Op::Status | Op::TerminalDetach | Op::Keys { .. } | Op::GetSettings | Op::SetSettings { .. }
        );
        if uses_link && self.flasher.is_active() {
            return Reply::error(ReplyCode::Busy, FLASH_IN_PROGRESS);
        }

        match op {
            Op::Reboot => match debug.reset_link() {
                Ok(()) => Reply::ok(OK),
                Err(e) if e.requires_reinit() => {
                    Reply::error(ReplyCode::InitFailed, "Failed to init")
                }
                Err(e) => Self::reply_from_error(e),
            },
            Op::Bootloader => Self::halt(debug, HaltMode::Bootloader),
            Op::Resume => Self::halt(debug, HaltMode::Resume),
            Op::HaltAndReset => Self::halt(debug, HaltMode::HaltAndReset),
            Op::HaltNoReset => Self::halt(debug, HaltMode::HaltNoReset),
            Op::HaltMode { mode } => match HaltMode::try_from(mode) {
                Ok(mode) => Self::halt(debug, mode),
                Err(_) => Reply::error(
                    ReplyCode::Unimplemented,
                    format!("Unknown halt mode: {mode}"),
                ),
            },
            Op::RegWrite { reg, value } => {
                debug.swio_if().write_reg(reg, value);
                Reply::ok(OK)
            }
            Op::RegRead { reg } => match debug.swio_if().read_reg(reg) {
                Ok(value) => Reply::ok(format!("{value}")),
                Err(e) => Self::reply_from_error(e),
            },
            Op::Upload {
                offset,
                size,
                retries,
                name,
            } => match self.flasher.begin_upload(offset, size, retries, name, now) {
                Ok(()) => Reply::ok(format!("Send {size} bytes")),
                Err(SwioError::OutOfRange) if size as usize > MAX_BINARY_SIZE => {
                    Reply::error(ReplyCode::OutOfRange, "Binary is too big.")
                }
                Err(SwioError::OutOfRange) => Reply::error(
                    ReplyCode::OutOfRange,
                    format!("Binary doesn't fit at 0x{offset:08X}."),
                ),
                Err(e) => Self::reply_from_error(e),
            },
            Op::Read { offset, size } => {
                if size as usize > MAX_BINARY_SIZE {
                    return Reply::error(ReplyCode::OutOfRange, "Read is too big.");
                }
                if offset.checked_add(size).is_none() {
                    return Reply::error(
                        ReplyCode::OutOfRange,
                        format!("Read doesn't fit at 0x{offset:08X}."),
                    );
                }
                let mut buf = vec![0u8; size as usize];
                match debug.read_binary(offset, &mut buf) {
                    Ok(()) => Reply::ok(buf.iter().map(|b| format!("{b:02x}")).collect::<String>()),
                    Err(e) => Self::reply_from_error(e),
                }
            }
            Op::Unbrick => match self
                .flasher
                .request_unbrick(debug.has_power_control(), now)
            {
                Ok(message) => Reply::ok(message),
                Err(e) => Self::reply_from_error(e),
            },
            Op::ChipInfo => match debug.chip_info() {
                Ok(info) => Reply::ok(format!("{info}")),
                Err(e) => Self::reply_from_error(e),
            },
            Op::Status => Reply::ok(self.flasher.status_text()),
            Op::TerminalAttach => self.terminal_attach(debug, now),
            Op::TerminalDetach => {
                self.terminal.disconnect();
                Reply::ok(OK)
            }
            Op::Keys { text } => {
                if text.is_empty() {
                    return Reply::error(ReplyCode::MissingParam, "Keys parameter missing.");
                }
                match self.terminal.queue_keys(text.as_bytes()) {
                    Ok(()) => Reply::ok(OK),
                    Err(_) => Reply::error(ReplyCode::Busy, "Keys pending"),
                }
            }
            Op::GetSettings => Reply::ok(self.settings.to_json()),
            Op::SetSettings { json } => self.set_settings(&json, debug),
        }
    }

    fn halt<L: SwioLink>(debug: &mut DebugInterface<L>, mode: HaltMode) -> Reply {
        match debug.halt(mode) {
            Ok(()) => Reply::ok(OK),
            Err(e) => Self::reply_from_error(e),
        }
    }

    fn terminal_attach<L: SwioLink>(
        &mut self,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Reply {
        if self.terminal.uart() {
            info!("Note:  Using UART for terminal");
            self.terminal.connect(now);
            return Reply::ok("Connected");
        }

        match debug.init_link() {
            Ok(_) => {
                self.terminal.connect(now);
                Reply::ok("Connected")
            }
            Err(e) => {
                warn!("Error: Terminal failed to connect: {e}");
                self.terminal.disconnect();
                Reply::error(ReplyCode::InitFailed, "Failed to connect")
            }
        }
    }

    fn set_settings<L: SwioLink>(&mut self, json: &str, debug: &mut DebugInterface<L>) -> Reply {
        if json.trim().is_empty() {
            return Reply::error(ReplyCode::MissingParam, "Settings parameter missing.");
        }
        let new = match self.settings.merged(json) {
            Ok(new) => new,
            Err(e) => {
                warn!("Error: Invalid settings: {e}");
                return Reply::error(ReplyCode::OutOfRange, format!("Invalid settings: {e}"));
            }
        };
        if self.fixed_pins
            && (new.swio_pin != self.settings.swio_pin || new.power_pin != self.settings.power_pin)
        {
            warn!("Error: Pin change refused, pins are fixed");
            return Reply::error(ReplyCode::OutOfRange, "Pins are fixed in this build.");
        }

        let mut observer = SettingsObserver {
            terminal: &mut self.terminal,
            debug: &mut *debug,
            pin_change: &mut self.pin_change,
        };
        self.settings.apply(new, &mut observer);
        debug.set_wake_sequence(self.settings.wake_sequence);

        Reply::ok(OK)
    }

    fn reply_from_error(e: SwioError) -> Reply {
        let code = match e {
            SwioError::SessionBusy => ReplyCode::Busy,
            SwioError::InitFailed | SwioError::NoTarget(_) => ReplyCode::InitFailed,
            SwioError::ParameterMissing(_) => ReplyCode::MissingParam,
            SwioError::OutOfRange => ReplyCode::OutOfRange,
            SwioError::UploadSizeMismatch { .. } => ReplyCode::SizeMismatch,
            SwioError::Unsupported => ReplyCode::Unimplemented,
            SwioError::Api => ReplyCode::Unknown,
            _ => ReplyCode::Target,
        };
        Reply::error(code, format!("{e}: {}", e.code()))
    }

    /// Feeds the next chunk of a binary being uploaded.
    ///
    /// Arguments:
    /// - `chunk`: The data.  May be empty.
    /// - `is_final`: Whether this is the last chunk.
    /// - `now`: The current time.
    ///
    /// Returns:
    /// - `Ok(Event)`: a progress event, or `Will flash` after the final
    ///   chunk.  Flashing happens on later calls to
    ///   [`Self::control_step()`].
    /// - `Err(Reply)`: an error to send to the host.
    pub fn upload(&mut self, chunk: &[u8], is_final: bool, now: Instant) -> Result<Event, Reply> {
        self.flasher
            .upload_chunk(chunk, is_final, now)
            .map_err(|e| match e {
                SwioError::UploadSizeMismatch { expected, actual } => Reply::error(
                    ReplyCode::SizeMismatch,
                    format!("Size mismatch, expected:{expected}, actual:{actual}"),
                ),
                SwioError::Api => Reply::error(ReplyCode::Unknown, "No upload in progress"),
                e => Self::reply_from_error(e),
            })
    }

    /// Runs the flasher: checks its watchdog, and runs one step of any
    /// queued job.  The terminal is disconnected before a job uses the
    /// link.
    ///
    /// Returns:
    /// - `Some(Event)`: for the host, if anything happened.
    pub fn control_step<L: SwioLink>(
        &mut self,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Option<Event> {
        if let Some(event) = self.flasher.check_watchdog(now) {
            return Some(event);
        }

        if self.flasher.has_job() {
            self.terminal.disconnect();
        }
        self.flasher.step(debug, now)
    }

    /// Runs a terminal poll round, if the terminal is connected and the
    /// flasher isn't using the link, and flushes output if it is due.
    ///
    /// Returns:
    /// - Everything the terminal has for the host.
    pub fn terminal_step<L: SwioLink>(
        &mut self,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Vec<TerminalOutput> {
        if self.terminal.is_connected() && !self.flasher.is_active() {
            if let Err(e) = self.terminal.poll(debug, now) {
                warn!("Error: Terminal poll failed: {e}");
            }
            let poll_delay = self.poll_delay();
            self.terminal.flush_due(now, poll_delay);
        }
        self.terminal.take_output()
    }

    /// Passes text received from the target's UART to the terminal.
    /// Ignored unless the terminal is connected in UART mode.
    pub fn uart_input(&mut self, bytes: &[u8], now: Instant) {
        if self.terminal.is_connected() && self.terminal.uart() {
            self.terminal.push_output(bytes, now);
        }
    }
}
