// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Target terminal
//!
//! The target's debug printf implementation uses DATA0 and DATA1 as a
//! mailbox.  When it has something to print it sets bit 7 of DATA0, with
//! the character count plus 4 in the low nibble, and up to 3 characters in
//! the upper bytes of DATA0.  Up to 4 more go in DATA1.  It then waits for
//! the host to acknowledge by writing DATA0.
//!
//! The acknowledgement can carry up to 3 keystrokes back to the target, in
//! the same layout, so input costs no extra frames.
//!
//! [`TerminalSession`] runs the host side of this.  Text from the target
//! is gathered into a buffer, which is handed to the host when it fills or
//! when the poll interval passes.  The target sends raw bytes, so the text
//! is decoded as UTF-8 when it is handed over, with a character split
//! across two flushes held back until the rest of it arrives.  Everything for the host is queued as
//! [`TerminalOutput`] and collected with
//! [`TerminalSession::take_output()`].
//!
//! In UART mode the target talks to a UART instead.  The session then just
//! buffers text received from the UART with
//! [`TerminalSession::push_output()`] and hands keystrokes back to be
//! written to it.

use alloc::string::String;
use alloc::vec::Vec;
use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_bin::Event;
use swiofrog_core::rv::dm::{AbstractAuto, AbstractAutoRegister, Data0Register, Data1Register, DmData};

use crate::SwioError;
use crate::debug::DebugInterface;
use crate::interface::SessionTag;
use crate::protocol::SwioLink;

/// Size of the buffer gathering terminal text for the host
pub const TERMINAL_BUFFER_SIZE: usize = 1024;

/// Maximum number of keystrokes queued for the target at once
pub const INBOUND_SIZE: usize = 64;

/// Event message sent once all queued keystrokes have been delivered
pub const KEYS_CONSUMED: &str = "+";

/// Event message sent when the terminal is torn down
pub const DISCONNECTED: &str = "Disconnected";

// DATA0 flag set by the target when it has characters for the host
const DATA_READY: u32 = 0x80;

// Added to the character count in the mailbox's low nibble
const COUNT_OFFSET: u32 = 4;

// Most characters passed in a single DATA0 acknowledgement
const ACK_MAX_CHARS: usize = 3;

/// Something for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutput {
    /// Text from the target
    Text(String),

    /// Keystrokes to write to the UART, in UART mode
    Uart(heapless::Vec<u8, INBOUND_SIZE>),

    /// A terminal event
    Event(Event),
}

/// Host side of the target terminal
#[derive(Debug)]
pub struct TerminalSession {
    connected: bool,
    uart: bool,
    output: heapless::Vec<u8, TERMINAL_BUFFER_SIZE>,
    inbound: heapless::Vec<u8, INBOUND_SIZE>,
    inbound_pos: usize,
    ack: u32,
    last_flush: Instant,
    outbox: Vec<TerminalOutput>,
}

impl Default for TerminalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSession {
    pub fn new() -> Self {
        Self {
            connected: false,
            uart: false,
            output: heapless::Vec::new(),
            inbound: heapless::Vec::new(),
            inbound_pos: 0,
            ack: 0,
            last_flush: Instant::from_ticks(0),
            outbox: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn uart(&self) -> bool {
        self.uart
    }

    /// Switches between the UART and the SWIO mailbox.  Disconnects.
    pub fn set_uart(&mut self, uart: bool) {
        self.disconnect();
        self.uart = uart;
    }

    /// Starts a new session, discarding anything left from the last one.
    pub fn connect(&mut self, now: Instant) {
        debug!("Exec:  Terminal connect, uart {}", self.uart);
        self.output.clear();
        self.inbound.clear();
        self.inbound_pos = 0;
        self.ack = 0;
        self.last_flush = now;
        self.connected = true;
    }

    /// Ends the session.  Does nothing if not connected.
    pub fn disconnect(&mut self) {
        if self.connected {
            info!("Note:  Terminal disconnected");
            self.connected = false;
            self.ack = 0;
            self.outbox
                .push(TerminalOutput::Event(Event::terminal(DISCONNECTED)));
        }
    }

    /// Whether keystrokes are still waiting to be delivered.
    pub fn keys_pending(&self) -> bool {
        self.inbound_pos < self.inbound.len()
    }

    /// Queues keystrokes for the target.  Anything beyond
    /// [`INBOUND_SIZE`] is dropped.
    ///
    /// Returns:
    /// - `Ok(())`: if the keystrokes were queued.
    /// - `Err(SwioError::SessionBusy)`: if earlier keystrokes haven't all
    ///   been delivered yet.
    pub fn queue_keys(&mut self, keys: &[u8]) -> Result<(), SwioError> {
        if self.keys_pending() {
            debug!("Note:  Keystrokes still pending");
            return Err(SwioError::SessionBusy);
        }
        let len = keys.len().min(INBOUND_SIZE);
        self.inbound.clear();
        self.inbound_pos = 0;
        // Can't fail, as len is within capacity
        let _ = self.inbound.extend_from_slice(&keys[..len]);
        Ok(())
    }

    /// Appends text for the host, flushing first if it wouldn't fit.
    pub fn push_output(&mut self, bytes: &[u8], now: Instant) {
        for byte in bytes {
            self.push_byte(*byte, now);
        }
    }

    fn push_byte(&mut self, byte: u8, now: Instant) {
        if self.output.push(byte).is_err() {
            self.flush(now);
            // At most a held back partial character remains
            let _ = self.output.push(byte);
        }
    }

    // Hands the buffered text to the host, keeping back any partial
    // character at the end.  Returns whether any text was handed over.
    fn flush(&mut self, now: Instant) -> bool {
        self.last_flush = now;
        let ready = self.output.len() - incomplete_tail(&self.output);
        if ready == 0 {
            return false;
        }

        trace!("Exec:  Terminal flush {ready} bytes");
        let text = String::from_utf8_lossy(&self.output[..ready]).into_owned();
        self.outbox.push(TerminalOutput::Text(text));
        self.output.copy_within(ready.., 0);
        self.output.truncate(self.output.len() - ready);
        true
    }

    /// Hands buffered text to the host if `poll_delay` has passed since the
    /// last flush.
    ///
    /// Returns:
    /// - `true` if text was flushed.
    pub fn flush_due(&mut self, now: Instant, poll_delay: Duration) -> bool {
        if !self.connected || self.output.is_empty() {
            return false;
        }
        if now.saturating_duration_since(self.last_flush) < poll_delay {
            return false;
        }
        self.flush(now)
    }

    /// Returns everything queued for the host since the last call.
    pub fn take_output(&mut self) -> Vec<TerminalOutput> {
        core::mem::take(&mut self.outbox)
    }

    // Marks all queued keystrokes as delivered
    fn keys_consumed(&mut self) {
        self.inbound.clear();
        self.inbound_pos = 0;
        self.outbox
            .push(TerminalOutput::Event(Event::terminal(KEYS_CONSUMED)));
    }

    // Packs the next keystrokes into an acknowledgement word, if there
    // isn't one already waiting to go.
    fn build_ack(&mut self) {
        if self.ack != 0 || !self.keys_pending() {
            return;
        }

        let keys = &self.inbound[self.inbound_pos..];
        let count = keys.len().min(ACK_MAX_CHARS);
        let mut ack = 0;
        for (ii, key) in keys[..count].iter().enumerate() {
            ack |= (*key as u32) << (8 * ii + 8);
        }
        self.ack = ack | (count as u32 + COUNT_OFFSET);

        self.inbound_pos += count;
        if !self.keys_pending() {
            self.keys_consumed();
        }
    }

    /// Runs one round of the terminal.
    ///
    /// In SWIO mode this reads the mailbox, gathers any characters the
    /// target has sent, and acknowledges them, passing on keystrokes.  In
    /// UART mode queued keystrokes are handed back for the UART.
    ///
    /// Returns:
    /// - `Ok(())`: if the round completed, or the session isn't connected.
    /// - `Err(SwioError)`: if the mailbox couldn't be read.  The session has
    ///   been disconnected.
    pub fn poll<L: SwioLink>(
        &mut self,
        debug: &mut DebugInterface<L>,
        now: Instant,
    ) -> Result<(), SwioError> {
        if !self.connected {
            return Ok(());
        }

        if self.uart {
            if self.keys_pending() {
                let keys = self.inbound.clone();
                self.outbox.push(TerminalOutput::Uart(keys));
                self.keys_consumed();
            }
            return Ok(());
        }

        self.build_ack();

        let swio = debug.swio_if();
        if swio.tag() != SessionTag::Terminal {
            swio.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
            swio.set_tag(SessionTag::Terminal);
        }

        let data0 = match swio.read_dm_register(Data0Register) {
            Ok(data) => data.value(),
            Err(e) => {
                warn!("Error: Terminal dead: {e}");
                self.disconnect();
                return Err(e);
            }
        };
        if data0 & DATA_READY == 0 {
            return Ok(());
        }

        let count = (data0 & 0xF) as i32 - COUNT_OFFSET as i32;
        if self.output.len() as i32 + count > TERMINAL_BUFFER_SIZE as i32 - 1 {
            self.flush(now);
        }
        if (1..=7).contains(&count) {
            let count = count as usize;
            let first = count.min(ACK_MAX_CHARS);
            for byte in &data0.to_le_bytes()[1..=first] {
                self.push_byte(*byte, now);
            }
            if count > ACK_MAX_CHARS {
                let data1 = match swio.read_dm_register(Data1Register) {
                    Ok(data) => data.value(),
                    Err(e) => {
                        warn!("Error: Terminal dead: {e}");
                        self.disconnect();
                        return Err(e);
                    }
                };
                for byte in &data1.to_le_bytes()[..count - ACK_MAX_CHARS] {
                    self.push_byte(*byte, now);
                }
            }
        }

        let swio = debug.swio_if();
        swio.write_dm_register(Data0Register, DmData::new(self.ack));
        self.ack = 0;

        Ok(())
    }
}

// Length of the incomplete UTF-8 sequence ending `bytes`, if any
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for ii in (start..bytes.len()).rev() {
        let needed = match bytes[ii] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        let have = bytes.len() - ii;
        return if have < needed { have } else { 0 };
    }
    0
}
