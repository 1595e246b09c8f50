// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Host transport over the USB serial port
//!
//! Requests arrive one per line.  An accepted upload request is followed by
//! the raw binary, which is passed to the Target in chunks.  Replies,
//! events and terminal output all go back through [`OUTBOUND`].

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use embedded_io_async::{Read, Write};
use esp_hal::Async;
use esp_hal::usb_serial_jtag::{UsbSerialJtagRx, UsbSerialJtagTx};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_bin::{Event, Op, Reply, ReplyCode, TERMINAL_PREFIX};

use crate::target::{Command, REQUEST_CHANNEL_SIZE, Request, Response};
use crate::{SwiofrogError, with_timeout};

/// Longest request line accepted, excluding the line ending
pub const LINE_MAX: usize = 1024;

/// Number of lines for the host that can be queued
pub const OUTBOUND_CHANNEL_SIZE: usize = 16;

// Size of the chunks an upload's payload is passed to the Target in
const UPLOAD_CHUNK_SIZE: usize = 256;

// How long the host may pause part way through an upload's payload
const PAYLOAD_TIMEOUT: Duration = Duration::from_secs(5);

// How long a write to the host may take before the line is abandoned
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

// Size of the USB read buffer
const READ_BUF_SIZE: usize = 64;

/// A line for the host
#[derive(Debug)]
pub(crate) enum Outbound {
    Reply(Reply),
    Event(Event),
    /// Terminal output.  Each line is sent prefixed.
    Terminal(String),
}

/// Lines waiting to be written to the host
pub(crate) static OUTBOUND: Channel<CriticalSectionRawMutex, Outbound, OUTBOUND_CHANNEL_SIZE> =
    Channel::new();

static RESPONSE_SIGNAL: Signal<CriticalSectionRawMutex, Response> = Signal::new();

type RequestSender = Sender<'static, CriticalSectionRawMutex, Request, REQUEST_CHANNEL_SIZE>;

/// Task reading requests from the host
#[embassy_executor::task]
pub(crate) async fn rx_task(rx: UsbSerialJtagRx<'static, Async>, sender: RequestSender) -> ! {
    info!("Exec:  Transport RX task started");

    let mut reader = HostReader::new(rx);
    loop {
        if let Err(e) = serve_request(&mut reader, sender).await {
            warn!("Error: Transport request failed: {e}");
        }
    }
}

/// Task writing replies, events and terminal output to the host
#[embassy_executor::task]
pub(crate) async fn tx_task(mut tx: UsbSerialJtagTx<'static, Async>) -> ! {
    info!("Exec:  Transport TX task started");

    loop {
        let outbound = OUTBOUND.receive().await;
        if let Err(e) = write_outbound(&mut tx, outbound).await {
            trace!("Error: Transport write failed: {e}");
        }
    }
}

// Sends a command to the Target and waits for its response.
async fn call(sender: RequestSender, command: Command) -> Response {
    sender.send(Request::new(command, &RESPONSE_SIGNAL)).await;
    RESPONSE_SIGNAL.wait().await
}

async fn respond(response: Response) {
    match response {
        Response::Reply(reply) => OUTBOUND.send(Outbound::Reply(reply)).await,
        Response::Event(event) => OUTBOUND.send(Outbound::Event(event)).await,
        Response::Done => {}
    }
}

async fn serve_request(
    reader: &mut HostReader<'_>,
    sender: RequestSender,
) -> Result<(), SwiofrogError> {
    let mut line = heapless::Vec::<u8, LINE_MAX>::new();
    if let Err(e) = reader.read_line(&mut line).await {
        if e == SwiofrogError::TooLong {
            let reply = Reply::error(ReplyCode::OutOfRange, format!("{e}"));
            OUTBOUND.send(Outbound::Reply(reply)).await;
        }
        return Err(e);
    }
    if line.is_empty() {
        return Ok(());
    }

    let Ok(line) = core::str::from_utf8(&line) else {
        let e = SwiofrogError::Encoding;
        let reply = Reply::error(ReplyCode::Unknown, format!("{e}"));
        OUTBOUND.send(Outbound::Reply(reply)).await;
        return Err(e);
    };

    // The payload follows an upload request only if the request is accepted
    let upload_size = match Op::parse(line) {
        Ok(Op::Upload { size, .. }) => Some(size as usize),
        _ => None,
    };

    let response = call(sender, Command::Line(line.into())).await;
    let accepted = matches!(&response, Response::Reply(reply) if reply.is_ok());
    respond(response).await;

    match upload_size {
        Some(size) if accepted => receive_payload(reader, sender, size).await,
        _ => Ok(()),
    }
}

// Passes an upload's payload to the Target.  If the host stops sending, the
// upload is finished early, so the Target reports the size mismatch.
async fn receive_payload(
    reader: &mut HostReader<'_>,
    sender: RequestSender,
    size: usize,
) -> Result<(), SwiofrogError> {
    debug!("Exec:  Receiving {size} byte payload");

    let mut remaining = size;
    loop {
        let want = remaining.min(UPLOAD_CHUNK_SIZE);
        let mut chunk = Vec::with_capacity(want);
        let mut timed_out = false;
        if want > 0 {
            match embassy_time::with_timeout(PAYLOAD_TIMEOUT, reader.read_chunk(&mut chunk, want))
                .await
            {
                Ok(result) => result?,
                Err(_) => timed_out = true,
            }
        }

        remaining -= chunk.len();
        let is_final = remaining == 0 || timed_out;
        respond(call(sender, Command::Upload { data: chunk, is_final }).await).await;

        if is_final {
            if timed_out {
                warn!("Error: Payload timed out with {remaining} bytes outstanding");
                return Err(SwiofrogError::Timeout);
            }
            debug!("OK:    Payload received");
            return Ok(());
        }
    }
}

async fn write_outbound(
    tx: &mut UsbSerialJtagTx<'static, Async>,
    outbound: Outbound,
) -> Result<(), SwiofrogError> {
    match outbound {
        Outbound::Reply(reply) => write_line(tx, &format!("{reply}")).await,
        Outbound::Event(event) => write_line(tx, &format!("{event}")).await,
        Outbound::Terminal(text) => {
            for line in text.split_terminator('\n') {
                let line = line.trim_end_matches('\r');
                write_line(tx, &format!("{TERMINAL_PREFIX}{line}")).await?;
            }
            Ok(())
        }
    }
}

async fn write_line(
    tx: &mut UsbSerialJtagTx<'static, Async>,
    line: &str,
) -> Result<(), SwiofrogError> {
    let written = with_timeout!(WRITE_TIMEOUT, Write::write_all(tx, line.as_bytes()));
    written.map_err(|_| SwiofrogError::Transport)?;
    let written = with_timeout!(WRITE_TIMEOUT, Write::write_all(tx, b"\n"));
    written.map_err(|_| SwiofrogError::Transport)?;
    let flushed = with_timeout!(WRITE_TIMEOUT, Write::flush(tx));
    flushed.map_err(|_| SwiofrogError::Transport)
}

// Buffered reader over the USB serial port
struct HostReader<'d> {
    rx: UsbSerialJtagRx<'d, Async>,
    buf: [u8; READ_BUF_SIZE],
    pos: usize,
    len: usize,
}

impl<'d> HostReader<'d> {
    fn new(rx: UsbSerialJtagRx<'d, Async>) -> Self {
        Self {
            rx,
            buf: [0; READ_BUF_SIZE],
            pos: 0,
            len: 0,
        }
    }

    async fn fill(&mut self) -> Result<(), SwiofrogError> {
        if self.pos == self.len {
            let len = Read::read(&mut self.rx, &mut self.buf)
                .await
                .map_err(|_| SwiofrogError::Transport)?;
            self.pos = 0;
            self.len = len;
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8, SwiofrogError> {
        while self.pos == self.len {
            self.fill().await?;
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a line, dropping the line ending.  An over-long line is
    /// discarded up to its end.
    async fn read_line(
        &mut self,
        line: &mut heapless::Vec<u8, LINE_MAX>,
    ) -> Result<(), SwiofrogError> {
        line.clear();
        loop {
            match self.read_byte().await? {
                b'\n' => return Ok(()),
                b'\r' => {}
                byte => {
                    if line.push(byte).is_err() {
                        while self.read_byte().await? != b'\n' {}
                        return Err(SwiofrogError::TooLong);
                    }
                }
            }
        }
    }

    /// Reads between 1 and `max` bytes into `chunk`.
    async fn read_chunk(&mut self, chunk: &mut Vec<u8>, max: usize) -> Result<(), SwiofrogError> {
        while chunk.len() < max {
            if self.pos == self.len {
                if !chunk.is_empty() {
                    break;
                }
                self.fill().await?;
                continue;
            }
            let take = (max - chunk.len()).min(self.len - self.pos);
            chunk.extend_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
        }
        Ok(())
    }
}
