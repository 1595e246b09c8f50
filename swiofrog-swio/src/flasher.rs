// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flasher session
//!
//! [`FlasherSession`] coordinates programming the target: it receives the
//! binary from the host, flashes it with a bounded number of retries, and
//! handles erase/unbrick requests.  Only one operation is in flight at a
//! time.
//!
//! The session itself does no I/O.  The owner feeds it uploaded data, and
//! calls [`FlasherSession::step()`] from its control loop with something
//! implementing [`FlashTarget`] - normally the [`DebugInterface`].  Each step
//! makes one attempt and returns an [`Event`] for the host, if there is
//! anything to report.
//!
//! A session that makes no progress for [`FLASHER_WATCHDOG`] is failed by
//! [`FlasherSession::check_watchdog()`].

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_bin::Event;
use swiofrog_core::ch32::MAX_BINARY_SIZE;

use crate::SwioError;
use crate::debug::DebugInterface;
use crate::protocol::SwioLink;

/// Time a session may go without progress before it is failed.
pub const FLASHER_WATCHDOG: Duration = Duration::from_secs(30);

/// The operations the flasher needs from the target.
pub trait FlashTarget {
    /// Initializes the link, halts the target, and writes and verifies
    /// `data` at `addr`.
    fn write_binary(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError>;

    /// Erases the whole of the target's flash.
    fn erase_chip(&mut self) -> Result<(), SwioError>;

    /// Power cycles the target and restores its factory option bytes.
    fn unbrick(&mut self) -> Result<(), SwioError>;

    /// Whether the target's power can be switched.
    fn has_power_control(&self) -> bool;
}

impl<L: SwioLink> FlashTarget for DebugInterface<L> {
    fn write_binary(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError> {
        DebugInterface::write_binary(self, addr, data)
    }

    fn erase_chip(&mut self) -> Result<(), SwioError> {
        DebugInterface::erase_chip(self)
    }

    fn unbrick(&mut self) -> Result<(), SwioError> {
        DebugInterface::unbrick(self)
    }

    fn has_power_control(&self) -> bool {
        DebugInterface::has_power_control(self)
    }
}

/// Flasher session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlasherStatus {
    /// Nothing happening
    Idle,

    /// Receiving a binary from the host
    Uploading,

    /// Flashing, erasing or unbricking
    Updating,

    /// The last operation succeeded
    Success,

    /// The last operation failed
    Failed,
}

impl fmt::Display for FlasherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlasherStatus::Idle => write!(f, "Idle"),
            FlasherStatus::Uploading => write!(f, "Uploading"),
            FlasherStatus::Updating => write!(f, "Updating"),
            FlasherStatus::Success => write!(f, "Success"),
            FlasherStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Work waiting for the next [`FlasherSession::step()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Flash,
    Unbrick,
}

/// State of the flasher
#[derive(Debug)]
pub struct FlasherSession {
    status: FlasherStatus,
    error: Option<SwioError>,
    offset: u32,
    size: u32,
    received: u32,
    retries: u8,
    current_retry: u8,
    buffer: Vec<u8>,
    name: Option<String>,
    job: Option<Job>,
    watchdog: Duration,
    deadline: Option<Instant>,
}

impl Default for FlasherSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FlasherSession {
    pub fn new() -> Self {
        Self {
            status: FlasherStatus::Idle,
            error: None,
            offset: 0,
            size: 0,
            received: 0,
            retries: 0,
            current_retry: 0,
            buffer: Vec::new(),
            name: None,
            job: None,
            watchdog: FLASHER_WATCHDOG,
            deadline: None,
        }
    }

    /// Uses a different watchdog period.
    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn status(&self) -> FlasherStatus {
        self.status
    }

    /// The error which failed the last operation, if any.
    pub fn error(&self) -> Option<SwioError> {
        self.error
    }

    /// Name given to the binary being flashed, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether an upload or operation is in progress.  The terminal must
    /// not use the link while this is true.
    pub fn is_active(&self) -> bool {
        self.job.is_some()
            || matches!(
                self.status,
                FlasherStatus::Uploading | FlasherStatus::Updating
            )
    }

    /// Whether a job is waiting to be run by [`FlasherSession::step()`].
    pub fn has_job(&self) -> bool {
        self.job.is_some()
    }

    /// Human readable status, as reported to the host.
    pub fn status_text(&self) -> String {
        match self.status {
            FlasherStatus::Idle => String::from("Idle"),
            FlasherStatus::Uploading => String::from("Uploading binary"),
            FlasherStatus::Updating => {
                format!("Flashing in progress. Retry: {}", self.current_retry)
            }
            FlasherStatus::Failed => String::from("Flashing failed"),
            FlasherStatus::Success => String::from("Successfully flashed"),
        }
    }

    /// Returns the status, moving a finished session back to idle so the
    /// result is only reported once.
    pub fn consume_status(&mut self) -> FlasherStatus {
        let status = self.status;
        if matches!(status, FlasherStatus::Success | FlasherStatus::Failed) {
            self.status = FlasherStatus::Idle;
        }
        status
    }

    fn kick(&mut self, now: Instant) {
        self.deadline = Some(now + self.watchdog);
    }

    fn finish(&mut self, result: Result<(), SwioError>) {
        self.job = None;
        self.deadline = None;
        self.buffer = Vec::new();
        match result {
            Ok(()) => {
                self.status = FlasherStatus::Success;
                self.error = None;
            }
            Err(e) => {
                self.status = FlasherStatus::Failed;
                self.error = Some(e);
            }
        }
    }

    /// Starts receiving a binary.
    ///
    /// Arguments:
    /// - `offset`: The address to write the binary to.
    /// - `size`: The number of bytes that will be uploaded.
    /// - `retries`: Number of times to retry flashing after the first
    ///   attempt fails.
    /// - `name`: Optional name of the binary, for logging.
    /// - `now`: The current time.
    ///
    /// Returns:
    /// - `Ok(())`: if the upload has started.
    /// - `Err(SwioError::SessionBusy)`: if an operation is already in
    ///   progress.
    /// - `Err(SwioError::OutOfRange)`: if `size` is too big, or the binary
    ///   would run past the top of the address space.
    pub fn begin_upload(
        &mut self,
        offset: u32,
        size: u32,
        retries: u8,
        name: Option<String>,
        now: Instant,
    ) -> Result<(), SwioError> {
        if self.is_active() {
            debug!("Note:  Upload refused, flasher busy");
            return Err(SwioError::SessionBusy);
        }
        if size as usize > MAX_BINARY_SIZE {
            warn!("Error: Binary is too big: {size} bytes");
            return Err(SwioError::OutOfRange);
        }
        if offset.checked_add(size).is_none() {
            warn!("Error: Binary of {size} bytes doesn't fit at 0x{offset:08X}");
            return Err(SwioError::OutOfRange);
        }

        info!("Exec:  Upload {size} bytes to 0x{offset:08X}, name {name:?}");
        self.status = FlasherStatus::Uploading;
        self.error = None;
        self.offset = offset;
        self.size = size;
        self.received = 0;
        self.retries = retries;
        self.current_retry = 0;
        self.buffer = Vec::with_capacity(size as usize);
        self.name = name;
        self.kick(now);
        Ok(())
    }

    /// Adds a chunk of the binary being uploaded.
    ///
    /// Arguments:
    /// - `data`: The next chunk.  May be empty.
    /// - `is_final`: Whether this is the last chunk.
    /// - `now`: The current time.
    ///
    /// Returns:
    /// - `Ok(Event)`: a progress event, or `Will flash` once the whole
    ///   binary has arrived and flashing has been queued.
    /// - `Err(SwioError::Api)`: if no upload is in progress.
    /// - `Err(SwioError::UploadSizeMismatch)`: if the final chunk leaves the
    ///   binary a different size from that declared.  The session has
    ///   failed, and nothing is written.
    pub fn upload_chunk(
        &mut self,
        data: &[u8],
        is_final: bool,
        now: Instant,
    ) -> Result<Event, SwioError> {
        if self.status != FlasherStatus::Uploading {
            debug!("Note:  Upload data with no upload in progress");
            return Err(SwioError::Api);
        }

        self.received = self.received.saturating_add(data.len() as u32);
        let room = (self.size as usize).saturating_sub(self.buffer.len());
        self.buffer
            .extend_from_slice(&data[..data.len().min(room)]);
        self.kick(now);
        trace!("Value: Upload {}/{}", self.received, self.size);

        if !is_final {
            return Ok(Event::flasher(format!("{}/{}", self.received, self.size)));
        }

        if self.received != self.size {
            let e = SwioError::UploadSizeMismatch {
                expected: self.size,
                actual: self.received,
            };
            warn!("Error: {e}");
            self.finish(Err(e));
            return Err(e);
        }

        self.status = FlasherStatus::Updating;
        self.current_retry = 0;
        self.job = Some(Job::Flash);
        Ok(Event::flasher("Will flash"))
    }

    /// Queues an unbrick if the target has power control, otherwise a chip
    /// erase.
    ///
    /// Returns:
    /// - `Ok(&str)`: the reply for the host.
    /// - `Err(SwioError::SessionBusy)`: if an operation is already in
    ///   progress.
    pub fn request_unbrick(
        &mut self,
        has_power_control: bool,
        now: Instant,
    ) -> Result<&'static str, SwioError> {
        if self.is_active() {
            debug!("Note:  Unbrick refused, flasher busy");
            return Err(SwioError::SessionBusy);
        }

        self.status = FlasherStatus::Updating;
        self.error = None;
        self.current_retry = 0;
        self.job = Some(Job::Unbrick);
        self.kick(now);
        if has_power_control {
            Ok("Will unbrick")
        } else {
            Ok("Will erase")
        }
    }

    /// Fails the session if it has stalled.
    ///
    /// Returns:
    /// - `Some(Event)`: if the watchdog fired.
    /// - `None`: otherwise.
    pub fn check_watchdog(&mut self, now: Instant) -> Option<Event> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        warn!("Error: Flasher watchdog expired, status {}", self.status);
        self.finish(Err(SwioError::Timeout));
        Some(Event::flasher("Watchdog expired"))
    }

    /// Runs one attempt of the queued job, if any.
    ///
    /// A failed flash is retried on later steps until the retry budget is
    /// used up.
    ///
    /// Returns:
    /// - `Some(Event)`: describing the outcome, or the next retry.
    /// - `None`: if there was nothing to do.
    pub fn step(&mut self, target: &mut impl FlashTarget, now: Instant) -> Option<Event> {
        let job = self.job?;
        self.kick(now);

        match job {
            Job::Flash => self.step_flash(target, now),
            Job::Unbrick => Some(self.step_unbrick(target)),
        }
    }

    fn step_flash(&mut self, target: &mut impl FlashTarget, now: Instant) -> Option<Event> {
        debug!(
            "Exec:  Flash {} bytes to 0x{:08X}, attempt {}",
            self.buffer.len(),
            self.offset,
            self.current_retry
        );
        match target.write_binary(self.offset, &self.buffer) {
            Ok(()) => {
                info!("OK:    Flashed {:?}", self.name);
                self.finish(Ok(()));
                Some(Event::flasher("Flashed succesfully"))
            }
            Err(e) if self.current_retry < self.retries => {
                warn!("Error: Flash attempt {} failed: {e}", self.current_retry);
                self.current_retry += 1;
                self.kick(now);
                Some(Event::flasher(self.status_text()))
            }
            Err(SwioError::InitFailed) => {
                warn!("Error: Link init failed");
                self.finish(Err(SwioError::InitFailed));
                Some(Event::flasher("Link init failed"))
            }
            Err(e) => {
                warn!("Error: Flashing failed: {e}");
                self.finish(Err(e));
                Some(Event::flasher(format!("Flashing failed: {}", e.code())))
            }
        }
    }

    fn step_unbrick(&mut self, target: &mut impl FlashTarget) -> Event {
        if target.has_power_control() {
            let result = target.unbrick();
            self.finish(result);
            match result {
                Ok(()) => Event::flasher("Success! Unbrick completed."),
                Err(e) => Event::flasher(format!("Unbrick failed: {}", e.code())),
            }
        } else {
            let result = target.erase_chip();
            self.finish(result);
            match result {
                Ok(()) => Event::flasher("Success! Flash erased!"),
                Err(e) => Event::flasher(format!("Erase failed: {}", e.code())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EraseStage;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedTarget {
        results: VecDeque<Result<(), SwioError>>,
        power: bool,
        writes: Vec<(u32, usize)>,
        erases: u32,
        unbricks: u32,
    }

    impl ScriptedTarget {
        fn with_results(results: &[Result<(), SwioError>]) -> Self {
            Self {
                results: results.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn next(&mut self) -> Result<(), SwioError> {
            self.results.pop_front().unwrap_or(Ok(()))
        }
    }

    impl FlashTarget for ScriptedTarget {
        fn write_binary(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError> {
            self.writes.push((addr, data.len()));
            self.next()
        }

        fn erase_chip(&mut self) -> Result<(), SwioError> {
            self.erases += 1;
            self.next()
        }

        fn unbrick(&mut self) -> Result<(), SwioError> {
            self.unbricks += 1;
            self.next()
        }

        fn has_power_control(&self) -> bool {
            self.power
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn uploaded(size: u32, retries: u8) -> FlasherSession {
        let mut flasher = FlasherSession::new();
        flasher
            .begin_upload(0x0800_0000, size, retries, Some("blink".into()), at(0))
            .unwrap();
        let data = vec![0u8; size as usize];
        let event = flasher.upload_chunk(&data, true, at(1)).unwrap();
        assert_eq!(event, Event::flasher("Will flash"));
        flasher
    }

    #[test]
    fn upload_and_flash() {
        let mut flasher = FlasherSession::new();
        assert_eq!(flasher.status_text(), "Idle");
        flasher
            .begin_upload(0x0800_0000, 64, 0, None, at(0))
            .unwrap();
        assert!(flasher.is_active());
        assert_eq!(flasher.status_text(), "Uploading binary");

        let event = flasher.upload_chunk(&[0; 40], false, at(1)).unwrap();
        assert_eq!(event, Event::flasher("40/64"));
        let event = flasher.upload_chunk(&[0; 24], true, at(2)).unwrap();
        assert_eq!(event, Event::flasher("Will flash"));
        assert_eq!(flasher.status_text(), "Flashing in progress. Retry: 0");

        let mut target = ScriptedTarget::default();
        let event = flasher.step(&mut target, at(3));
        assert_eq!(event, Some(Event::flasher("Flashed succesfully")));
        assert_eq!(target.writes, vec![(0x0800_0000, 64)]);
        assert!(!flasher.is_active());
        assert_eq!(flasher.status_text(), "Successfully flashed");

        assert_eq!(flasher.consume_status(), FlasherStatus::Success);
        assert_eq!(flasher.consume_status(), FlasherStatus::Idle);
        assert_eq!(flasher.step(&mut target, at(4)), None);
    }

    #[test]
    fn retries_until_budget_spent() {
        let mut flasher = uploaded(16, 2);
        let mut target = ScriptedTarget::with_results(&[
            Err(SwioError::VerifyMismatch(0x0800_0000)),
            Err(SwioError::VerifyMismatch(0x0800_0000)),
            Err(SwioError::VerifyMismatch(0x0800_0000)),
        ]);

        let event = flasher.step(&mut target, at(2));
        assert_eq!(
            event,
            Some(Event::flasher("Flashing in progress. Retry: 1"))
        );
        flasher.step(&mut target, at(3));
        assert!(flasher.is_active());
        let event = flasher.step(&mut target, at(4));
        assert_eq!(event, Some(Event::flasher("Flashing failed: -99")));

        assert_eq!(target.writes.len(), 3);
        assert_eq!(flasher.status(), FlasherStatus::Failed);
        assert_eq!(flasher.status_text(), "Flashing failed");
        assert_eq!(
            flasher.error(),
            Some(SwioError::VerifyMismatch(0x0800_0000))
        );
    }

    #[test]
    fn retry_can_succeed() {
        let mut flasher = uploaded(16, 1);
        let mut target = ScriptedTarget::with_results(&[Err(SwioError::BusFault), Ok(())]);

        flasher.step(&mut target, at(2));
        let event = flasher.step(&mut target, at(3));
        assert_eq!(event, Some(Event::flasher("Flashed succesfully")));
        assert_eq!(target.writes.len(), 2);
    }

    #[test]
    fn init_failure_reported() {
        let mut flasher = uploaded(16, 0);
        let mut target = ScriptedTarget::with_results(&[Err(SwioError::InitFailed)]);

        let event = flasher.step(&mut target, at(2));
        assert_eq!(event, Some(Event::flasher("Link init failed")));
        assert_eq!(flasher.error().map(|e| e.code()), Some(-2));
    }

    #[test]
    fn short_upload_fails_without_writing() {
        let mut flasher = FlasherSession::new();
        flasher.begin_upload(0, 100, 0, None, at(0)).unwrap();
        let event = flasher.upload_chunk(&[0xAA; 50], false, at(1)).unwrap();
        assert_eq!(event, Event::flasher("50/100"));

        let result = flasher.upload_chunk(&[], true, at(2));
        assert_eq!(
            result,
            Err(SwioError::UploadSizeMismatch {
                expected: 100,
                actual: 50
            })
        );
        assert_eq!(flasher.status(), FlasherStatus::Failed);

        let mut target = ScriptedTarget::default();
        assert_eq!(flasher.step(&mut target, at(3)), None);
        assert!(target.writes.is_empty());
        assert_eq!(flasher.upload_chunk(&[0], true, at(4)), Err(SwioError::Api));
    }

    #[test]
    fn one_operation_at_a_time() {
        let mut flasher = FlasherSession::new();
        assert_eq!(
            flasher.begin_upload(0, MAX_BINARY_SIZE as u32 + 1, 0, None, at(0)),
            Err(SwioError::OutOfRange)
        );
        flasher.begin_upload(0, 8, 0, None, at(0)).unwrap();
        assert_eq!(
            flasher.begin_upload(0, 8, 0, None, at(1)),
            Err(SwioError::SessionBusy)
        );
        assert_eq!(
            flasher.request_unbrick(true, at(1)),
            Err(SwioError::SessionBusy)
        );
    }

    #[test]
    fn upload_must_fit_below_top_of_memory() {
        let mut flasher = FlasherSession::new();
        assert_eq!(
            flasher.begin_upload(0xFFFF_FFF0, 32, 0, None, at(0)),
            Err(SwioError::OutOfRange)
        );
        assert_eq!(flasher.status(), FlasherStatus::Idle);
        assert!(!flasher.is_active());

        flasher.begin_upload(0xFFFF_FFC0, 32, 0, None, at(1)).unwrap();
        assert_eq!(flasher.status(), FlasherStatus::Uploading);
    }

    #[test]
    fn watchdog_fails_stalled_session() {
        let mut flasher = FlasherSession::new();
        assert_eq!(flasher.check_watchdog(at(100_000)), None);

        flasher.begin_upload(0, 8, 0, None, at(0)).unwrap();
        assert_eq!(flasher.check_watchdog(at(29_999)), None);

        // Progress pushes the deadline out
        flasher.upload_chunk(&[0; 4], false, at(20_000)).unwrap();
        assert_eq!(flasher.check_watchdog(at(49_999)), None);

        let event = flasher.check_watchdog(at(50_000));
        assert_eq!(event, Some(Event::flasher("Watchdog expired")));
        assert_eq!(flasher.status(), FlasherStatus::Failed);
        assert_eq!(flasher.error(), Some(SwioError::Timeout));
        assert!(!flasher.is_active());
        assert_eq!(flasher.check_watchdog(at(100_000)), None);
    }

    #[test]
    fn custom_watchdog() {
        let mut flasher = FlasherSession::new().with_watchdog(Duration::from_millis(10));
        flasher.request_unbrick(false, at(0)).unwrap();
        assert!(flasher.check_watchdog(at(10)).is_some());
    }

    #[test]
    fn unbrick_or_erase() {
        let mut flasher = FlasherSession::new();
        let mut target = ScriptedTarget {
            power: true,
            ..Default::default()
        };
        assert_eq!(flasher.request_unbrick(true, at(0)), Ok("Will unbrick"));
        let event = flasher.step(&mut target, at(1));
        assert_eq!(event, Some(Event::flasher("Success! Unbrick completed.")));
        assert_eq!((target.unbricks, target.erases), (1, 0));

        let mut target = ScriptedTarget::with_results(&[Err(SwioError::EraseFailed(
            EraseStage::Chip,
        ))]);
        assert_eq!(flasher.request_unbrick(false, at(2)), Ok("Will erase"));
        let event = flasher.step(&mut target, at(3));
        assert_eq!(event, Some(Event::flasher("Erase failed: -13")));
        assert_eq!((target.unbricks, target.erases), (0, 1));
        assert_eq!(flasher.consume_status(), FlasherStatus::Failed);

        let mut target = ScriptedTarget::default();
        flasher.request_unbrick(false, at(4)).unwrap();
        let event = flasher.step(&mut target, at(5));
        assert_eq!(event, Some(Event::flasher("Success! Flash erased!")));
    }

    #[test]
    fn flashes_through_debug_interface() {
        use crate::sim::SimTarget;

        let mut debug = DebugInterface::new(SimTarget::new());
        let mut flasher = uploaded(64, 0);
        let event = flasher.step(&mut debug, at(2));
        assert_eq!(event, Some(Event::flasher("Flashed succesfully")));

        let sim = debug.swio().link();
        assert_eq!(sim.unlocks(), 1);
        assert_eq!(sim.page_programs(), 1);
        assert_eq!(sim.flash_bytes(0x0800_0000, 64), &[0u8; 64][..]);
    }
}
