// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SWIO Debug Interface
//!
//! This module implements a high-level interface to a WCH CH32V003 over its
//! single wire debug port.  Its aim is to provide a simple API for
//! controlling, identifying and programming the target.
//!
//! If this module does not give you the control you need, you can use the
//! [`SwioInterface`] object directly for lower-level memory and register
//! access.
//!
//! To combine the use of this module with [`SwioInterface`], create the
//! [`DebugInterface`] object using the `new()` method, and then use
//! `swio_if()` to access the underlying [`SwioInterface`] object as
//! required.

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_core::ch32::{
    self, CH32V003_ESIG_FLACAP, CH32V003_ESIG_UNIID1, CH32V003_ESIG_UNIID2,
    CH32V003_ESIG_UNIID3, CH32V003_OPTION_BYTES, ChipInfo, Ch32FlashBootModekeyr, Ch32FlashCtlr,
    Ch32FlashKeyr, Ch32FlashStatr, FACTORY_OPTION_BYTES, MAX_BINARY_SIZE,
};
use swiofrog_core::rv::dm::{
    AbstractAuto, AbstractAutoRegister, Cfgr, CfgrRegister, DmControl, DmControlRegister,
    DmStatus, DmStatusRegister, ShadowCfgrRegister,
};

use crate::SwioError;
use crate::flash::EraseMode;
use crate::interface::{SessionTag, SwioInterface};
use crate::protocol::SwioLink;

// DMSTATUS polls waiting for the debug module after init
const INIT_STATUS_POLLS: u32 = 30;

// Attempts to catch the target in the debug module after a power cycle
const UNBRICK_ATTEMPTS: u32 = 500;

// DMCONTROL values, as used by the halt sequences
const CONTROL_HALT: u32 = DmControl::HALTREQ | DmControl::DMACTIVE;
const CONTROL_HALT_RESET: u32 = DmControl::HALTREQ | DmControl::NDMRESET | DmControl::DMACTIVE;
const CONTROL_RESUME: u32 = DmControl::RESUMEREQ | DmControl::DMACTIVE;

/// Ways to stop, start and reset the target
///
/// The numeric values are those used by the `#d;<mode>` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HaltMode {
    /// Reset the core and leave it halted
    HaltAndReset = 0,

    /// Reset the core and let it run
    Reboot = 1,

    /// Let a halted core run
    Resume = 2,

    /// Reset into the system bootloader
    Bootloader = 3,

    /// Halt the core where it is
    HaltNoReset = 5,
}

impl TryFrom<u8> for HaltMode {
    type Error = SwioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HaltMode::HaltAndReset),
            1 => Ok(HaltMode::Reboot),
            2 => Ok(HaltMode::Resume),
            3 => Ok(HaltMode::Bootloader),
            5 => Ok(HaltMode::HaltNoReset),
            _ => Err(SwioError::Unsupported),
        }
    }
}

impl fmt::Display for HaltMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltMode::HaltAndReset => write!(f, "Halt and Reset"),
            HaltMode::Reboot => write!(f, "Reboot"),
            HaltMode::Resume => write!(f, "Resume"),
            HaltMode::Bootloader => write!(f, "Reboot to Bootloader"),
            HaltMode::HaltNoReset => write!(f, "Halt"),
        }
    }
}

impl HaltMode {
    /// Whether this mode resets the core, so any flash unlock is lost.
    pub fn resets(&self) -> bool {
        matches!(
            self,
            HaltMode::HaltAndReset | HaltMode::Reboot | HaltMode::Bootloader
        )
    }
}

/// WCH SWIO Debug Interface object
///
/// This is used by applications to control and program the target.
///
/// It provides a high-level interface for SWIO operations, such as bringing
/// up the link, halting and resetting the target, identifying it and
/// writing binaries to its flash or RAM.
///
/// Create using [`Self::new()`] with a [`SwioLink`], usually a
/// [`crate::SwioProtocol`]:
///
/// ```rust,ignore
/// use swiofrog_swio::{DebugInterface, SwioProtocol};
///
/// let swio = SwioProtocol::new(pin, delay, 7);
/// let mut debug = DebugInterface::new(swio);
///
/// debug.init_link()?;
/// let info = debug.chip_info()?;
/// info!("Chip info: {info}");
/// ```
#[derive(Debug)]
pub struct DebugInterface<L: SwioLink> {
    swio: SwioInterface<L>,
    wake_sequence: bool,
}

impl<L: SwioLink> DebugInterface<L> {
    /// Creates a new `DebugInterface` using the given link.
    pub fn new(link: L) -> Self {
        Self::from_interface(SwioInterface::new(link))
    }

    /// Creates a new `DebugInterface` from an existing [`SwioInterface`].
    pub fn from_interface(swio: SwioInterface<L>) -> Self {
        Self {
            swio,
            wake_sequence: false,
        }
    }

    /// Returns a mutable reference to the underlying [`SwioInterface`].
    ///
    /// This allows you to access lower-level SWIO operations directly, if
    /// required.
    pub fn swio_if(&mut self) -> &mut SwioInterface<L> {
        &mut self.swio
    }

    /// Returns a reference to the underlying [`SwioInterface`].
    pub fn swio(&self) -> &SwioInterface<L> {
        &self.swio
    }

    /// Whether the programming mode entry sequence is sent by
    /// [`Self::init_link()`].
    pub fn set_wake_sequence(&mut self, enabled: bool) {
        self.wake_sequence = enabled;
    }

    pub fn wake_sequence(&self) -> bool {
        self.wake_sequence
    }

    /// Whether the target's power can be switched.
    pub fn has_power_control(&self) -> bool {
        self.swio.link().has_power_control()
    }

    // Enable output from the target.  Needed before every mode change, and
    // twice on CFGR to get a target out of cold boot.
    fn preamble(&mut self) {
        self.swio
            .write_dm_register(ShadowCfgrRegister, Cfgr::OUTPUT_ENABLE);
        self.swio.write_dm_register(CfgrRegister, Cfgr::OUTPUT_ENABLE);
        self.swio.write_dm_register(CfgrRegister, Cfgr::OUTPUT_ENABLE);
    }

    fn control(&mut self, value: u32) {
        self.swio
            .write_dm_register(DmControlRegister, DmControl::new(value));
    }

    /// Initializes the link to the target.
    ///
    /// Forgets any cached state, powers the target if there is a power pin,
    /// optionally sends the programming mode entry sequence, enables output
    /// from the target and then waits for its debug module to come up.
    ///
    /// Returns:
    /// - `Ok(DmStatus)`: the target's DMSTATUS.
    /// - `Err(SwioError::NoTarget)`: if DMSTATUS read back as all zeros or
    ///   all ones.
    /// - `Err(SwioError::BusFault)`: if DMSTATUS could not be read at all.
    pub fn init_link(&mut self) -> Result<DmStatus, SwioError> {
        debug!("Exec:  Initialize SWIO link");
        self.swio.reset_state();

        if self.has_power_control() {
            self.swio.link_mut().set_power(true)?;
        }

        if self.wake_sequence {
            // The returned bit isn't a reliable indication of a target
            match self.swio.link_mut().enter_programming_mode() {
                Ok(present) => debug!("Info:  Programming mode entry, present bit {present}"),
                Err(e) => debug!("Note:  Programming mode entry failed: {e}"),
            }
        }

        self.preamble();
        self.swio
            .write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);

        let mut result = self.swio.read_dm_register(DmStatusRegister);
        let mut polls = 1;
        while polls < INIT_STATUS_POLLS {
            if matches!(&result, Ok(status) if status.is_ready()) {
                break;
            }
            result = self.swio.read_dm_register(DmStatusRegister);
            polls += 1;
        }
        if polls >= INIT_STATUS_POLLS {
            debug!("Note:  Timed out waiting for DMSTATUS");
        }

        self.swio.set_tag(SessionTag::Started);

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!("Error: Could not read DMSTATUS: {e}");
                return Err(e);
            }
        };
        if status.is_blank() {
            warn!("Error: Setup chip failed, DMSTATUS 0x{:08X}", status.value());
            return Err(SwioError::NoTarget(status.value()));
        }

        info!("OK:    Target ready, DMSTATUS 0x{:08X}", status.value());
        Ok(status)
    }

    /// Initializes the link, then reboots the target.
    pub fn reset_link(&mut self) -> Result<(), SwioError> {
        self.init_link()?;
        self.halt(HaltMode::Reboot)?;
        self.swio.delay_ms(10);
        Ok(())
    }

    /// Halts, resumes or resets the target.
    ///
    /// Arguments:
    /// - `mode`: What to do.
    ///
    /// Returns:
    /// - `Ok(())`: if the debug module accepted the request.
    /// - `Err(SwioError)`: if the debug module reported an error, or the
    ///   flash keys could not be written when rebooting to the bootloader.
    pub fn halt(&mut self, mode: HaltMode) -> Result<(), SwioError> {
        debug!("Exec:  {mode}");
        match mode {
            HaltMode::HaltAndReset | HaltMode::HaltNoReset => {
                self.preamble();
                self.control(CONTROL_HALT);
                if mode == HaltMode::HaltAndReset {
                    self.control(CONTROL_HALT_RESET);
                }
                self.control(CONTROL_HALT);
            }
            HaltMode::Reboot => {
                self.control(CONTROL_HALT);
                self.control(CONTROL_HALT);
                self.control(CONTROL_HALT_RESET);
                self.control(CONTROL_RESUME);
            }
            HaltMode::Resume => {
                self.preamble();
                self.control(CONTROL_RESUME);
            }
            HaltMode::Bootloader => {
                self.control(CONTROL_HALT);
                self.control(CONTROL_HALT);

                self.swio
                    .write_word(Ch32FlashKeyr::ADDRESS, Ch32FlashKeyr::KEY1)?;
                self.swio
                    .write_word(Ch32FlashKeyr::ADDRESS, Ch32FlashKeyr::KEY2)?;
                self.swio
                    .write_word(Ch32FlashBootModekeyr::ADDRESS, Ch32FlashKeyr::KEY1)?;
                self.swio
                    .write_word(Ch32FlashBootModekeyr::ADDRESS, Ch32FlashKeyr::KEY2)?;
                self.swio.write_word(
                    Ch32FlashStatr::ADDRESS,
                    1 << Ch32FlashStatr::BOOT_MODE_BIT,
                )?;
                self.swio
                    .write_word(Ch32FlashCtlr::ADDRESS, Ch32FlashCtlr::LOCK)?;

                self.control(CONTROL_HALT_RESET);
                self.control(CONTROL_RESUME);
            }
        }

        if mode.resets() {
            self.swio.set_flash_unlocked(false);
        }

        self.swio.wait_for_done_op()
    }

    /// Reads the target's option bytes, unique ID and flash size.
    ///
    /// The target is halted while these are read, and then resumed.
    pub fn chip_info(&mut self) -> Result<ChipInfo, SwioError> {
        self.halt(HaltMode::HaltNoReset)?;

        let mut info = ChipInfo::default();
        for (ii, word) in info.option_bytes.iter_mut().enumerate() {
            *word = self.swio.read_word(CH32V003_OPTION_BYTES + ii as u32 * 4)?;
        }
        for (word, addr) in info.uid.iter_mut().zip([
            CH32V003_ESIG_UNIID1,
            CH32V003_ESIG_UNIID2,
            CH32V003_ESIG_UNIID3,
        ]) {
            *word = self.swio.read_word(addr)?;
        }
        info.flash_size_kb = (self.swio.read_word(CH32V003_ESIG_FLACAP)? & 0xFFFF) as u16;

        self.halt(HaltMode::Resume)?;

        debug!("Value: Chip info {info}");
        Ok(info)
    }

    /// Reads target memory into `buf`, halting the target for the duration.
    pub fn read_binary(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SwioError> {
        self.halt(HaltMode::HaltNoReset)?;
        self.swio.read_binary_blob(addr, buf)?;
        self.halt(HaltMode::Resume)
    }

    /// Writes a binary to the target, to flash or RAM.
    ///
    /// The link is re-initialized first.  The target is reset and halted for
    /// a flash write, and rebooted afterwards so it runs the new image.  For
    /// a RAM write it is halted where it is, and left halted.
    ///
    /// Arguments:
    /// - `addr`: The address to write to.
    /// - `data`: The binary.  Must be no larger than the target's flash.
    ///
    /// Returns:
    /// - `Ok(())`: if the binary was written and verified.
    /// - `Err(SwioError::OutOfRange)`: if the binary is too big.
    /// - `Err(SwioError::InitFailed)`: if the link could not be initialized.
    /// - `Err(SwioError)`: if the write failed.
    pub fn write_binary(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError> {
        if data.len() > MAX_BINARY_SIZE {
            warn!("Error: Binary too big: {} bytes", data.len());
            return Err(SwioError::OutOfRange);
        }

        if let Err(e) = self.init_link() {
            warn!("Error: Link init failed: {e}");
            return Err(SwioError::InitFailed);
        }

        let is_flash = ch32::is_flash(addr);
        let mode = if is_flash {
            HaltMode::HaltAndReset
        } else {
            HaltMode::HaltNoReset
        };
        self.halt(mode)?;

        let result = self.swio.write_binary_blob(addr, data);
        self.swio.delay_ms(10);

        if is_flash {
            let reboot = self.halt(HaltMode::Reboot);
            self.swio.delay_ms(10);
            result?;
            reboot?;
        } else {
            result?;
        }

        info!("OK:    Wrote {} bytes to 0x{addr:08X}", data.len());
        Ok(())
    }

    /// Erases the whole of the target's flash, leaving it halted.
    pub fn erase_chip(&mut self) -> Result<(), SwioError> {
        if let Err(e) = self.init_link() {
            warn!("Error: Link init failed: {e}");
            return Err(SwioError::InitFailed);
        }
        self.halt(HaltMode::HaltAndReset)?;
        self.swio.delay_ms(10);
        self.swio.erase_flash(EraseMode::Chip)?;

        info!("OK:    Flash erased");
        Ok(())
    }

    /// Recovers a target whose option bytes prevent debugging, for example
    /// because the application disables the SWIO pin.
    ///
    /// Power cycles the target, catches it in the debug module before the
    /// application runs, restores the factory option bytes and erases the
    /// flash.  Requires a power control pin.
    ///
    /// Returns:
    /// - `Ok(())`: if the target was recovered.
    /// - `Err(SwioError::Unsupported)`: if there is no power control pin.
    /// - `Err(SwioError::HaltTimeout)`: if the target could not be caught.
    /// - `Err(SwioError)`: if a step failed.
    pub fn unbrick(&mut self) -> Result<(), SwioError> {
        if !self.has_power_control() {
            warn!("Error: Unbrick requires power control");
            return Err(SwioError::Unsupported);
        }

        info!("Exec:  Entering unbrick mode");
        self.swio.reset_state();
        self.swio.link_mut().set_power(false)?;
        self.swio.delay_ms(240);
        self.swio.link_mut().set_power(true)?;
        self.swio.delay_us(100);

        let mut caught = false;
        for attempt in 0..UNBRICK_ATTEMPTS {
            self.swio.delay_us(10);
            self.preamble();
            for _ in 0..4 {
                self.control(CONTROL_HALT);
            }
            let status = self.swio.read_dm_register(DmStatusRegister).inspect_err(|e| {
                warn!("Error: Could not read DMSTATUS: {e}");
            })?;
            if !status.is_blank() {
                debug!("Info:  Target caught after {} attempts", attempt + 1);
                caught = true;
                break;
            }
        }

        // Leave the halt request set, so the application can't start
        for _ in 0..4 {
            self.control(CONTROL_HALT);
        }
        let status = self.swio.read_dm_register(DmStatusRegister);
        debug!("Value: DMSTATUS after halt {status:?}");

        if !caught {
            warn!("Error: Timed out trying to unbrick");
            return Err(SwioError::HaltTimeout);
        }

        self.swio
            .write_binary_blob(CH32V003_OPTION_BYTES, &FACTORY_OPTION_BYTES)?;
        self.swio.delay_ms(20);
        self.swio.erase_flash(EraseMode::Chip)?;

        info!("OK:    Unbrick completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Presence, SimTarget};
    use swiofrog_core::ch32::CH32V003_FLASH_BASE;

    fn debug_if(sim: SimTarget) -> DebugInterface<SimTarget> {
        DebugInterface::new(sim)
    }

    #[test]
    fn halt_mode_numbers() {
        assert_eq!(HaltMode::try_from(0), Ok(HaltMode::HaltAndReset));
        assert_eq!(HaltMode::try_from(3), Ok(HaltMode::Bootloader));
        assert_eq!(HaltMode::try_from(5), Ok(HaltMode::HaltNoReset));
        assert_eq!(HaltMode::try_from(4), Err(SwioError::Unsupported));
        assert_eq!(HaltMode::Resume as u8, 2);
    }

    #[test]
    fn init_link_finds_target() {
        let mut debug = debug_if(SimTarget::new());
        let status = debug.init_link().unwrap();
        assert!(status.is_ready());
        assert_eq!(debug.swio().tag(), SessionTag::Started);
        assert_eq!(debug.swio().link().cfgr_writes(), 3);
        assert_eq!(debug.swio().link().wake_sequences(), 0);
    }

    #[test]
    fn init_link_reports_missing_target() {
        let mut sim = SimTarget::new();
        sim.set_presence(Presence::Blank);
        let mut debug = debug_if(sim);
        let err = debug.init_link().unwrap_err();
        assert_eq!(err, SwioError::NoTarget(0));
        assert_eq!(err.code(), -9);

        let mut sim = SimTarget::new();
        sim.disconnect();
        let mut debug = debug_if(sim);
        assert_eq!(debug.init_link(), Err(SwioError::BusFault));
        // Preamble, ABSTRACTAUTO and every DMSTATUS poll
        assert_eq!(debug.swio().link().frames(), 4 + INIT_STATUS_POLLS);
    }

    #[test]
    fn init_link_powers_target_and_wakes_it() {
        let mut sim = SimTarget::new().with_power();
        sim.halt();
        let mut debug = debug_if(sim);
        debug.swio_if().link_mut().set_power(false).unwrap();
        debug.set_wake_sequence(true);

        debug.init_link().unwrap();
        assert_eq!(debug.swio().link().power(), Some(true));
        assert_eq!(debug.swio().link().wake_sequences(), 1);
    }

    #[test]
    fn halt_modes_drive_the_core() {
        let mut debug = debug_if(SimTarget::new());
        debug.init_link().unwrap();

        debug.halt(HaltMode::HaltNoReset).unwrap();
        assert!(debug.swio().link().is_halted());
        assert_eq!(debug.swio().link().resets(), 0);

        debug.halt(HaltMode::Resume).unwrap();
        assert!(!debug.swio().link().is_halted());

        debug.halt(HaltMode::HaltAndReset).unwrap();
        assert!(debug.swio().link().is_halted());
        assert_eq!(debug.swio().link().resets(), 1);

        debug.halt(HaltMode::Reboot).unwrap();
        assert!(!debug.swio().link().is_halted());
        assert_eq!(debug.swio().link().resets(), 2);
    }

    #[test]
    fn bootloader_mode_sets_boot_flag_and_relocks() {
        let mut debug = debug_if(SimTarget::new());
        debug.init_link().unwrap();
        debug.halt(HaltMode::Bootloader).unwrap();

        let sim = debug.swio().link();
        assert!(sim.boot_mode());
        assert!(sim.flash_locked());
        assert!(!sim.is_halted());
        assert!(!debug.swio().flash_unlocked());
    }

    #[test]
    fn chip_info_reads_identity_and_resumes() {
        let mut debug = debug_if(SimTarget::new());
        debug.init_link().unwrap();
        let info = debug.chip_info().unwrap();

        assert_eq!(info.uid, [0x1234_5678, 0x9ABC_DEF0, 0x0000_0001]);
        assert_eq!(info.flash_size_kb, 16);
        assert_eq!(info.option_bytes[0], 0x6897_5AA5);
        assert!(!info.read_protected());
        assert!(!debug.swio().link().is_halted());
        assert_eq!(
            format!("{info}"),
            "68975aa5;ff00ff00;00ff00ff;00000000;12345678;9abcdef0;00000001;16"
        );
    }

    #[test]
    fn write_binary_to_flash_reboots() {
        let mut debug = debug_if(SimTarget::new());
        debug.write_binary(CH32V003_FLASH_BASE, &[0u8; 64]).unwrap();

        let sim = debug.swio().link();
        assert_eq!(sim.flash_bytes(CH32V003_FLASH_BASE, 64), &[0u8; 64]);
        assert!(sim.halts() >= 1);
        assert_eq!(sim.unlocks(), 1);
        assert_eq!(sim.page_programs(), 1);
        // Halt and reset, then reboot
        assert_eq!(sim.resets(), 2);
        assert!(!sim.is_halted());
    }

    #[test]
    fn write_binary_to_ram_leaves_target_halted() {
        let mut debug = debug_if(SimTarget::new());
        debug
            .write_binary(0x2000_0010, &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();

        let sim = debug.swio().link();
        assert_eq!(sim.ram_word(0x2000_0010), 0x0403_0201);
        assert_eq!(sim.ram_word(0x2000_0014), 0x0807_0605);
        assert!(sim.is_halted());
        assert_eq!(sim.resets(), 0);
    }

    #[test]
    fn write_binary_rejects_oversize_and_dead_links() {
        let mut debug = debug_if(SimTarget::new());
        let big = vec![0u8; MAX_BINARY_SIZE + 1];
        assert_eq!(
            debug.write_binary(CH32V003_FLASH_BASE, &big),
            Err(SwioError::OutOfRange)
        );
        assert_eq!(debug.swio().link().frames(), 0);

        let mut sim = SimTarget::new();
        sim.disconnect();
        let mut debug = debug_if(sim);
        let err = debug.write_binary(CH32V003_FLASH_BASE, &[0u8; 4]).unwrap_err();
        assert_eq!(err, SwioError::InitFailed);
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn erase_chip_clears_flash() {
        let mut sim = SimTarget::new();
        sim.load_flash(CH32V003_FLASH_BASE, &[0x55; 128]);
        let mut debug = debug_if(sim);
        debug.erase_chip().unwrap();

        let sim = debug.swio().link();
        assert_eq!(sim.flash_bytes(CH32V003_FLASH_BASE, 128), &[0xFF; 128]);
        assert_eq!(sim.chip_erases(), 1);
        assert!(sim.is_halted());
    }

    #[test]
    fn read_binary_resumes_target() {
        let mut sim = SimTarget::new();
        sim.load_ram(0x2000_0000, &[9, 8, 7, 6, 5]);
        let mut debug = debug_if(sim);
        debug.init_link().unwrap();

        let mut buf = [0u8; 5];
        debug.read_binary(0x2000_0000, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7, 6, 5]);
        assert!(!debug.swio().link().is_halted());
    }

    #[test]
    fn unbrick_restores_option_bytes_and_erases() {
        let mut sim = SimTarget::new().with_power();
        sim.set_option_bytes(&[0x00; 12]);
        sim.load_flash(CH32V003_FLASH_BASE, &[0x00; 64]);
        let mut debug = debug_if(sim);

        debug.unbrick().unwrap();

        let sim = debug.swio().link();
        assert_eq!(&sim.option_bytes()[..12], &FACTORY_OPTION_BYTES);
        assert_eq!(sim.flash_bytes(CH32V003_FLASH_BASE, 64), &[0xFF; 64]);
        assert_eq!(sim.power(), Some(true));
        assert!(sim.is_halted());
        assert!(sim.elapsed_us() >= 240_000);
    }

    #[test]
    fn unbrick_needs_power_and_a_target() {
        let mut debug = debug_if(SimTarget::new());
        assert_eq!(debug.unbrick(), Err(SwioError::Unsupported));

        let mut sim = SimTarget::new().with_power();
        sim.set_presence(Presence::Blank);
        let mut debug = debug_if(sim);
        let err = debug.unbrick().unwrap_err();
        assert_eq!(err, SwioError::HaltTimeout);
        assert_eq!(err.code(), -5);
        assert_eq!(debug.swio().link().chip_erases(), 0);
    }
}
