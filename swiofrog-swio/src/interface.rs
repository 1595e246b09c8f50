// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! WCH SWIO Interface
//!
//! This module implements memory access to the target through its debug
//! module.  It provides [`SwioInterface`], which loads short programs into the
//! program buffer and runs them to read and write target memory.
//!
//! Loading the program buffer costs a number of frames, so the interface
//! tracks what is currently loaded ([`SessionTag`]) and which address the
//! target will access next.  Sequential word accesses then cost a single
//! DATA0 frame each, using ABSTRACTAUTO to re-run the program.

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_core::ch32::{self, Ch32FlashCtlr, Ch32FlashStatr};
use swiofrog_core::rv::dm::{
    AbstractAuto, AbstractAutoRegister, AbstractCommand, AbstractCs, AbstractCsRegister,
    CommandRegister, Data0Register, Data1Register, DmData, ProgBufRegister,
};
use swiofrog_core::rv::program::{
    DATA0_ALIAS, DATA1_ALIAS, EBREAK, GPR_DATA0_PTR, GPR_DATA1_PTR, GPR_FLASH_CTLR,
    GPR_FLASH_LOAD, GPR_S0, GPR_S1, LOAD_BYTE, READ_WORD_LOAD, READ_WORD_STORE,
    READ_WORD_STORE_INC, READ_WORD_WRITEBACK, STORE_BYTE, WRITE_WORD_ADVANCE, WRITE_WORD_END,
    WRITE_WORD_FLASH_LOAD, WRITE_WORD_STORE,
};
use swiofrog_core::rv::register::{Readable, Writable};

use crate::SwioError;
use crate::protocol::SwioLink;

// ABSTRACTCS busy polls before giving up on an abstract command.  A healthy
// target finishes in one or two.
const MAX_DONE_OP_POLLS: u32 = 1000;

/// What the debug module's program buffer currently holds, and so which
/// accesses can skip reloading it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionTag {
    /// Nothing known - the link has not been initialized
    #[default]
    None,

    /// The word read program is loaded, with autoexec on DATA0
    ReadSequence,

    /// The word write program is loaded, with autoexec on DATA0
    WriteSequence,

    /// The terminal is using DATA0/DATA1 as a mailbox
    Terminal,

    /// The link has been initialized, but nothing loaded
    Started,

    /// Something else has used the program buffer
    Invalidated,
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionTag::None => "None",
            SessionTag::ReadSequence => "Read Sequence",
            SessionTag::WriteSequence => "Write Sequence",
            SessionTag::Terminal => "Terminal",
            SessionTag::Started => "Started",
            SessionTag::Invalidated => "Invalidated",
        };
        write!(f, "{s}")
    }
}

/// Cached knowledge of the target's debug module state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    /// What the program buffer holds
    pub tag: SessionTag,

    /// The address the loaded program will access next
    pub cached_addr: u32,

    /// Whether the loaded read program advances the address
    pub autoincrement: bool,

    /// Whether the loaded write program latches into the flash page buffer
    pub last_write_flash: bool,

    /// Whether the flash has been unlocked this session
    pub flash_unlocked: bool,
}

/// SWIO Interface object
///
/// This is used by [`crate::DebugInterface`] to access target memory.
/// Most applications will prefer [`crate::DebugInterface`], which provides
/// halt control and flash programming on top.
///
/// Create using `SwioInterface::new()` passing in a [`SwioLink`], usually a
/// [`crate::SwioProtocol`].
///
/// ```rust,ignore
/// let swio = SwioProtocol::new(pin, delay, 7);
/// let mut swio_if = SwioInterface::new(swio);
/// let word = swio_if.read_word(0x0800_0000)?;
/// ```
#[derive(Debug)]
pub struct SwioInterface<L: SwioLink> {
    link: L,
    state: LinkState,
}

impl<L: SwioLink> SwioInterface<L> {
    /// Create a new SWIO interface, with no knowledge of the target state.
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: LinkState::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn tag(&self) -> SessionTag {
        self.state.tag
    }

    pub fn set_tag(&mut self, tag: SessionTag) {
        self.state.tag = tag;
    }

    pub fn flash_unlocked(&self) -> bool {
        self.state.flash_unlocked
    }

    pub fn set_flash_unlocked(&mut self, unlocked: bool) {
        self.state.flash_unlocked = unlocked;
    }

    /// Forgets everything known about the target.  Call whenever the target
    /// may have been reset or power cycled.
    pub fn reset_state(&mut self) {
        trace!("Info:  Reset link state");
        self.state = LinkState::default();
    }

    /// Marks the program buffer contents as unknown, so the next memory
    /// access reloads it.
    pub fn invalidate(&mut self) {
        self.state.tag = SessionTag::Invalidated;
    }

    /// Busy-waits for `us` microseconds using the link's delay.
    pub fn delay_us(&mut self, us: u32) {
        self.link.delay_us(us);
    }

    /// Busy-waits for `ms` milliseconds using the link's delay.
    pub fn delay_ms(&mut self, ms: u32) {
        self.link.delay_us(ms * 1000);
    }

    /// Read a Debug Module register.
    ///
    /// Arguments:
    /// - `reg`: The register marker, which must be `Readable`.
    ///
    /// Returns:
    /// - `Ok(value)` if the register was read successfully.
    /// - `Err(SwioError::BusFault)` if the read frame failed.
    ///
    /// ```rust,ignore
    /// use swiofrog_core::rv::dm::DmStatusRegister;
    /// let status = swio_if.read_dm_register(DmStatusRegister)?;
    /// ```
    pub fn read_dm_register<R>(&mut self, _reg: R) -> Result<R::Value, SwioError>
    where
        R: Readable,
        R::Value: From<u32>,
    {
        let raw = self.link.read_reg(R::ADDRESS)?;
        trace!("Value: {} = 0x{raw:08X}", R::NAME);
        Ok(raw.into())
    }

    /// Write a Debug Module register.
    ///
    /// Arguments:
    /// - `reg`: The register marker, which must be `Writable`.
    /// - `value`: The typed value to write.
    ///
    /// Writes are not acknowledged on SWIO, so this cannot fail.
    pub fn write_dm_register<R>(&mut self, _reg: R, value: R::Value)
    where
        R: Writable,
        R::Value: Into<u32>,
    {
        self.link.write_reg(R::ADDRESS, value.into());
    }

    /// Read a Debug Module register by address.
    pub fn read_reg(&mut self, reg: u8) -> Result<u32, SwioError> {
        self.link.read_reg(reg)
    }

    /// Write a Debug Module register by address.
    ///
    /// As the write may change anything, the loaded program is forgotten.
    pub fn write_reg(&mut self, reg: u8, value: u32) {
        self.link.write_reg(reg, value);
        self.invalidate();
    }

    // Preload the GPRs the word access programs rely on.
    fn load_static_registers(&mut self) {
        trace!("Exec:  Load static GPRs");
        let preload = [
            (DATA0_ALIAS, GPR_DATA0_PTR),
            (DATA1_ALIAS, GPR_DATA1_PTR),
            (Ch32FlashCtlr::ADDRESS, GPR_FLASH_CTLR),
            (Ch32FlashCtlr::PAGE_PG | Ch32FlashCtlr::BUF_LOAD, GPR_FLASH_LOAD),
        ];
        for (value, gpr) in preload {
            self.write_dm_register(Data0Register, DmData::new(value));
            self.write_dm_register(CommandRegister, AbstractCommand::write_gpr(gpr));
        }
    }

    /// Waits for the current abstract command to complete, and checks it
    /// succeeded.
    ///
    /// Returns:
    /// - `Ok(())` if the command completed without error.
    /// - `Err(SwioError::AbstractCommand)` if the debug module reported an
    ///   error.  The error has been cleared.
    /// - `Err(SwioError::BusFault)` if ABSTRACTCS could not be read.
    pub fn wait_for_done_op(&mut self) -> Result<(), SwioError> {
        let mut cs: AbstractCs = self.read_dm_register(AbstractCsRegister)?;
        let mut polls = 1;
        while cs.busy() {
            if polls >= MAX_DONE_OP_POLLS {
                warn!("Error: Abstract command still busy: {cs}");
                return Err(SwioError::AbstractCommand(cs.cmderr()));
            }
            cs = self.read_dm_register(AbstractCsRegister)?;
            polls += 1;
        }

        let cmderr = cs.cmderr();
        if cmderr.is_error() {
            debug!("Error: Abstract command failed: {cmderr}");
            self.write_dm_register(AbstractCsRegister, AbstractCs::CLEAR_CMDERR);
            return Err(SwioError::AbstractCommand(cmderr));
        }

        Ok(())
    }

    /// Reads a 32-bit word from the target's memory.
    ///
    /// Consecutive reads of incrementing addresses are streamed - each costs
    /// a single DATA0 read.  Reads of the flash control and status registers
    /// don't advance the address, so they can be polled cheaply.
    ///
    /// Arguments:
    /// - `addr`: The word aligned address to read.
    ///
    /// Returns:
    /// - `Ok(u32)`: the word read.
    /// - `Err(SwioError)`: if the read failed.
    pub fn read_word(&mut self, addr: u32) -> Result<u32, SwioError> {
        let autoincrement = addr != Ch32FlashCtlr::ADDRESS && addr != Ch32FlashStatr::ADDRESS;
        let tag = self.state.tag;

        if tag != SessionTag::ReadSequence
            || addr != self.state.cached_addr
            || autoincrement != self.state.autoincrement
        {
            if tag != SessionTag::ReadSequence || autoincrement != self.state.autoincrement {
                trace!("Exec:  Load read program, autoincrement {autoincrement}");
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
                self.write_dm_register(ProgBufRegister::<0>, READ_WORD_LOAD);
                let store = if autoincrement {
                    READ_WORD_STORE_INC
                } else {
                    READ_WORD_STORE
                };
                self.write_dm_register(ProgBufRegister::<1>, store);
                self.write_dm_register(ProgBufRegister::<2>, READ_WORD_WRITEBACK);

                if tag != SessionTag::WriteSequence {
                    self.load_static_registers();
                }
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DATA0);
                self.state.autoincrement = autoincrement;
            }

            self.write_dm_register(Data1Register, DmData::new(addr));
            self.write_dm_register(CommandRegister, AbstractCommand::EXECUTE);

            self.state.tag = SessionTag::ReadSequence;
            self.state.cached_addr = addr;

            self.wait_for_done_op()?;
        }

        if self.state.autoincrement {
            self.state.cached_addr = self.state.cached_addr.wrapping_add(4);
        }

        let data = self.read_dm_register(Data0Register)?;
        Ok(data.value())
    }

    /// Writes a 32-bit word to the target's memory.
    ///
    /// Consecutive writes to incrementing addresses are streamed.  Writes
    /// to flash also latch the word into the flash page buffer, so the
    /// flash controller must already be in page programming mode.
    ///
    /// Arguments:
    /// - `addr`: The word aligned address to write.
    /// - `data`: The word to write.
    ///
    /// Returns:
    /// - `Ok(())`: if the write completed.
    /// - `Err(SwioError)`: if the debug module reported an error.
    pub fn write_word(&mut self, addr: u32, data: u32) -> Result<(), SwioError> {
        let is_flash = ch32::is_mapped_flash(addr);
        let tag = self.state.tag;

        if tag != SessionTag::WriteSequence || is_flash != self.state.last_write_flash {
            let mut did_disable = false;
            if tag != SessionTag::WriteSequence {
                trace!("Exec:  Load write program");
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
                did_disable = true;
                self.write_dm_register(ProgBufRegister::<0>, WRITE_WORD_STORE);
                self.write_dm_register(ProgBufRegister::<1>, WRITE_WORD_ADVANCE);

                if tag != SessionTag::ReadSequence {
                    self.load_static_registers();
                }
            }

            let end = if is_flash {
                WRITE_WORD_FLASH_LOAD
            } else {
                WRITE_WORD_END
            };
            self.write_dm_register(ProgBufRegister::<2>, end);

            self.write_dm_register(Data1Register, DmData::new(addr));
            self.write_dm_register(Data0Register, DmData::new(data));

            if did_disable {
                self.write_dm_register(
                    CommandRegister,
                    AbstractCommand::write_gpr_and_execute(GPR_S0),
                );
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DATA0);
            }

            self.state.last_write_flash = is_flash;
            self.state.tag = SessionTag::WriteSequence;
            self.state.cached_addr = addr;

            if is_flash {
                self.wait_for_done_op()?;
            }
        } else {
            if addr != self.state.cached_addr {
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
                self.write_dm_register(Data1Register, DmData::new(addr));
                self.write_dm_register(AbstractAutoRegister, AbstractAuto::DATA0);
            }
            self.write_dm_register(Data0Register, DmData::new(data));
            self.wait_for_done_op()?;
        }

        self.state.cached_addr = self.state.cached_addr.wrapping_add(4);
        Ok(())
    }

    /// Reads a single byte from the target's memory.
    ///
    /// This replaces the loaded program, so subsequent word accesses must
    /// reload theirs.
    pub fn read_byte(&mut self, addr: u32) -> Result<u8, SwioError> {
        self.state.tag = SessionTag::Invalidated;

        self.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
        self.write_dm_register(ProgBufRegister::<0>, LOAD_BYTE);
        self.write_dm_register(ProgBufRegister::<1>, EBREAK);

        self.write_dm_register(Data0Register, DmData::new(addr));
        self.write_dm_register(CommandRegister, AbstractCommand::write_gpr(GPR_S1));
        self.write_dm_register(CommandRegister, AbstractCommand::EXECUTE);
        self.write_dm_register(CommandRegister, AbstractCommand::read_gpr(GPR_S0));

        self.wait_for_done_op()?;

        let data = self.read_dm_register(Data0Register)?;
        Ok((data.value() & 0xFF) as u8)
    }

    /// Writes a single byte to the target's memory.
    ///
    /// This replaces the loaded program, so subsequent word accesses must
    /// reload theirs.
    pub fn write_byte(&mut self, addr: u32, data: u8) -> Result<(), SwioError> {
        self.state.tag = SessionTag::Invalidated;

        self.write_dm_register(AbstractAutoRegister, AbstractAuto::DISABLED);
        self.write_dm_register(ProgBufRegister::<0>, STORE_BYTE);
        self.write_dm_register(ProgBufRegister::<1>, EBREAK);

        self.write_dm_register(Data0Register, DmData::new(addr));
        self.write_dm_register(CommandRegister, AbstractCommand::write_gpr(GPR_S1));
        self.write_dm_register(Data0Register, DmData::new(data as u32));
        self.write_dm_register(
            CommandRegister,
            AbstractCommand::write_gpr_and_execute(GPR_S0),
        );

        self.wait_for_done_op()
    }
}
