// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! WCH RISC-V Debug Module Registers
//!
//! The CH32V00x debug module follows the RISC-V External Debug Support
//! register layout, plus three vendor registers (`CPBR`, `CFGR` and
//! `SHDWCFGR`) used to configure the SWIO pin itself.  Addresses are the
//! 7-bit command field sent in each SWIO frame.

use crate::rv::register::{DmRegister, Writable};
use crate::{dm_registers, register_value};
use core::fmt;

dm_registers! {
    /// DATA0, abstract command argument and result
    Data0Register @ 0x04: DmData, Readable Writable;
    /// DATA1, used as the address argument by the memory access programs
    Data1Register @ 0x05: DmData, Readable Writable;
    /// DMCONTROL
    DmControlRegister @ 0x10: DmControl, Readable Writable;
    /// DMSTATUS
    DmStatusRegister @ 0x11: DmStatus, Readable;
    /// HARTINFO
    HartInfoRegister @ 0x12: HartInfo, Readable;
    /// ABSTRACTCS
    AbstractCsRegister @ 0x16: AbstractCs, Readable Writable;
    /// COMMAND
    CommandRegister @ 0x17: AbstractCommand, Writable;
    /// ABSTRACTAUTO
    AbstractAutoRegister @ 0x18: AbstractAuto, Readable Writable;
    /// CPBR, WCH capabilities
    CpbrRegister @ 0x7C: Cpbr, Readable;
    /// CFGR, WCH SWIO configuration
    CfgrRegister @ 0x7D: Cfgr, Writable;
    /// SHDWCFGR, shadow of CFGR
    ShadowCfgrRegister @ 0x7E: Cfgr, Writable;
}

/// Contents of one of the abstract data registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmData(u32);

register_value!(DmData);

impl DmData {
    pub const fn new(value: u32) -> Self {
        DmData(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Debug Module DMCONTROL register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmControl(u32);

register_value!(DmControl);

impl DmControl {
    pub const DMACTIVE: u32 = 1 << 0;
    pub const NDMRESET: u32 = 1 << 1;
    pub const ACKHAVERESET: u32 = 1 << 28;
    pub const RESUMEREQ: u32 = 1 << 30;
    pub const HALTREQ: u32 = 1 << 31;

    /// Request a halt, keeping the debug module active
    pub const HALT: DmControl = DmControl(Self::HALTREQ | Self::DMACTIVE);

    /// Request a halt while asserting the system reset
    pub const HALT_AND_RESET: DmControl =
        DmControl(Self::HALTREQ | Self::NDMRESET | Self::DMACTIVE);

    /// Request the hart resumes
    pub const RESUME: DmControl = DmControl(Self::RESUMEREQ | Self::DMACTIVE);

    pub const fn new(value: u32) -> Self {
        DmControl(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn dmactive(&self) -> bool {
        self.0 & Self::DMACTIVE != 0
    }

    pub fn ndmreset(&self) -> bool {
        self.0 & Self::NDMRESET != 0
    }

    pub fn haltreq(&self) -> bool {
        self.0 & Self::HALTREQ != 0
    }

    pub fn resumereq(&self) -> bool {
        self.0 & Self::RESUMEREQ != 0
    }
}

/// Debug Module DMSTATUS register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmStatus(u32);

register_value!(DmStatus);

impl DmStatus {
    const VERSION_MASK: u32 = 0xF;
    const AUTHBUSY: u32 = 1 << 6;
    const AUTHENTICATED: u32 = 1 << 7;
    const ANYHALTED: u32 = 1 << 8;
    const ALLHALTED: u32 = 1 << 9;
    const ANYRUNNING: u32 = 1 << 10;
    const ALLRUNNING: u32 = 1 << 11;

    pub const fn new(value: u32) -> Self {
        DmStatus(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Debug specification version implemented by the debug module
    pub fn version(&self) -> u8 {
        (self.0 & Self::VERSION_MASK) as u8
    }

    pub fn authenticated(&self) -> bool {
        self.0 & Self::AUTHENTICATED != 0
    }

    pub fn authbusy(&self) -> bool {
        self.0 & Self::AUTHBUSY != 0
    }

    pub fn anyhalted(&self) -> bool {
        self.0 & Self::ANYHALTED != 0
    }

    pub fn allhalted(&self) -> bool {
        self.0 & Self::ALLHALTED != 0
    }

    pub fn anyrunning(&self) -> bool {
        self.0 & Self::ANYRUNNING != 0
    }

    pub fn allrunning(&self) -> bool {
        self.0 & Self::ALLRUNNING != 0
    }

    /// All zeros or all ones, which is what an undriven (pulled-up or
    /// shorted) SWIO line reads back as.
    pub fn is_blank(&self) -> bool {
        self.0 == 0 || self.0 == 0xFFFF_FFFF
    }

    /// Whether the debug module has come up and finished authenticating.
    pub fn is_ready(&self) -> bool {
        let auth_pending = (self.0 & (Self::AUTHENTICATED | Self::AUTHBUSY)) == Self::AUTHBUSY;
        !(auth_pending || self.is_blank())
    }
}

/// Debug Module HARTINFO register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HartInfo(u32);

register_value!(HartInfo);

impl HartInfo {
    /// Number of data registers
    pub fn datasize(&self) -> u8 {
        ((self.0 >> 12) & 0xF) as u8
    }

    /// Address of the first data register in the hart's memory map
    pub fn dataaddr(&self) -> u16 {
        (self.0 & 0xFFF) as u16
    }
}

/// Debug Module ABSTRACTCS register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbstractCs(u32);

register_value!(AbstractCs);

impl AbstractCs {
    const DATACOUNT_MASK: u32 = 0xF;
    const CMDERR_SHIFT: u32 = 8;
    const CMDERR_MASK: u32 = 0b111;
    const BUSY: u32 = 1 << 12;
    const PROGBUFSIZE_SHIFT: u32 = 24;
    const PROGBUFSIZE_MASK: u32 = 0b11111;

    /// Writing this value clears (write-1-to-clear) the whole CMDERR field
    pub const CLEAR_CMDERR: AbstractCs = AbstractCs(Self::CMDERR_MASK << Self::CMDERR_SHIFT);

    pub const fn new(value: u32) -> Self {
        AbstractCs(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// An abstract command is currently executing
    pub fn busy(&self) -> bool {
        self.0 & Self::BUSY != 0
    }

    pub fn cmderr(&self) -> CmdErr {
        CmdErr::from(((self.0 >> Self::CMDERR_SHIFT) & Self::CMDERR_MASK) as u8)
    }

    pub fn progbufsize(&self) -> u8 {
        ((self.0 >> Self::PROGBUFSIZE_SHIFT) & Self::PROGBUFSIZE_MASK) as u8
    }

    pub fn datacount(&self) -> u8 {
        (self.0 & Self::DATACOUNT_MASK) as u8
    }
}

/// ABSTRACTCS CMDERR field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdErr {
    None,
    Busy,
    NotSupported,
    Exception,
    HaltResume,
    Bus,
    Other(u8),
}

impl From<u8> for CmdErr {
    fn from(value: u8) -> Self {
        match value {
            0 => CmdErr::None,
            1 => CmdErr::Busy,
            2 => CmdErr::NotSupported,
            3 => CmdErr::Exception,
            4 => CmdErr::HaltResume,
            5 => CmdErr::Bus,
            other => CmdErr::Other(other),
        }
    }
}

impl From<CmdErr> for u8 {
    fn from(value: CmdErr) -> u8 {
        match value {
            CmdErr::None => 0,
            CmdErr::Busy => 1,
            CmdErr::NotSupported => 2,
            CmdErr::Exception => 3,
            CmdErr::HaltResume => 4,
            CmdErr::Bus => 5,
            CmdErr::Other(value) => value,
        }
    }
}

impl CmdErr {
    pub fn is_error(&self) -> bool {
        !matches!(self, CmdErr::None)
    }
}

impl fmt::Display for CmdErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdErr::None => write!(f, "none"),
            CmdErr::Busy => write!(f, "busy"),
            CmdErr::NotSupported => write!(f, "not supported"),
            CmdErr::Exception => write!(f, "exception"),
            CmdErr::HaltResume => write!(f, "hart not in required state"),
            CmdErr::Bus => write!(f, "bus error"),
            CmdErr::Other(value) => write!(f, "other ({value})"),
        }
    }
}

/// An "access register" abstract command
///
/// Only 32-bit general purpose register accesses are used, so the
/// constructors fix `aarsize` to 2 and the register number to the GPR range
/// (0x1000 + x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbstractCommand(u32);

register_value!(AbstractCommand, write_only);

impl AbstractCommand {
    const AARSIZE_32: u32 = 2 << 20;
    const POSTEXEC: u32 = 1 << 18;
    const TRANSFER: u32 = 1 << 17;
    const WRITE: u32 = 1 << 16;
    const GPR_BASE: u32 = 0x1000;

    /// Execute the program buffer without transferring any register
    pub const EXECUTE: AbstractCommand =
        AbstractCommand(Self::AARSIZE_32 | Self::POSTEXEC | Self::GPR_BASE);

    pub const fn new(value: u32) -> Self {
        AbstractCommand(value)
    }

    /// Copy DATA0 into GPR `x<gpr>`
    pub const fn write_gpr(gpr: u8) -> Self {
        AbstractCommand(Self::AARSIZE_32 | Self::TRANSFER | Self::WRITE | Self::GPR_BASE | gpr as u32)
    }

    /// Copy GPR `x<gpr>` into DATA0
    pub const fn read_gpr(gpr: u8) -> Self {
        AbstractCommand(Self::AARSIZE_32 | Self::TRANSFER | Self::GPR_BASE | gpr as u32)
    }

    /// Copy DATA0 into GPR `x<gpr>`, then execute the program buffer
    pub const fn write_gpr_and_execute(gpr: u8) -> Self {
        AbstractCommand(
            Self::AARSIZE_32
                | Self::POSTEXEC
                | Self::TRANSFER
                | Self::WRITE
                | Self::GPR_BASE
                | gpr as u32,
        )
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn regno(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn postexec(&self) -> bool {
        self.0 & Self::POSTEXEC != 0
    }

    pub fn transfer(&self) -> bool {
        self.0 & Self::TRANSFER != 0
    }

    pub fn write(&self) -> bool {
        self.0 & Self::WRITE != 0
    }

    /// The GPR index this command transfers, if it targets a GPR
    pub fn gpr(&self) -> Option<u8> {
        let regno = self.regno() as u32;
        if (Self::GPR_BASE..Self::GPR_BASE + 32).contains(&regno) {
            Some((regno - Self::GPR_BASE) as u8)
        } else {
            None
        }
    }
}

impl From<u32> for AbstractCommand {
    fn from(value: u32) -> Self {
        AbstractCommand(value)
    }
}

/// Debug Module ABSTRACTAUTO register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbstractAuto(u32);

register_value!(AbstractAuto);

impl AbstractAuto {
    /// No automatic re-execution
    pub const DISABLED: AbstractAuto = AbstractAuto(0);

    /// Re-run the last command on every DATA0 access
    pub const DATA0: AbstractAuto = AbstractAuto(1);

    pub fn autoexec_data0(&self) -> bool {
        self.0 & 1 != 0
    }
}

/// PROGBUF0-7, one instruction word each
pub struct ProgBufRegister<const N: u8>;

impl<const N: u8> DmRegister for ProgBufRegister<N> {
    const ADDRESS: u8 = {
        assert!(N < PROGBUF_COUNT);
        PROGBUF0_ADDRESS + N
    };
    const NAME: &'static str = "ProgBufRegister";
    type Value = Instruction;
}

impl<const N: u8> Writable for ProgBufRegister<N> {}

/// Address of the first program buffer register
pub const PROGBUF0_ADDRESS: u8 = 0x20;

/// Number of program buffer registers
pub const PROGBUF_COUNT: u8 = 8;

/// One 32-bit program buffer word - either a full-size instruction or a pair
/// of compressed instructions, lower half executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction(u32);

register_value!(Instruction, write_only);

impl Instruction {
    pub const fn new(value: u32) -> Self {
        Instruction(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// WCH capability register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cpbr(u32);

register_value!(Cpbr);

/// WCH SWIO configuration register data, shared by CFGR and SHDWCFGR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cfgr(u32);

register_value!(Cfgr, write_only);

impl Cfgr {
    const KEY: u32 = 0x5AA5 << 16;
    const OUTEN: u32 = 1 << 10;

    /// Keyed write enabling SWIO output from the target
    pub const OUTPUT_ENABLE: Cfgr = Cfgr(Self::KEY | Self::OUTEN);
}
