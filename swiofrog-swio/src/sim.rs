// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated CH32V003 target, for host tests.
//!
//! Implements [`SwioLink`] at the debug module register level: abstract
//! commands, autoexec, an interpreter for the instructions the program
//! buffer micro-programs use, RAM/flash/system memory, the flash controller
//! (keys, locks, page buffer, erase, busy and write protect), halt state and
//! the target side of the terminal mailbox.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use swiofrog_core::ch32::{
    CH32V003_ESIG_FLACAP, CH32V003_ESIG_UNIID1, CH32V003_FLASH_BASE, CH32V003_FLASH_SIZE,
    CH32V003_OPTION_BYTES, CH32V003_RAM_BASE, CH32V003_RAM_SIZE, Ch32FlashAddr,
    Ch32FlashBootModekeyr, Ch32FlashCtlr, Ch32FlashKeyr, Ch32FlashModekeyr, Ch32FlashObkeyr,
    Ch32FlashStatr,
};
use swiofrog_core::rv::dm::{AbstractCommand, DmControl};
use swiofrog_core::rv::program::{DATA0_ALIAS, DATA1_ALIAS};

use crate::SwioError;
use crate::protocol::SwioLink;

const SYS_BASE: u32 = 0x1FFF_F000;
const SYS_SIZE: u32 = 0x900;

const REG_DATA0: u8 = 0x04;
const REG_DATA1: u8 = 0x05;
const REG_DMCONTROL: u8 = 0x10;
const REG_DMSTATUS: u8 = 0x11;
const REG_HARTINFO: u8 = 0x12;
const REG_ABSTRACTCS: u8 = 0x16;
const REG_COMMAND: u8 = 0x17;
const REG_ABSTRACTAUTO: u8 = 0x18;
const REG_PROGBUF0: u8 = 0x20;
const REG_CFGR: u8 = 0x7D;
const REG_SHDWCFGR: u8 = 0x7E;

const CMDERR_NOT_SUPPORTED: u8 = 2;
const CMDERR_EXCEPTION: u8 = 3;
const CMDERR_HALT_RESUME: u8 = 4;

const STATUS_HALTED: u32 = 0x0000_0382;
const STATUS_RUNNING: u32 = 0x0000_0C82;

/// What is on the other end of the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Connected,
    /// Nothing drives the line - every read times out
    Absent,
    /// Something answers, but all registers read back as zero
    Blank,
}

enum Step {
    Next(usize),
    Break,
    Fault,
}

#[derive(Debug)]
pub struct SimTarget {
    presence: Presence,

    // Debug module
    data0: u32,
    data1: u32,
    progbuf: [u32; 8],
    gpr: [u32; 32],
    abstractauto: u32,
    last_command: u32,
    cmderr: u8,
    halted: bool,
    status_override: Option<u32>,
    scratch: BTreeMap<u8, u32>,

    // Memory
    ram: Vec<u8>,
    flash: Vec<u8>,
    sys: Vec<u8>,

    // Flash controller
    ctlr: u32,
    statr: u32,
    flash_addr: u32,
    lock: bool,
    flock: bool,
    key_stage: BTreeMap<u32, bool>,
    keys_accepted: bool,
    boot_key: bool,
    boot_mode: bool,
    page_buf: [u8; 64],
    busy_reads: u32,
    busy_reads_per_op: u32,
    corrupt_programs: u32,

    // Terminal mailbox
    console_enabled: bool,
    console: VecDeque<u8>,
    host_ack: Option<u32>,
    keys: Vec<u8>,

    // Wire level
    power: Option<bool>,
    t1coeff: u32,
    elapsed_us: u64,

    // Counters
    frames: u32,
    progbuf0_writes: u32,
    unlocks: u32,
    page_programs: u32,
    page_erases: u32,
    chip_erases: u32,
    halts: u32,
    resets: u32,
    wake_sequences: u32,
    cfgr_writes: u32,
}

impl SimTarget {
    /// A connected, running target with erased flash and factory option
    /// bytes.
    pub fn new() -> Self {
        let mut sys = vec![0u8; SYS_SIZE as usize];
        let flacap = (CH32V003_ESIG_FLACAP - SYS_BASE) as usize;
        sys[flacap..flacap + 2].copy_from_slice(&16u16.to_le_bytes());
        let uid = (CH32V003_ESIG_UNIID1 - SYS_BASE) as usize;
        for (ii, word) in [0x1234_5678u32, 0x9ABC_DEF0, 0x0000_0001]
            .iter()
            .enumerate()
        {
            sys[uid + ii * 4..uid + ii * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        let ob = (CH32V003_OPTION_BYTES - SYS_BASE) as usize;
        sys[ob..ob + 12].copy_from_slice(&swiofrog_core::ch32::FACTORY_OPTION_BYTES);

        Self {
            presence: Presence::Connected,
            data0: 0,
            data1: 0,
            progbuf: [0; 8],
            gpr: [0; 32],
            abstractauto: 0,
            last_command: 0,
            cmderr: 0,
            halted: false,
            status_override: None,
            scratch: BTreeMap::new(),
            ram: vec![0u8; CH32V003_RAM_SIZE as usize],
            flash: vec![0xFFu8; CH32V003_FLASH_SIZE as usize],
            sys,
            ctlr: 0,
            statr: 0,
            flash_addr: 0,
            lock: true,
            flock: true,
            key_stage: BTreeMap::new(),
            keys_accepted: true,
            boot_key: false,
            boot_mode: false,
            page_buf: [0xFF; 64],
            busy_reads: 0,
            busy_reads_per_op: 1,
            corrupt_programs: 0,
            console_enabled: false,
            console: VecDeque::new(),
            host_ack: None,
            keys: Vec::new(),
            power: None,
            t1coeff: 0,
            elapsed_us: 0,
            frames: 0,
            progbuf0_writes: 0,
            unlocks: 0,
            page_programs: 0,
            page_erases: 0,
            chip_erases: 0,
            halts: 0,
            resets: 0,
            wake_sequences: 0,
            cfgr_writes: 0,
        }
    }

    /// Adds a power control pin, with the target powered.
    pub fn with_power(mut self) -> Self {
        self.power = Some(true);
        self
    }

    // Test setup

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn disconnect(&mut self) {
        self.presence = Presence::Absent;
    }

    pub fn set_presence(&mut self, presence: Presence) {
        self.presence = presence;
    }

    pub fn reject_keys(&mut self) {
        self.keys_accepted = false;
    }

    pub fn set_busy_reads_per_op(&mut self, reads: u32) {
        self.busy_reads_per_op = reads;
    }

    pub fn corrupt_next_programs(&mut self, count: u32) {
        self.corrupt_programs = count;
    }

    pub fn load_ram(&mut self, addr: u32, data: &[u8]) {
        let start = (addr - CH32V003_RAM_BASE) as usize;
        self.ram[start..start + data.len()].copy_from_slice(data);
    }

    pub fn load_flash(&mut self, addr: u32, data: &[u8]) {
        let start = (addr & 0x00FF_FFFF) as usize;
        self.flash[start..start + data.len()].copy_from_slice(data);
    }

    pub fn set_option_bytes(&mut self, data: &[u8]) {
        let ob = (CH32V003_OPTION_BYTES - SYS_BASE) as usize;
        self.sys[ob..ob + data.len()].copy_from_slice(data);
    }

    /// Queues text for the target to print over the terminal mailbox.
    pub fn print(&mut self, text: &str) {
        self.console_enabled = true;
        self.console.extend(text.bytes());
    }

    pub fn enable_console(&mut self) {
        self.console_enabled = true;
    }

    // Inspection

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn ram_word(&self, addr: u32) -> u32 {
        let start = (addr - CH32V003_RAM_BASE) as usize;
        u32::from_le_bytes([
            self.ram[start],
            self.ram[start + 1],
            self.ram[start + 2],
            self.ram[start + 3],
        ])
    }

    pub fn flash_bytes(&self, addr: u32, len: usize) -> &[u8] {
        let start = (addr & 0x00FF_FFFF) as usize;
        &self.flash[start..start + len]
    }

    pub fn option_bytes(&self) -> &[u8] {
        let ob = (CH32V003_OPTION_BYTES - SYS_BASE) as usize;
        &self.sys[ob..ob + 16]
    }

    pub fn flash_locked(&self) -> bool {
        self.lock || self.flock
    }

    pub fn boot_mode(&self) -> bool {
        self.boot_mode
    }

    pub fn keys_received(&self) -> &[u8] {
        &self.keys
    }

    pub fn power(&self) -> Option<bool> {
        self.power
    }

    pub fn t1coeff(&self) -> u32 {
        self.t1coeff
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn progbuf0_writes(&self) -> u32 {
        self.progbuf0_writes
    }

    pub fn unlocks(&self) -> u32 {
        self.unlocks
    }

    pub fn page_programs(&self) -> u32 {
        self.page_programs
    }

    pub fn page_erases(&self) -> u32 {
        self.page_erases
    }

    pub fn chip_erases(&self) -> u32 {
        self.chip_erases
    }

    pub fn halts(&self) -> u32 {
        self.halts
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn wake_sequences(&self) -> u32 {
        self.wake_sequences
    }

    pub fn cfgr_writes(&self) -> u32 {
        self.cfgr_writes
    }

    // Debug module

    fn reset_core(&mut self) {
        self.resets += 1;
        self.lock = true;
        self.flock = true;
        self.ctlr = 0;
        self.key_stage.clear();
        self.boot_key = false;
        self.page_buf = [0xFF; 64];
        self.host_ack = None;
    }

    fn write_dmcontrol(&mut self, value: u32) {
        let control = DmControl::new(value);
        if control.ndmreset() {
            self.reset_core();
        }
        if control.haltreq() {
            if !self.halted {
                self.halts += 1;
            }
            self.halted = true;
        } else if control.resumereq() {
            self.halted = false;
        }
    }

    fn abstractcs(&self) -> u32 {
        (8 << 24) | ((self.cmderr as u32) << 8) | 2
    }

    fn run_command(&mut self, value: u32) {
        self.last_command = value;
        if self.cmderr != 0 {
            return;
        }

        let command = AbstractCommand::from(value);
        if command.transfer() {
            if !self.halted {
                self.cmderr = CMDERR_HALT_RESUME;
                return;
            }
            let Some(gpr) = command.gpr() else {
                self.cmderr = CMDERR_NOT_SUPPORTED;
                return;
            };
            if command.write() {
                self.set_gpr(gpr as usize, self.data0);
            } else {
                self.data0 = self.gpr[gpr as usize];
            }
        }

        if command.postexec() {
            if !self.halted {
                self.cmderr = CMDERR_HALT_RESUME;
                return;
            }
            self.execute_progbuf();
        }
    }

    fn set_gpr(&mut self, gpr: usize, value: u32) {
        if gpr != 0 {
            self.gpr[gpr] = value;
        }
    }

    fn progbuf_half(&self, pc: usize) -> u16 {
        let word = self.progbuf[pc / 4];
        if pc % 4 == 0 {
            word as u16
        } else {
            (word >> 16) as u16
        }
    }

    fn execute_progbuf(&mut self) {
        let mut pc = 0usize;
        while pc + 2 <= 32 {
            let half = self.progbuf_half(pc);
            let step = if half & 3 != 3 {
                self.exec_compressed(half)
            } else if pc + 4 <= 32 {
                let insn = half as u32 | ((self.progbuf_half(pc + 2) as u32) << 16);
                self.exec_full(insn)
            } else {
                Step::Fault
            };
            match step {
                Step::Next(len) => pc += len,
                Step::Break => return,
                Step::Fault => {
                    self.cmderr = CMDERR_EXCEPTION;
                    return;
                }
            }
        }
    }

    fn exec_compressed(&mut self, h: u16) -> Step {
        let h = h as u32;
        let op = h & 3;
        let funct3 = (h >> 13) & 7;
        let rdp = 8 + ((h >> 2) & 7) as usize;
        let rs1p = 8 + ((h >> 7) & 7) as usize;
        let offset = (((h >> 6) & 1) << 2) | (((h >> 10) & 7) << 3) | (((h >> 5) & 1) << 6);

        match (op, funct3) {
            (0, 0b010) => {
                let addr = self.gpr[rs1p].wrapping_add(offset);
                match self.load32(addr) {
                    Some(value) => {
                        self.set_gpr(rdp, value);
                        Step::Next(2)
                    }
                    None => Step::Fault,
                }
            }
            (0, 0b110) => {
                let addr = self.gpr[rs1p].wrapping_add(offset);
                if self.store32(addr, self.gpr[rdp]) {
                    Step::Next(2)
                } else {
                    Step::Fault
                }
            }
            (1, 0b000) => {
                let rd = ((h >> 7) & 31) as usize;
                let mut imm = (((h >> 12) & 1) << 5) | ((h >> 2) & 31);
                if imm & 0x20 != 0 {
                    imm |= 0xFFFF_FFC0;
                }
                let value = self.gpr[rd].wrapping_add(imm);
                self.set_gpr(rd, value);
                Step::Next(2)
            }
            _ if h == 0x9002 => Step::Break,
            _ => Step::Fault,
        }
    }

    fn exec_full(&mut self, insn: u32) -> Step {
        if insn == 0x0010_0073 {
            return Step::Break;
        }
        let opcode = insn & 0x7F;
        let funct3 = (insn >> 12) & 7;
        let rd = ((insn >> 7) & 31) as usize;
        let rs1 = ((insn >> 15) & 31) as usize;
        let rs2 = ((insn >> 20) & 31) as usize;

        match (opcode, funct3) {
            (0x03, 0) => {
                let imm = ((insn as i32) >> 20) as u32;
                match self.load8(self.gpr[rs1].wrapping_add(imm)) {
                    Some(byte) => {
                        self.set_gpr(rd, byte as i8 as i32 as u32);
                        Step::Next(4)
                    }
                    None => Step::Fault,
                }
            }
            (0x23, 0) => {
                let imm = ((((insn as i32) >> 25) << 5) as u32) | ((insn >> 7) & 31);
                if self.store8(self.gpr[rs1].wrapping_add(imm), self.gpr[rs2] as u8) {
                    Step::Next(4)
                } else {
                    Step::Fault
                }
            }
            _ => Step::Fault,
        }
    }

    // Memory

    fn in_region(addr: u32, base: u32, size: u32) -> Option<usize> {
        if addr >= base && addr - base < size {
            Some((addr - base) as usize)
        } else {
            None
        }
    }

    fn flash_offset(addr: u32) -> Option<usize> {
        Self::in_region(addr, CH32V003_FLASH_BASE, CH32V003_FLASH_SIZE)
            .or_else(|| Self::in_region(addr, 0, CH32V003_FLASH_SIZE))
    }

    fn load8(&mut self, addr: u32) -> Option<u8> {
        let word = self.load32(addr & !3)?;
        Some((word >> ((addr & 3) * 8)) as u8)
    }

    fn store8(&mut self, addr: u32, value: u8) -> bool {
        if let Some(off) = Self::in_region(addr, CH32V003_RAM_BASE, CH32V003_RAM_SIZE) {
            self.ram[off] = value;
            return true;
        }
        if let Some(off) = Self::in_region(addr, CH32V003_OPTION_BYTES, 16) {
            let base = (CH32V003_OPTION_BYTES - SYS_BASE) as usize;
            self.sys[base + off] = value;
            return true;
        }
        false
    }

    fn load32(&mut self, addr: u32) -> Option<u32> {
        if addr & 3 != 0 {
            return None;
        }
        let bytes = |mem: &[u8], off: usize| {
            u32::from_le_bytes([mem[off], mem[off + 1], mem[off + 2], mem[off + 3]])
        };
        if let Some(off) = Self::in_region(addr, CH32V003_RAM_BASE, CH32V003_RAM_SIZE) {
            return Some(bytes(&self.ram, off));
        }
        if let Some(off) = Self::flash_offset(addr) {
            return Some(bytes(&self.flash, off));
        }
        if let Some(off) = Self::in_region(addr, SYS_BASE, SYS_SIZE) {
            return Some(bytes(&self.sys, off));
        }
        match addr {
            DATA0_ALIAS => Some(self.data0),
            DATA1_ALIAS => Some(self.data1),
            Ch32FlashCtlr::ADDRESS => {
                let mut ctlr = self.ctlr;
                if self.lock {
                    ctlr |= Ch32FlashCtlr::LOCK;
                }
                if self.flock {
                    ctlr |= Ch32FlashCtlr::FLOCK;
                }
                Some(ctlr)
            }
            Ch32FlashStatr::ADDRESS => {
                let mut statr = self.statr;
                if self.busy_reads > 0 {
                    self.busy_reads -= 1;
                    statr |= 1 << Ch32FlashStatr::BSY_BIT;
                }
                Some(statr)
            }
            Ch32FlashAddr::ADDRESS => Some(self.flash_addr),
            0x4002_2000..=0x4002_202C => Some(0),
            _ => None,
        }
    }

    fn store32(&mut self, addr: u32, value: u32) -> bool {
        if addr & 3 != 0 {
            return false;
        }
        if let Some(off) = Self::in_region(addr, CH32V003_RAM_BASE, CH32V003_RAM_SIZE) {
            self.ram[off..off + 4].copy_from_slice(&value.to_le_bytes());
            return true;
        }
        if let Some(off) = Self::in_region(addr, CH32V003_OPTION_BYTES, 16) {
            let base = (CH32V003_OPTION_BYTES - SYS_BASE) as usize + off;
            self.sys[base..base + 4].copy_from_slice(&value.to_le_bytes());
            return true;
        }
        if Self::flash_offset(addr).is_some() || Self::in_region(addr, SYS_BASE, 0x800).is_some()
        {
            // Lands in the page buffer, if page programming
            if self.ctlr & Ch32FlashCtlr::PAGE_PG != 0 && !self.lock {
                let off = (addr & 0x3C) as usize;
                self.page_buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
            }
            return true;
        }
        match addr {
            DATA0_ALIAS => self.data0 = value,
            DATA1_ALIAS => self.data1 = value,
            Ch32FlashCtlr::ADDRESS => self.write_ctlr(value),
            Ch32FlashStatr::ADDRESS => {
                if value & (1 << Ch32FlashStatr::BOOT_MODE_BIT) != 0 && self.boot_key {
                    self.boot_mode = true;
                }
                self.statr &= !((1 << Ch32FlashStatr::WRPRTERR_BIT) | (1 << Ch32FlashStatr::EOP_BIT));
            }
            Ch32FlashAddr::ADDRESS => self.flash_addr = value,
            Ch32FlashKeyr::ADDRESS
            | Ch32FlashObkeyr::ADDRESS
            | Ch32FlashModekeyr::ADDRESS
            | Ch32FlashBootModekeyr::ADDRESS => self.write_key(addr, value),
            0x4002_2000..=0x4002_202C => {}
            _ => return false,
        }
        true
    }

    fn write_key(&mut self, reg: u32, value: u32) {
        let primed = self.key_stage.get(&reg).copied().unwrap_or(false);
        if value == Ch32FlashKeyr::KEY1 {
            self.key_stage.insert(reg, true);
            return;
        }
        self.key_stage.insert(reg, false);
        if !(primed && value == Ch32FlashKeyr::KEY2 && self.keys_accepted) {
            return;
        }
        match reg {
            Ch32FlashKeyr::ADDRESS => {
                self.lock = false;
                self.unlocks += 1;
            }
            Ch32FlashModekeyr::ADDRESS => self.flock = false,
            Ch32FlashBootModekeyr::ADDRESS => self.boot_key = true,
            _ => {}
        }
    }

    fn write_ctlr(&mut self, value: u32) {
        if value & Ch32FlashCtlr::LOCK != 0 {
            self.lock = true;
            self.flock = true;
            self.ctlr = 0;
            return;
        }
        if self.lock {
            if value & Ch32FlashCtlr::STRT != 0 {
                self.statr |= 1 << Ch32FlashStatr::WRPRTERR_BIT;
            }
            return;
        }

        self.ctlr = value & !(Ch32FlashCtlr::STRT | Ch32FlashCtlr::BUF_LOAD | Ch32FlashCtlr::BUF_RST);
        if value & Ch32FlashCtlr::BUF_RST != 0 {
            self.page_buf = [0xFF; 64];
        }
        if value & Ch32FlashCtlr::STRT == 0 {
            return;
        }

        let page = (self.flash_addr & 0x00FF_FFC0) as usize;
        if value & Ch32FlashCtlr::MER != 0 {
            self.flash.fill(0xFF);
            self.chip_erases += 1;
        } else if value & Ch32FlashCtlr::PAGE_ER != 0 {
            if page + 64 <= self.flash.len() {
                self.flash[page..page + 64].fill(0xFF);
            }
            self.page_erases += 1;
        } else if value & Ch32FlashCtlr::PAGE_PG != 0 {
            if self.flock {
                self.statr |= 1 << Ch32FlashStatr::WRPRTERR_BIT;
                return;
            }
            if page + 64 <= self.flash.len() {
                for ii in 0..64 {
                    self.flash[page + ii] &= self.page_buf[ii];
                }
                if self.corrupt_programs > 0 {
                    self.corrupt_programs -= 1;
                    self.flash[page] ^= 0x01;
                }
            }
            self.page_programs += 1;
        }
        self.statr |= 1 << Ch32FlashStatr::EOP_BIT;
        self.busy_reads = self.busy_reads_per_op;
    }

    // Terminal mailbox, target side.  Runs when the host reads DATA0.
    fn console_tick(&mut self) {
        if !self.console_enabled || self.halted || self.data0 & 0x80 != 0 {
            return;
        }
        if let Some(ack) = self.host_ack.take() {
            let count = (ack & 0xF).saturating_sub(4).min(3);
            for ii in 0..count {
                self.keys.push((ack >> (8 * ii + 8)) as u8);
            }
        }

        let count = self.console.len().min(7);
        let chars: Vec<u8> = self.console.drain(..count).collect();
        let mut data0 = 0x80 | (count as u32 + 4);
        let mut data1 = 0u32;
        for (ii, c) in chars.iter().enumerate() {
            if ii < 3 {
                data0 |= (*c as u32) << (8 * ii + 8);
            } else {
                data1 |= (*c as u32) << (8 * (ii - 3));
            }
        }
        self.data0 = data0;
        self.data1 = data1;
    }
}

impl SwioLink for SimTarget {
    fn write_reg(&mut self, reg: u8, value: u32) {
        self.frames += 1;
        if self.presence != Presence::Connected {
            return;
        }

        match reg {
            REG_DATA0 => {
                self.data0 = value;
                if self.console_enabled && !self.halted {
                    self.host_ack = Some(value);
                }
                if self.abstractauto & 1 != 0 {
                    self.run_command(self.last_command);
                }
            }
            REG_DATA1 => self.data1 = value,
            REG_DMCONTROL => self.write_dmcontrol(value),
            REG_DMSTATUS => self.status_override = Some(value),
            REG_ABSTRACTCS => self.cmderr &= !(((value >> 8) & 7) as u8),
            REG_COMMAND => self.run_command(value),
            REG_ABSTRACTAUTO => self.abstractauto = value,
            r if (REG_PROGBUF0..REG_PROGBUF0 + 8).contains(&r) => {
                if r == REG_PROGBUF0 {
                    self.progbuf0_writes += 1;
                }
                self.progbuf[(r - REG_PROGBUF0) as usize] = value;
            }
            REG_CFGR | REG_SHDWCFGR => {
                self.cfgr_writes += 1;
            }
            _ => {
                self.scratch.insert(reg, value);
            }
        }
    }

    fn read_reg(&mut self, reg: u8) -> Result<u32, SwioError> {
        self.frames += 1;
        match self.presence {
            Presence::Absent => return Err(SwioError::BusFault),
            Presence::Blank => return Ok(0),
            Presence::Connected => {}
        }

        let value = match reg {
            REG_DATA0 => {
                self.console_tick();
                let value = self.data0;
                if self.abstractauto & 1 != 0 {
                    self.run_command(self.last_command);
                }
                value
            }
            REG_DATA1 => self.data1,
            REG_DMCONTROL => {
                if self.halted {
                    DmControl::HALTREQ | DmControl::DMACTIVE
                } else {
                    DmControl::DMACTIVE
                }
            }
            REG_DMSTATUS => match self.status_override {
                Some(value) => value,
                None if self.halted => STATUS_HALTED,
                None => STATUS_RUNNING,
            },
            REG_HARTINFO => (2 << 12) | 0x0F4,
            REG_ABSTRACTCS => self.abstractcs(),
            REG_ABSTRACTAUTO => self.abstractauto,
            r if (REG_PROGBUF0..REG_PROGBUF0 + 8).contains(&r) => {
                self.progbuf[(r - REG_PROGBUF0) as usize]
            }
            _ => self.scratch.get(&reg).copied().unwrap_or(0),
        };
        Ok(value)
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }

    fn set_t1coeff(&mut self, t1coeff: u32) {
        self.t1coeff = t1coeff;
    }

    fn enter_programming_mode(&mut self) -> Result<bool, SwioError> {
        self.wake_sequences += 1;
        Ok(self.presence == Presence::Connected)
    }

    fn set_power(&mut self, on: bool) -> Result<(), SwioError> {
        match self.power {
            Some(was) => {
                if on && !was {
                    self.reset_core();
                    self.halted = false;
                }
                self.power = Some(on);
                Ok(())
            }
            None => Err(SwioError::Unsupported),
        }
    }

    fn has_power_control(&self) -> bool {
        self.power.is_some()
    }
}
