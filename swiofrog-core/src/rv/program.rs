// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Program buffer micro-programs
//!
//! Memory on the target is only reachable by running short instruction
//! sequences from the debug module's program buffer.  The word accessors are
//! written so that, once loaded, they can be re-executed with ABSTRACTAUTO
//! on every DATA0 access.  They rely on a set of preloaded GPRs:
//!
//! | GPR | Contents                                    |
//! |-----|---------------------------------------------|
//! | x10 | [`DATA0_ALIAS`] - DATA0 in the hart's map   |
//! | x11 | [`DATA1_ALIAS`] - DATA1 in the hart's map   |
//! | x12 | FLASH_CTLR                                  |
//! | x13 | FLASH_CTLR PAGE_PG \| BUF_LOAD              |
//!
//! DATA1 holds the current target address throughout.

use crate::rv::dm::Instruction;

/// DATA0 as mapped into the hart's address space
pub const DATA0_ALIAS: u32 = 0xE000_00F4;

/// DATA1 as mapped into the hart's address space
pub const DATA1_ALIAS: u32 = 0xE000_00F8;

/// GPR holding [`DATA0_ALIAS`]
pub const GPR_DATA0_PTR: u8 = 10;
/// GPR holding [`DATA1_ALIAS`]
pub const GPR_DATA1_PTR: u8 = 11;
/// GPR holding the flash control register address
pub const GPR_FLASH_CTLR: u8 = 12;
/// GPR holding the flash control buffer-load value
pub const GPR_FLASH_LOAD: u8 = 13;
/// Scratch GPR, `s0`
pub const GPR_S0: u8 = 8;
/// Scratch GPR, `s1`
pub const GPR_S1: u8 = 9;

/// `c.lw s0, 0(a1)` / `c.lw s1, 0(s0)` - fetch address from DATA1, then
/// the word at that address
pub const READ_WORD_LOAD: Instruction = Instruction::new(0x4004_4180);

/// `c.addi s0, 4` / `c.sw s1, 0(a0)` - advance and store the word to DATA0
pub const READ_WORD_STORE_INC: Instruction = Instruction::new(0xC104_0411);

/// `c.nop` / `c.sw s1, 0(a0)` - store the word to DATA0
pub const READ_WORD_STORE: Instruction = Instruction::new(0xC104_0001);

/// `c.sw s0, 0(a1)` / `c.ebreak` - write the address back to DATA1
pub const READ_WORD_WRITEBACK: Instruction = Instruction::new(0x9002_C180);

/// `c.lw s1, 0(a1)` / `c.sw s0, 0(s1)` - store DATA0 (in s0) at DATA1
pub const WRITE_WORD_STORE: Instruction = Instruction::new(0xC080_4184);

/// `c.addi s1, 4` / `c.sw s1, 0(a1)` - advance DATA1
pub const WRITE_WORD_ADVANCE: Instruction = Instruction::new(0xC184_0491);

/// `c.sw a3, 0(a2)` / `c.ebreak` - latch the word into the flash page buffer
pub const WRITE_WORD_FLASH_LOAD: Instruction = Instruction::new(0x9002_C214);

/// `c.ebreak` / `c.nop`
pub const WRITE_WORD_END: Instruction = Instruction::new(0x0001_9002);

/// `lb s0, 0(s1)`
pub const LOAD_BYTE: Instruction = Instruction::new(0x0004_8403);

/// `sb s0, 0(s1)`
pub const STORE_BYTE: Instruction = Instruction::new(0x0084_8023);

/// `ebreak`
pub const EBREAK: Instruction = Instruction::new(0x0010_0073);
