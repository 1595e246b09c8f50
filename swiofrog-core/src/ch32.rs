// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog-core - CH32V003 specific objects

use core::fmt;
use static_assertions::const_assert;

/// CH32V003 main flash base address, as linked
pub const CH32V003_FLASH_BASE: u32 = 0x0800_0000;

/// CH32V003 main flash size in bytes
pub const CH32V003_FLASH_SIZE: u32 = 16 * 1024;

/// CH32V003 SRAM base address
pub const CH32V003_RAM_BASE: u32 = 0x2000_0000;

/// CH32V003 SRAM size in bytes
pub const CH32V003_RAM_SIZE: u32 = 2 * 1024;

/// CH32V003 system (boot loader) flash area
pub const CH32V003_BOOT_BASE: u32 = 0x1FFF_F000;
pub const CH32V003_BOOT_SIZE: u32 = 1920;

/// CH32V003 option bytes (user select, data, write protect)
pub const CH32V003_OPTION_BYTES: u32 = 0x1FFF_F800;
pub const CH32V003_OPTION_BYTES_LEN: usize = 16;

/// Electronic signature - flash capacity in KB (low half-word)
pub const CH32V003_ESIG_FLACAP: u32 = 0x1FFF_F7E0;

/// Electronic signature - 96 bit unique ID
pub const CH32V003_ESIG_UNIID1: u32 = 0x1FFF_F7E8;
pub const CH32V003_ESIG_UNIID2: u32 = 0x1FFF_F7EC;
pub const CH32V003_ESIG_UNIID3: u32 = 0x1FFF_F7F0;

/// Flash is programmed and erased in pages of this many bytes, using the
/// fast page programming buffer.
pub const BLOCK_SIZE: usize = 64;

/// Largest binary that can be uploaded and programmed in one go
pub const MAX_BINARY_SIZE: usize = CH32V003_FLASH_SIZE as usize;

const_assert!(MAX_BINARY_SIZE % BLOCK_SIZE == 0);
const_assert!(BLOCK_SIZE % 4 == 0);

/// Factory default option bytes.  Written to [`CH32V003_OPTION_BYTES`] to
/// remove read and write protection from a bricked device.
pub const FACTORY_OPTION_BYTES: [u8; 12] = [
    0xA5, 0x5A, 0x97, 0x68, 0x00, 0xFF, 0x00, 0xFF, 0xFF, 0x00, 0xFF, 0x00,
];

/// Whether the address is in main flash, either at its linked address or at
/// its boot-time alias at 0x0000_0000, or in the system flash area.
pub fn is_flash(addr: u32) -> bool {
    is_main_flash(addr) || (addr & 0xFF00_0000) == 0 || is_boot_area(addr)
}

/// Whether the address is in main flash at its linked address, or in the
/// system flash area.  These are the addresses where a store lands in the
/// flash page buffer.
pub fn is_mapped_flash(addr: u32) -> bool {
    is_main_flash(addr) || is_boot_area(addr)
}

fn is_main_flash(addr: u32) -> bool {
    (addr & 0xFF00_0000) == CH32V003_FLASH_BASE
}

fn is_boot_area(addr: u32) -> bool {
    (addr & 0x1FFF_F800) == CH32V003_BOOT_BASE
}

// CH32V003 FLASH register base address
const CH32V003_FLASH_REG_BASE: u32 = 0x4002_2000;

/// CH32V003 FLASH_ACTLR register
pub struct Ch32FlashActlr;

impl Ch32FlashActlr {
    /// CH32V003 memory address of this register
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE;
}

/// CH32V003 FLASH_KEYR register
///
/// Used to unlock the flash memory for programming and erasing operations.
pub struct Ch32FlashKeyr;

impl Ch32FlashKeyr {
    /// CH32V003 memory address of this register
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x04;

    /// CH32V003 unlock keys, shared by all of the key registers
    pub const KEY1: u32 = 0x4567_0123;
    pub const KEY2: u32 = 0xCDEF_89AB;
}

/// CH32V003 FLASH_OBKEYR register - unlocks option byte programming
pub struct Ch32FlashObkeyr;

impl Ch32FlashObkeyr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x08;
}

/// CH32V003 FLASH_STATR register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ch32FlashStatr(u32);

impl Ch32FlashStatr {
    /// CH32V003 memory address of this register
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x0C;

    /// CH32V003 FLASH_STATR register bit positions
    pub const BSY_BIT: u32 = 0;
    pub const WRPRTERR_BIT: u32 = 4;
    pub const EOP_BIT: u32 = 5;
    pub const BOOT_MODE_BIT: u32 = 14;

    /// Whether a flash operation is in progress.
    pub fn busy(&self) -> bool {
        (self.0 >> Self::BSY_BIT) & 1 != 0
    }

    /// Whether the last operation hit a write protected (or locked) page.
    pub fn write_protect_error(&self) -> bool {
        (self.0 >> Self::WRPRTERR_BIT) & 1 != 0
    }

    pub fn end_of_operation(&self) -> bool {
        (self.0 >> Self::EOP_BIT) & 1 != 0
    }
}

impl From<u32> for Ch32FlashStatr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Ch32FlashStatr> for u32 {
    fn from(sr: Ch32FlashStatr) -> Self {
        sr.0
    }
}

impl fmt::Display for Ch32FlashStatr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// CH32V003 FLASH_CTLR register
///
/// Used to control flash erasing and programming operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ch32FlashCtlr(u32);

impl Ch32FlashCtlr {
    /// CH32V003 memory address of this register
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x10;

    /// CH32V003 FLASH_CTLR register bits
    pub const MER: u32 = 1 << 2;
    pub const STRT: u32 = 1 << 6;
    pub const LOCK: u32 = 1 << 7;
    pub const FLOCK: u32 = 1 << 15;
    pub const PAGE_PG: u32 = 1 << 16;
    pub const PAGE_ER: u32 = 1 << 17;
    pub const BUF_LOAD: u32 = 1 << 18;
    pub const BUF_RST: u32 = 1 << 19;

    /// Whether either the main or fast programming lock is still set
    pub fn locked(&self) -> bool {
        self.0 & (Self::LOCK | Self::FLOCK) != 0
    }
}

impl From<u32> for Ch32FlashCtlr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Ch32FlashCtlr> for u32 {
    fn from(cr: Ch32FlashCtlr) -> Self {
        cr.0
    }
}

impl fmt::Display for Ch32FlashCtlr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// CH32V003 FLASH_ADDR register - target of page erase/program
pub struct Ch32FlashAddr;

impl Ch32FlashAddr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x14;
}

/// CH32V003 FLASH_OBR register
pub struct Ch32FlashObr;

impl Ch32FlashObr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x1C;
}

/// CH32V003 FLASH_WPR register
pub struct Ch32FlashWpr;

impl Ch32FlashWpr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x20;
}

/// CH32V003 FLASH_MODEKEYR register - unlocks fast page programming
pub struct Ch32FlashModekeyr;

impl Ch32FlashModekeyr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x24;
}

/// CH32V003 FLASH_BOOT_MODEKEYR register - unlocks the boot mode selection
pub struct Ch32FlashBootModekeyr;

impl Ch32FlashBootModekeyr {
    pub const ADDRESS: u32 = CH32V003_FLASH_REG_BASE + 0x28;
}

/// Identification read from a target's option bytes and electronic
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChipInfo {
    /// Raw option bytes, from [`CH32V003_OPTION_BYTES`]
    pub option_bytes: [u32; 4],

    /// 96 bit unique ID
    pub uid: [u32; 3],

    /// Flash size in KB
    pub flash_size_kb: u16,
}

impl ChipInfo {
    /// Returns the flash size in bytes.
    pub fn flash_size_bytes(&self) -> u32 {
        self.flash_size_kb as u32 * 1024
    }

    /// Whether the read protection option byte is at its unprotected value.
    pub fn read_protected(&self) -> bool {
        (self.option_bytes[0] & 0xFF) != 0xA5
    }
}

/// Formats as `ob0;ob1;ob2;ob3;uid0;uid1;uid2;flash_kb`, with the words in
/// lower case hex.
impl fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.option_bytes.iter().chain(self.uid.iter()) {
            write!(f, "{word:08x};")?;
        }
        write!(f, "{}", self.flash_size_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_address_classification() {
        assert!(is_flash(0x0800_0000));
        assert!(is_flash(0x0000_0040));
        assert!(is_flash(0x1FFF_F000));
        assert!(!is_flash(0x1FFF_F800));
        assert!(!is_flash(0x2000_0000));

        assert!(is_mapped_flash(0x0800_3FC0));
        assert!(!is_mapped_flash(0x0000_0040));
        assert!(!is_mapped_flash(CH32V003_OPTION_BYTES));
    }

    #[test]
    fn register_addresses() {
        assert_eq!(Ch32FlashKeyr::ADDRESS, 0x4002_2004);
        assert_eq!(Ch32FlashStatr::ADDRESS, 0x4002_200C);
        assert_eq!(Ch32FlashCtlr::ADDRESS, 0x4002_2010);
        assert_eq!(Ch32FlashModekeyr::ADDRESS, 0x4002_2024);
        assert_eq!(Ch32FlashBootModekeyr::ADDRESS, 0x4002_2028);
        assert_eq!(
            Ch32FlashCtlr::PAGE_PG | Ch32FlashCtlr::BUF_LOAD,
            0x0005_0000
        );
        assert!(Ch32FlashCtlr::from(0x8080).locked());
        assert!(!Ch32FlashCtlr::from(0).locked());
    }

    #[test]
    fn chip_info_display() {
        let info = ChipInfo {
            option_bytes: [0x9768_5AA5, 0xFF00_FF00, 0x00FF_00FF, 0x00FF_00FF],
            uid: [0x1234_5678, 0x9ABC_DEF0, 0x0000_0001],
            flash_size_kb: 16,
        };
        assert_eq!(
            alloc::format!("{info}"),
            "97685aa5;ff00ff00;00ff00ff;00ff00ff;12345678;9abcdef0;00000001;16"
        );
        assert!(!info.read_protected());
        assert_eq!(info.flash_size_bytes(), 16384);
    }
}
