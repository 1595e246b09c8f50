// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! CH32V003 flash programming
//!
//! Flash is erased and programmed in 64 byte pages using the flash
//! controller's fast page programming mode.  Each word written to a page
//! lands in the controller's page buffer, and the whole buffer is then
//! committed to the page at once.
//!
//! Every block written is read back and compared, and rewritten if it
//! doesn't match.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use swiofrog_core::ch32::{
    self, BLOCK_SIZE, CH32V003_FLASH_BASE, Ch32FlashAddr, Ch32FlashCtlr, Ch32FlashKeyr,
    Ch32FlashModekeyr, Ch32FlashObkeyr, Ch32FlashStatr,
};

use crate::interface::SwioInterface;
use crate::protocol::SwioLink;
use crate::{EraseStage, SwioError};

/// Number of times a block is programmed before giving up on it verifying.
pub const VERIFY_RETRIES: u32 = 10;

/// Maximum number of FLASH_STATR polls waiting for the busy flag to clear.
pub const FLASH_BUSY_POLLS: u32 = 500;

const BLOCK_MASK: u32 = BLOCK_SIZE as u32 - 1;

/// What to erase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// The whole of main flash
    Chip,

    /// Every 64 byte page from `addr` up to `addr + len`
    Pages { addr: u32, len: u32 },
}

// Little endian word at `index` of a block, padding with erased bytes.
fn block_word(data: &[u8], index: usize) -> u32 {
    let mut bytes = [0xFF; 4];
    for (ii, byte) in bytes.iter_mut().enumerate() {
        if let Some(b) = data.get(index * 4 + ii) {
            *byte = *b;
        }
    }
    u32::from_le_bytes(bytes)
}

impl<L: SwioLink> SwioInterface<L> {
    fn write_flash_ctlr(&mut self, value: u32) -> Result<(), SwioError> {
        self.write_word(Ch32FlashCtlr::ADDRESS, value)
    }

    /// Waits for the current flash operation to finish, then clears the
    /// flash status.
    ///
    /// Returns:
    /// - `Ok(())` if the operation finished.
    /// - `Err(SwioError::FlashWriteProtected)` if it hit a locked or
    ///   protected page.
    /// - `Err(SwioError::FlashBusyTimeout)` if the flash stayed busy.
    pub fn wait_for_flash(&mut self) -> Result<(), SwioError> {
        let mut statr = Ch32FlashStatr::from(self.read_word(Ch32FlashStatr::ADDRESS)?);
        let mut polls = 0;
        while statr.busy() && polls < FLASH_BUSY_POLLS {
            statr = Ch32FlashStatr::from(self.read_word(Ch32FlashStatr::ADDRESS)?);
            polls += 1;
        }

        self.write_word(Ch32FlashStatr::ADDRESS, 0)?;

        if statr.write_protect_error() {
            warn!("Error: Flash write protect error, status {statr}");
            return Err(SwioError::FlashWriteProtected);
        }
        if statr.busy() {
            warn!("Error: Flash still busy after {polls} polls");
            return Err(SwioError::FlashBusyTimeout);
        }

        Ok(())
    }

    /// Unlocks the flash for erasing and fast page programming.
    ///
    /// The keys are only written if the flash is currently locked.
    pub fn unlock_flash(&mut self) -> Result<(), SwioError> {
        let ctlr = Ch32FlashCtlr::from(self.read_word(Ch32FlashCtlr::ADDRESS)?);
        if ctlr.locked() {
            debug!("Exec:  Unlock flash, FLASH_CTLR {ctlr}");
            for reg in [
                Ch32FlashKeyr::ADDRESS,
                Ch32FlashObkeyr::ADDRESS,
                Ch32FlashModekeyr::ADDRESS,
            ] {
                self.write_word(reg, Ch32FlashKeyr::KEY1)?;
                self.write_word(reg, Ch32FlashKeyr::KEY2)?;
            }

            let ctlr = Ch32FlashCtlr::from(self.read_word(Ch32FlashCtlr::ADDRESS)?);
            if ctlr.locked() {
                warn!("Error: Flash still locked, FLASH_CTLR {ctlr}");
                return Err(SwioError::FlashUnlockFailed);
            }
        }

        self.set_flash_unlocked(true);
        Ok(())
    }

    // Wait for the flash, reporting controller failures as an erase failure
    // at the given stage.  Link failures are passed through.
    fn wait_for_erase(&mut self, stage: EraseStage) -> Result<(), SwioError> {
        self.wait_for_flash().map_err(|e| match e {
            SwioError::FlashBusyTimeout | SwioError::FlashWriteProtected => {
                warn!("Error: Erase failed at {stage:?}: {e}");
                SwioError::EraseFailed(stage)
            }
            other => other,
        })
    }

    /// Erases the whole chip, or a range of pages.
    ///
    /// Arguments:
    /// - `mode`: What to erase.  Page erases cover every page overlapping
    ///   the range.
    ///
    /// Returns:
    /// - `Ok(())` if the erase completed.
    /// - `Err(SwioError::EraseFailed)` if the flash controller failed.
    pub fn erase_flash(&mut self, mode: EraseMode) -> Result<(), SwioError> {
        if !self.flash_unlocked() {
            self.unlock_flash()?;
        }

        match mode {
            EraseMode::Chip => {
                debug!("Exec:  Erase whole chip");
                self.invalidate();
                self.write_flash_ctlr(0)?;
                self.write_flash_ctlr(Ch32FlashCtlr::MER)?;
                self.write_flash_ctlr(Ch32FlashCtlr::STRT | Ch32FlashCtlr::MER)?;
                self.wait_for_erase(EraseStage::Chip)?;
                self.write_flash_ctlr(0)?;
            }
            EraseMode::Pages { addr, len } => {
                trace!("Exec:  Erase pages 0x{addr:08X}, {len} bytes");
                let end = addr.checked_add(len).ok_or(SwioError::OutOfRange)?;
                let mut page = addr;
                while page < end {
                    self.wait_for_erase(EraseStage::PageIdle)?;
                    self.write_flash_ctlr(Ch32FlashCtlr::PAGE_ER)?;
                    self.write_word(Ch32FlashAddr::ADDRESS, page)?;
                    self.write_flash_ctlr(Ch32FlashCtlr::STRT | Ch32FlashCtlr::PAGE_ER)?;
                    self.wait_for_erase(EraseStage::Page)?;
                    self.write_flash_ctlr(0)?;
                    match page.checked_add(BLOCK_SIZE as u32) {
                        Some(next) => page = next,
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Writes one 64 byte block.
    ///
    /// Flash blocks are erased and then programmed through the page buffer.
    /// Anything else is written a word at a time.  Short data is padded with
    /// 0xFF.
    ///
    /// Arguments:
    /// - `addr`: The block aligned address to write.
    /// - `data`: Up to 64 bytes to write.
    pub fn write_block64(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError> {
        if ch32::is_flash(addr) {
            if !self.flash_unlocked() {
                self.unlock_flash()?;
            }
            self.erase_flash(EraseMode::Pages {
                addr,
                len: BLOCK_SIZE as u32,
            })?;

            self.write_flash_ctlr(Ch32FlashCtlr::PAGE_PG)?;
            self.write_flash_ctlr(Ch32FlashCtlr::BUF_RST | Ch32FlashCtlr::PAGE_PG)?;
            for ii in 0..BLOCK_SIZE / 4 {
                self.write_word(addr + (ii as u32) * 4, block_word(data, ii))?;
            }
            self.write_word(Ch32FlashAddr::ADDRESS, addr & !BLOCK_MASK)?;
            self.write_flash_ctlr(Ch32FlashCtlr::PAGE_PG | Ch32FlashCtlr::STRT)?;
            self.wait_for_flash()?;
        } else {
            for ii in 0..BLOCK_SIZE / 4 {
                self.write_word(addr + (ii as u32) * 4, block_word(data, ii))?;
            }
        }

        Ok(())
    }

    // Write a block, read it back and retry until it matches.
    fn write_block64_verified(&mut self, addr: u32, data: &[u8]) -> Result<(), SwioError> {
        let mut readback = [0u8; BLOCK_SIZE];
        for attempt in 1..=VERIFY_RETRIES {
            self.write_block64(addr, data)?;
            self.read_binary_blob(addr, &mut readback)?;
            if readback[..] == data[..] {
                return Ok(());
            }
            debug!("Note:  Verify mismatch at 0x{addr:08X}, attempt {attempt}");
        }

        warn!("Error: Block at 0x{addr:08X} failed to verify");
        Err(SwioError::VerifyMismatch(addr))
    }

    /// Writes an arbitrary sized, arbitrarily aligned, binary to the target.
    ///
    /// Flash addresses may be given at either the linked (0x0800_0000) or the
    /// boot-time (0x0000_0000) address.  Partial flash blocks are read,
    /// modified and rewritten, so surrounding bytes are preserved.
    ///
    /// Arguments:
    /// - `addr`: The address to write to.
    /// - `blob`: The data to write.
    ///
    /// Returns:
    /// - `Ok(())` if everything was written and verified.
    /// - `Err(SwioError::OutOfRange)` if the blob runs past the top of the
    ///   address space.  Nothing is written.
    /// - `Err(SwioError)` on the first failure.
    pub fn write_binary_blob(&mut self, addr: u32, blob: &[u8]) -> Result<(), SwioError> {
        if blob.is_empty() {
            return Ok(());
        }

        let is_flash = ch32::is_flash(addr);
        let addr = if is_flash {
            addr | CH32V003_FLASH_BASE
        } else {
            addr
        };
        let len = u32::try_from(blob.len()).map_err(|_| SwioError::OutOfRange)?;
        let Some(end) = addr.checked_add(len) else {
            warn!("Error: Write of {len} bytes at 0x{addr:08X} overflows the address space");
            return Err(SwioError::OutOfRange);
        };
        debug!("Exec:  Write {len} bytes to 0x{addr:08X}");

        if is_flash && addr & BLOCK_MASK == 0 && len & BLOCK_MASK == 0 {
            for (ii, block) in blob.chunks(BLOCK_SIZE).enumerate() {
                self.write_block64_verified(addr + (ii * BLOCK_SIZE) as u32, block)?;
            }
            return Ok(());
        }

        if is_flash && !self.flash_unlocked() {
            self.unlock_flash()?;
        }

        let first_block = addr / BLOCK_SIZE as u32;
        let last_block = end.div_ceil(BLOCK_SIZE as u32);
        let mut consumed = 0usize;

        for block in first_block..last_block {
            let base = block * BLOCK_SIZE as u32;
            let offset = addr.saturating_sub(base) as usize;
            let block_end = ((end - base) as usize).min(BLOCK_SIZE);
            let count = block_end - offset;

            if offset == 0 && block_end == BLOCK_SIZE {
                self.write_block64_verified(base, &blob[consumed..consumed + BLOCK_SIZE])?;
                consumed += BLOCK_SIZE;
            } else if is_flash {
                let mut merged = [0u8; BLOCK_SIZE];
                self.read_binary_blob(base, &mut merged)?;
                merged[offset..block_end].copy_from_slice(&blob[consumed..consumed + count]);
                consumed += count;
                self.write_block64_verified(base, &merged)?;
                self.wait_for_flash()?;
            } else {
                // RAM - only touch the bytes being written
                for word in (0..BLOCK_SIZE).step_by(4) {
                    if offset <= word && block_end >= word + 4 {
                        self.write_word(base + word as u32, block_word(&blob[consumed..], 0))?;
                        consumed += 4;
                    } else {
                        for byte in word..word + 4 {
                            if byte >= offset && byte < block_end {
                                self.write_byte(base + byte as u32, blob[consumed])?;
                                consumed += 1;
                            }
                        }
                    }
                }
            }
        }

        self.wait_for_done_op()
    }

    /// Reads an arbitrary sized, arbitrarily aligned, region of target
    /// memory.
    ///
    /// Aligned words are read a word at a time.  Once the address is
    /// unaligned, or fewer than 4 bytes remain, the rest is read a byte at a
    /// time.
    pub fn read_binary_blob(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SwioError> {
        let len = u32::try_from(buf.len()).map_err(|_| SwioError::OutOfRange)?;
        if addr.checked_add(len).is_none() {
            warn!("Error: Read of {len} bytes at 0x{addr:08X} overflows the address space");
            return Err(SwioError::OutOfRange);
        }

        let mut pos = 0usize;
        while pos < buf.len() {
            let cur = addr + pos as u32;
            let remain = buf.len() - pos;
            if cur & 3 == 0 && remain >= 4 {
                let word = self.read_word(cur)?;
                buf[pos..pos + 4].copy_from_slice(&word.to_le_bytes());
                pos += 4;
            } else {
                while pos < buf.len() {
                    buf[pos] = self.read_byte(addr + pos as u32)?;
                    pos += 1;
                }
            }
        }

        self.wait_for_done_op()
    }
}
