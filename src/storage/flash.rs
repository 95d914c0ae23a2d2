//! Fixed-offset record layout on top of a byte-addressable flash.
//!
//! ```text
//! base + index * 32:  [len u8][crc8 u8][payload, len <= 30][0xFF padding]
//! ```
//!
//! An erased length byte (0xFF) means the field was never written.

use crc::{Crc, CRC_8_SMBUS};
use embedded_storage::{ReadStorage, Storage};

use super::{Field, StorageError, Store, RECORD_CAPACITY};

pub const SLOT_SIZE: u32 = 32;

const ERASED: u8 = 0xFF;
const HEADER_LEN: usize = 2;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

pub struct FlashStore<F> {
    flash: F,
    base: u32,
}

impl<F: Storage> FlashStore<F> {
    pub fn new(flash: F, base: u32) -> Self {
        Self { flash, base }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    fn offset(&self, field: Field) -> Result<u32, StorageError> {
        let offset = self.base + field.index() as u32 * SLOT_SIZE;
        if (offset + SLOT_SIZE) as usize > self.flash.capacity() {
            return Err(StorageError::Io);
        }
        Ok(offset)
    }
}

impl<F: Storage> Store for FlashStore<F> {
    fn read<'a>(&mut self, field: Field, buf: &'a mut [u8]) -> Result<&'a [u8], StorageError> {
        let offset = self.offset(field)?;
        let mut slot = [0u8; SLOT_SIZE as usize];
        self.flash
            .read(offset, &mut slot)
            .map_err(|_| StorageError::Io)?;

        if slot[0] == ERASED {
            return Err(StorageError::NotFound);
        }
        let len = slot[0] as usize;
        if len > RECORD_CAPACITY || len > buf.len() {
            return Err(StorageError::Corrupt);
        }

        let payload = &slot[HEADER_LEN..HEADER_LEN + len];
        if CRC8.checksum(payload) != slot[1] {
            return Err(StorageError::Corrupt);
        }

        buf[..len].copy_from_slice(payload);
        Ok(&buf[..len])
    }

    fn write(&mut self, field: Field, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() > RECORD_CAPACITY {
            return Err(StorageError::TooLarge);
        }
        let offset = self.offset(field)?;

        let mut slot = [ERASED; SLOT_SIZE as usize];
        slot[0] = bytes.len() as u8;
        slot[1] = CRC8.checksum(bytes);
        slot[HEADER_LEN..HEADER_LEN + bytes.len()].copy_from_slice(bytes);

        self.flash.write(offset, &slot).map_err(|_| StorageError::Io)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // Writes go straight to the medium.
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RamFlashError {
    OutOfBounds,
    WriteFailed,
}

/// RAM-backed flash image. Starts erased.
pub struct RamFlash<const N: usize> {
    bytes: [u8; N],
    writes: usize,
    fail_writes: bool,
}

impl<const N: usize> RamFlash<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [ERASED; N],
            writes: 0,
            fail_writes: false,
        }
    }

    /// Flip every bit of one byte, for corruption tests.
    pub fn corrupt(&mut self, offset: usize) {
        if let Some(byte) = self.bytes.get_mut(offset) {
            *byte ^= 0xFF;
        }
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl<const N: usize> Default for RamFlash<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadStorage for RamFlash<N> {
    type Error = RamFlashError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let source = self
            .bytes
            .get(start..start + bytes.len())
            .ok_or(RamFlashError::OutOfBounds)?;
        bytes.copy_from_slice(source);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Storage for RamFlash<N> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(RamFlashError::WriteFailed);
        }
        let start = offset as usize;
        let target = self
            .bytes
            .get_mut(start..start + bytes.len())
            .ok_or(RamFlashError::OutOfBounds)?;
        target.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}
