use super::{BlockDevice, BlockDeviceError, SECTOR_SIZE, Sector};
use alloc::{vec, vec::Vec};

/// A disk held entirely in memory.
///
/// Every transfer is recorded so callers can check how many sectors an
/// operation touched.
#[derive(Debug, Clone, Default)]
pub struct RamDisk {
    data: Vec<u8>,
    read_log: Vec<u32>,
    writes: usize,
}

impl RamDisk {
    #[must_use]
    /// Creates a zero-filled disk of `sectors` sectors.
    pub fn new(sectors: u32) -> Self {
        Self::from_bytes(vec![0; sectors as usize * SECTOR_SIZE])
    }

    #[must_use]
    /// Wraps an existing image.
    ///
    /// A trailing partial sector is dropped.
    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        data.truncate(data.len() / SECTOR_SIZE * SECTOR_SIZE);
        Self {
            data,
            read_log: Vec::new(),
            writes: 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn sector_count(&self) -> u32 {
        u32::try_from(self.data.len() / SECTOR_SIZE).unwrap_or(u32::MAX)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    #[inline]
    /// Number of sector reads since creation or the last [`Self::reset_stats`].
    pub fn reads(&self) -> usize {
        self.read_log.len()
    }

    #[must_use]
    #[inline]
    /// Number of sector writes since creation or the last [`Self::reset_stats`].
    pub const fn writes(&self) -> usize {
        self.writes
    }

    #[must_use]
    #[inline]
    /// LBAs read, in order.
    pub fn read_log(&self) -> &[u32] {
        &self.read_log
    }

    pub fn reset_stats(&mut self) {
        self.read_log.clear();
        self.writes = 0;
    }

    fn range(&self, lba: u32) -> Result<core::ops::Range<usize>, BlockDeviceError> {
        let start = lba as usize * SECTOR_SIZE;
        let end = start + SECTOR_SIZE;
        if end > self.data.len() {
            return Err(BlockDeviceError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&mut self, lba: u32, dst: &mut Sector) -> Result<(), BlockDeviceError> {
        let range = self.range(lba)?;
        dst.copy_from_slice(&self.data[range]);
        self.read_log.push(lba);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, src: &Sector) -> Result<(), BlockDeviceError> {
        let range = self.range(lba)?;
        self.data[range].copy_from_slice(src);
        self.writes += 1;
        Ok(())
    }
}
