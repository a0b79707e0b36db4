//! Single-sector write-back caches.
//!
//! The volume owns one cache for the active FAT sector, one for the active
//! directory sector and one for the active file-data sector. Each buffers at
//! most one sector and only writes it back when evicted or flushed.
use super::FatResult;
use crate::{BlockDevice, SECTOR_SIZE, Sector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a flushed sector is written.
pub(crate) enum WriteBack {
    /// Back to the sector it was loaded from.
    Single,
    /// To `copies` places, `stride` sectors apart, starting at the sector it
    /// was loaded from. Used for the mirrored FATs.
    Mirrored { copies: u32, stride: u32 },
}

pub(crate) struct SectorCache {
    lba: Option<u32>,
    dirty: bool,
    data: Sector,
    write_back: WriteBack,
}

impl SectorCache {
    #[must_use]
    pub const fn new(write_back: WriteBack) -> Self {
        Self {
            lba: None,
            dirty: false,
            data: [0; SECTOR_SIZE],
            write_back,
        }
    }

    #[must_use]
    #[inline]
    pub const fn lba(&self) -> Option<u32> {
        self.lba
    }

    #[must_use]
    #[inline]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Makes `lba` the buffered sector, writing back the previous one first
    /// if it was modified.
    pub fn ensure<D: BlockDevice>(&mut self, device: &mut D, lba: u32) -> FatResult<()> {
        if self.lba == Some(lba) {
            return Ok(());
        }
        self.flush(device)?;

        log::trace!("Cache miss, loading sector {lba}");
        // Forget the old sector first so a failed read cannot leave stale
        // bytes labelled with the new address.
        self.lba = None;
        device.read_sector(lba, &mut self.data)?;
        self.lba = Some(lba);
        Ok(())
    }

    pub fn flush<D: BlockDevice>(&mut self, device: &mut D) -> FatResult<()> {
        let Some(lba) = self.lba else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        match self.write_back {
            WriteBack::Single => device.write_sector(lba, &self.data)?,
            WriteBack::Mirrored { copies, stride } => {
                for copy in 0..copies {
                    device.write_sector(lba + copy * stride, &self.data)?;
                }
            }
        }
        self.dirty = false;
        Ok(())
    }

    #[inline]
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    #[inline]
    pub const fn data(&self) -> &Sector {
        &self.data
    }

    #[must_use]
    #[inline]
    /// Mutable access to the buffered sector. The cache is marked dirty.
    pub const fn data_mut(&mut self) -> &mut Sector {
        self.dirty = true;
        &mut self.data
    }

    /// Drops the buffered sector without writing it back if it lies in
    /// `first..first + count`.
    ///
    /// Used when those sectors are about to be overwritten directly.
    pub fn forget(&mut self, first: u32, count: u32) {
        if self.lba.is_some_and(|lba| lba >= first && lba - first < count) {
            self.lba = None;
            self.dirty = false;
        }
    }
}
