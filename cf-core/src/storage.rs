use thiserror::Error;

#[cfg(feature = "std")]
mod image;
mod ram;

#[cfg(feature = "std")]
pub use image::ImageFile;
pub use ram::RamDisk;

/// Size in bytes of one addressable sector.
pub const SECTOR_SIZE: usize = 512;

/// One sector worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// An error that can occur when performing block device operations.
pub enum BlockDeviceError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Unsupported operation")]
    Unsupported,
}

/// A trait for sector-addressed block devices.
///
/// These are physical devices (such as CompactFlash cards) or disk images
/// that transfer data in fixed 512-byte sectors addressed by LBA.
pub trait BlockDevice {
    /// Read the sector at `lba` into `dst`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed.
    fn read_sector(&mut self, lba: u32, dst: &mut Sector) -> Result<(), BlockDeviceError>;
    /// Write `src` to the sector at `lba`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed.
    fn write_sector(&mut self, lba: u32, src: &Sector) -> Result<(), BlockDeviceError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    #[inline]
    fn read_sector(&mut self, lba: u32, dst: &mut Sector) -> Result<(), BlockDeviceError> {
        (**self).read_sector(lba, dst)
    }

    #[inline]
    fn write_sector(&mut self, lba: u32, src: &Sector) -> Result<(), BlockDeviceError> {
        (**self).write_sector(lba, src)
    }
}
