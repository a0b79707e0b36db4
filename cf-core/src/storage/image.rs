use super::{BlockDevice, BlockDeviceError, SECTOR_SIZE, Sector};
use std::{
    fs::File,
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// A disk image file on the host, used in place of real media.
///
/// Reads past the end of the image return erased-flash contents (all `0xFF`)
/// instead of failing, the way uninitialized media behaves.
#[derive(Debug)]
pub struct ImageFile {
    file: File,
}

impl ImageFile {
    /// Byte returned for every position past the end of the image.
    pub const FILL: u8 = 0xFF;

    /// Opens an existing image for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    #[must_use]
    #[inline]
    pub const fn from_file(file: File) -> Self {
        Self { file }
    }

    #[must_use]
    #[inline]
    pub fn into_file(self) -> File {
        self.file
    }

    fn seek_to(&mut self, lba: u32) -> Result<(), BlockDeviceError> {
        let offset = u64::from(lba) * SECTOR_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset)).map_err(|err| {
            log::error!("Failed to seek to sector {lba}: {err}");
            BlockDeviceError::Io
        })?;
        Ok(())
    }
}

impl BlockDevice for ImageFile {
    fn read_sector(&mut self, lba: u32, dst: &mut Sector) -> Result<(), BlockDeviceError> {
        self.seek_to(lba)?;

        let mut filled = 0;
        while filled < SECTOR_SIZE {
            match self.file.read(&mut dst[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    log::error!("Failed to read sector {lba}: {err}");
                    return Err(BlockDeviceError::Io);
                }
            }
        }

        if filled < SECTOR_SIZE {
            log::warn!("Read of sector {lba} ran past the end of the image");
            dst[filled..].fill(Self::FILL);
        }
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, src: &Sector) -> Result<(), BlockDeviceError> {
        self.seek_to(lba)?;
        self.file.write_all(src).map_err(|err| {
            log::error!("Failed to write sector {lba}: {err}");
            BlockDeviceError::Io
        })
    }
}
