//! FAT32 file system driver working directly on 512-byte sectors.
//!
//! [`FatFs`] owns the block device, the parsed volume geometry and three
//! single-sector write-back caches (FAT, directory, file data). Every
//! operation goes through those caches; nothing is written behind their back
//! except freshly allocated clusters, which are cleared directly.
use crate::{BlockDevice, BlockDeviceError, SECTOR_SIZE};
use bs::{BootSector, FsInfo, VolumeDescriptor};
use cache::{SectorCache, WriteBack};
use dirent::ShortNameGen;
use thiserror::Error;

pub mod bs;
mod cache;
pub mod date;
pub mod dir;
pub mod dirent;
mod endian;
#[expect(clippy::module_inception, reason = "FS is named after this table")]
pub mod fat;
pub mod file;
pub mod options;
pub mod path;
#[cfg(test)]
pub(crate) mod testing;

pub use dir::{DirCursor, DirectoryEntry, DumpError};
pub use fat::FatEntry;
pub use file::{OpenFile, OpenOptions, Whence};
pub use options::MountOptions;

/// A cluster number, as stored in the FAT and in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cluster(u32);

impl Cluster {
    /// Value of an unallocated FAT entry, also used as "no chain yet".
    pub const FREE: Self = Self(0);
    /// Value written to terminate a chain.
    pub const END_OF_CHAIN: Self = Self(0x0FFF_FFFF);
    pub const BAD: Self = Self(0x0FFF_FFF7);

    #[must_use]
    #[inline]
    pub const fn new(cluster: u32) -> Self {
        Self(cluster)
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Whether the value can name a data cluster on some FAT32 volume.
    pub const fn is_valid(&self) -> bool {
        self.0 >= 2 && self.0 < 0x0FFF_FFF0
    }

    #[must_use]
    #[inline]
    pub const fn is_end_of_chain(&self) -> bool {
        self.0 >= 0x0FFF_FFF8
    }

    #[must_use]
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 == Self::BAD.0
    }

    #[must_use]
    #[inline]
    pub const fn is_free(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    #[inline]
    pub const fn is_reserved(&self) -> bool {
        self.0 == 1 || (self.0 >= 0x0FFF_FFF0 && self.0 <= 0x0FFF_FFF6)
    }
}

/// The 8-byte file system type label of a boot sector.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FsTypeLabel([u8; 8]);

impl FsTypeLabel {
    #[must_use]
    #[inline]
    pub const fn new(raw: [u8; 8]) -> Self {
        Self(raw)
    }

    #[must_use]
    /// The label without its space padding.
    pub fn as_trimmed(&self) -> &[u8] {
        let len = self.0.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
        &self.0[..len]
    }
}

impl core::fmt::Display for FsTypeLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for &b in self.as_trimmed() {
            let c = if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '?'
            };
            core::fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for FsTypeLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FsTypeLabel(\"{self}\")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Reasons a volume cannot be mounted.
pub enum MountError {
    #[error("No boot signature, no media or not a FAT file system")]
    BadSignature,
    #[error("Partition table has no first partition")]
    NoPartition,
    #[error("Unsupported file system type \"{0}\"")]
    Unsupported(FsTypeLabel),
    #[error("Unsupported sector size of {0} bytes")]
    SectorSize(u16),
    #[error("Invalid volume geometry")]
    InvalidGeometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Error type for FAT filesystem operations
pub enum FatError {
    #[error("File not found")]
    NotFound,
    #[error("File system is full")]
    NoSpace,
    #[error("File system is inconsistent, run a check")]
    Inconsistent,
    #[error("Cluster chain ended before the end of the file")]
    EndOfFile,
    #[error("Invalid argument")]
    BadInput,
    #[error("Mount failed: {0}")]
    Mount(#[from] MountError),
    #[error("Device error: {0}")]
    Device(#[from] BlockDeviceError),
}

impl FatError {
    #[must_use]
    #[inline]
    /// Whether the error means the on-disk structures need an offline check,
    /// as opposed to an ordinary failure like a full disk.
    pub const fn needs_check(&self) -> bool {
        matches!(self, Self::Inconsistent | Self::EndOfFile)
    }
}

pub type FatResult<T> = Result<T, FatError>;

/// Last free-cluster count known to be stored in the FS-info sector.
#[derive(Debug, Clone, Copy)]
struct FsInfoState {
    persisted: Option<u32>,
}

/// A mounted FAT32 volume.
pub struct FatFs<D: BlockDevice> {
    device: D,
    volume: VolumeDescriptor,
    options: MountOptions,
    fat_cache: SectorCache,
    dir_cache: SectorCache,
    file_cache: SectorCache,
    names: ShortNameGen,
    /// Where the next brand new chain starts looking for a free cluster.
    next_free: u32,
    /// `None` if the volume has no usable FS-info sector.
    fs_info: Option<FsInfoState>,
}

impl<D: BlockDevice> FatFs<D> {
    /// Mounts the first FAT32 volume found on `device`.
    pub fn mount(mut device: D, options: MountOptions) -> FatResult<Self> {
        let mut sector = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut sector)?;

        let partition_begin = bs::partition_start(&sector)?;
        if partition_begin != 0 {
            device.read_sector(partition_begin, &mut sector)?;
        }
        let boot = BootSector::parse(&sector)?;
        let mut volume = VolumeDescriptor::new(partition_begin, &boot)?;

        log::debug!(
            "FAT32 volume at sector {}: {} sectors/cluster, {} FATs of {} sectors, heap at {}, root cluster {}",
            partition_begin,
            volume.sectors_per_cluster(),
            volume.fat_count(),
            volume.sectors_per_fat(),
            volume.cluster_heap_begin(),
            volume.root_cluster().value(),
        );

        device.read_sector(volume.fs_info_sector(), &mut sector)?;
        let fs_info = FsInfo::parse(&sector);
        let trusted = fs_info
            .and_then(|info| info.free_clusters())
            .filter(|&free| free <= volume.total_clusters());
        if let Some(free) = trusted {
            volume.set_free_clusters(free);
        }

        let mut fs = Self {
            device,
            volume,
            options,
            fat_cache: SectorCache::new(WriteBack::Mirrored {
                copies: volume.fat_count(),
                stride: volume.sectors_per_fat(),
            }),
            dir_cache: SectorCache::new(WriteBack::Single),
            file_cache: SectorCache::new(WriteBack::Single),
            names: ShortNameGen::new(options.name_seed()),
            next_free: 2,
            fs_info: fs_info.map(|info| FsInfoState {
                persisted: info.free_clusters(),
            }),
        };

        if trusted.is_none() {
            log::warn!("FS-info free cluster count missing or invalid, scanning the FAT");
            let free = fs.count_free_clusters()?;
            fs.volume.set_free_clusters(free);
        }
        fs.names.mix(fs.volume.volume_id() ^ fs.volume.free_clusters());

        log::info!(
            "Mounted FAT32 volume: {} clusters of {} bytes, {} free",
            fs.volume.total_clusters(),
            fs.volume.bytes_per_cluster(),
            fs.volume.free_clusters(),
        );
        Ok(fs)
    }

    #[must_use]
    #[inline]
    pub const fn volume(&self) -> &VolumeDescriptor {
        &self.volume
    }

    #[must_use]
    #[inline]
    pub const fn options(&self) -> &MountOptions {
        &self.options
    }

    #[must_use]
    #[inline]
    pub const fn free_clusters(&self) -> u32 {
        self.volume.free_clusters()
    }

    #[must_use]
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Writes back the FAT sector (to every FAT copy) and persists the
    /// free-cluster count if it changed.
    pub fn flush_fat(&mut self) -> FatResult<()> {
        self.fat_cache.flush(&mut self.device)?;

        let free = self.volume.free_clusters();
        let Some(state) = self.fs_info.as_mut() else {
            return Ok(());
        };
        if state.persisted == Some(free) {
            return Ok(());
        }

        let lba = self.volume.fs_info_sector();
        let mut sector = [0u8; SECTOR_SIZE];
        self.device.read_sector(lba, &mut sector)?;
        FsInfo::write_free_clusters(&mut sector, free);
        self.device.write_sector(lba, &sector)?;
        state.persisted = Some(free);
        Ok(())
    }

    pub fn flush_dir(&mut self) -> FatResult<()> {
        self.dir_cache.flush(&mut self.device)
    }

    pub fn flush_file(&mut self) -> FatResult<()> {
        self.file_cache.flush(&mut self.device)
    }

    /// Writes every buffered change to the device.
    ///
    /// Must be called before anything else reads the media.
    pub fn sync(&mut self) -> FatResult<()> {
        self.flush_fat()?;
        self.flush_dir()?;
        self.flush_file()
    }

    /// Syncs the volume and hands the device back.
    pub fn unmount(mut self) -> FatResult<D> {
        self.sync()?;
        log::debug!("Unmounted FAT32 volume");
        Ok(self.device)
    }

    /// Drops cached copies of sectors about to be overwritten directly.
    fn forget_sectors(&mut self, first: u32, count: u32) {
        self.fat_cache.forget(first, count);
        self.dir_cache.forget(first, count);
        self.file_cache.forget(first, count);
    }

    /// Zero-fills a cluster on disk.
    fn clear_cluster(&mut self, cluster: Cluster) -> FatResult<()> {
        let first = self.volume.cluster_to_lba(cluster)?;
        let count = self.volume.sectors_per_cluster();
        self.forget_sectors(first, count);

        let zero = [0u8; SECTOR_SIZE];
        for lba in first..first + count {
            self.device.write_sector(lba, &zero)?;
        }
        Ok(())
    }
}
