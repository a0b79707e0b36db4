//! Boot sector, partition table and FS-info parsing, plus the volume
//! geometry derived from them.
use super::{
    Cluster, FatError, FatResult, FsTypeLabel, MountError,
    endian::{read_u16, read_u32, write_u32},
};
use crate::{SECTOR_SIZE, Sector};

/// Offset of the `0x55 0xAA` boot signature.
const SIGNATURE_OFFSET: usize = 0x1FE;
const SIGNATURE: u16 = 0xAA55;
/// Offset of the FAT32 file system type label.
const FS_TYPE_OFFSET: usize = 82;
/// Starting LBA of the first partition table entry.
const FIRST_PARTITION_LBA: usize = 0x1C6;

/// FAT entries held by one FAT sector.
const ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / 4) as u32;

/// Finds the first sector of the FAT32 volume given the disk's sector 0.
///
/// Sector 0 is either the volume boot record itself (partitionless media)
/// or a master boot record whose first partition holds the volume.
pub fn partition_start(sector: &Sector) -> Result<u32, MountError> {
    if read_u16(sector, SIGNATURE_OFFSET) != SIGNATURE {
        return Err(MountError::BadSignature);
    }
    if &sector[FS_TYPE_OFFSET..FS_TYPE_OFFSET + 3] == b"FAT" {
        return Ok(0);
    }
    match read_u32(sector, FIRST_PARTITION_LBA) {
        0 => Err(MountError::NoPartition),
        lba => Ok(lba),
    }
}

/// The FAT32 BIOS parameter block fields the driver relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    /// Total sectors in the file system.
    ///
    /// Taken from the 16-bit field when the 32-bit one is 0.
    total_sectors: u32,
    sectors_per_fat: u32,
    root_cluster: u32,
    /// FS-info sector, relative to the start of the volume.
    fs_info_sector: u16,
    volume_id: u32,
}

impl BootSector {
    pub fn parse(sector: &Sector) -> Result<Self, MountError> {
        if read_u16(sector, SIGNATURE_OFFSET) != SIGNATURE {
            return Err(MountError::BadSignature);
        }

        let mut fs_type = [0; 8];
        fs_type.copy_from_slice(&sector[FS_TYPE_OFFSET..FS_TYPE_OFFSET + 8]);
        let fs_type = FsTypeLabel::new(fs_type);
        if fs_type.as_trimmed() != b"FAT32" {
            return Err(MountError::Unsupported(fs_type));
        }

        let bytes_per_sector = read_u16(sector, 0x0B);
        if usize::from(bytes_per_sector) != SECTOR_SIZE {
            return Err(MountError::SectorSize(bytes_per_sector));
        }

        let total_sectors = match read_u32(sector, 0x20) {
            0 => u32::from(read_u16(sector, 0x13)),
            n => n,
        };

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster: sector[0x0D],
            reserved_sectors: read_u16(sector, 0x0E),
            fat_count: sector[0x10],
            total_sectors,
            sectors_per_fat: read_u32(sector, 0x24),
            root_cluster: read_u32(sector, 0x2C),
            fs_info_sector: read_u16(sector, 0x30),
            volume_id: read_u32(sector, 0x43),
        })
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    pub const fn reserved_sectors(&self) -> u16 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    pub const fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn fs_info_sector(&self) -> u16 {
        self.fs_info_sector
    }

    #[must_use]
    #[inline]
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }
}

/// Geometry of a mounted volume.
///
/// Everything but the free-cluster count is fixed once mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptor {
    partition_begin: u32,
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    fat_count: u32,
    sectors_per_fat: u32,
    root_cluster: Cluster,
    fat_begin: u32,
    cluster_heap_begin: u32,
    total_clusters: u32,
    free_clusters: u32,
    fs_info_sector: u32,
    volume_id: u32,
}

impl VolumeDescriptor {
    /// Derives the volume layout from its boot sector.
    ///
    /// The free-cluster count starts at 0 and is filled in by the caller.
    pub fn new(partition_begin: u32, boot: &BootSector) -> Result<Self, MountError> {
        let sectors_per_cluster = u32::from(boot.sectors_per_cluster());
        let reserved_sectors = u32::from(boot.reserved_sectors());
        let fat_count = u32::from(boot.fat_count());
        let sectors_per_fat = boot.sectors_per_fat();

        if !sectors_per_cluster.is_power_of_two()
            || reserved_sectors == 0
            || fat_count == 0
            || sectors_per_fat == 0
        {
            return Err(MountError::InvalidGeometry);
        }

        let fat_begin = partition_begin
            .checked_add(reserved_sectors)
            .ok_or(MountError::InvalidGeometry)?;
        let cluster_heap_begin = fat_count
            .checked_mul(sectors_per_fat)
            .and_then(|fats| fats.checked_add(fat_begin))
            .ok_or(MountError::InvalidGeometry)?;

        let data_sectors = boot
            .total_sectors()
            .checked_sub(cluster_heap_begin - partition_begin)
            .ok_or(MountError::InvalidGeometry)?;
        // A FAT cannot describe more clusters than it has entries for
        let fat_capacity = sectors_per_fat
            .saturating_mul(ENTRIES_PER_SECTOR)
            .saturating_sub(2);
        let total_clusters = (data_sectors / sectors_per_cluster).min(fat_capacity);
        if total_clusters == 0 {
            return Err(MountError::InvalidGeometry);
        }

        let root_cluster = Cluster::new(boot.root_cluster());
        if root_cluster.value() < 2 || root_cluster.value() > total_clusters + 1 {
            return Err(MountError::InvalidGeometry);
        }

        let fs_info_sector = match u32::from(boot.fs_info_sector()) {
            n if n >= 1 && n < reserved_sectors => n,
            _ => 1,
        };

        Ok(Self {
            partition_begin,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            sectors_per_fat,
            root_cluster,
            fat_begin,
            cluster_heap_begin,
            total_clusters,
            free_clusters: 0,
            fs_info_sector: partition_begin + fs_info_sector,
            volume_id: boot.volume_id(),
        })
    }

    #[must_use]
    #[inline]
    pub const fn partition_begin(&self) -> u32 {
        self.partition_begin
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u32 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster * SECTOR_SIZE as u32
    }

    #[must_use]
    #[inline]
    pub const fn reserved_sectors(&self) -> u32 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    pub const fn fat_count(&self) -> u32 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> Cluster {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    /// First sector of the first FAT copy.
    pub const fn fat_begin(&self) -> u32 {
        self.fat_begin
    }

    #[must_use]
    #[inline]
    /// First sector of cluster 2.
    pub const fn cluster_heap_begin(&self) -> u32 {
        self.cluster_heap_begin
    }

    #[must_use]
    #[inline]
    /// Number of data clusters, numbered `2..=total_clusters + 1`.
    pub const fn total_clusters(&self) -> u32 {
        self.total_clusters
    }

    #[must_use]
    #[inline]
    pub const fn free_clusters(&self) -> u32 {
        self.free_clusters
    }

    #[inline]
    pub(crate) const fn set_free_clusters(&mut self, free_clusters: u32) {
        self.free_clusters = free_clusters;
    }

    #[must_use]
    #[inline]
    /// Absolute LBA of the FS-info sector.
    pub const fn fs_info_sector(&self) -> u32 {
        self.fs_info_sector
    }

    #[must_use]
    #[inline]
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }

    #[must_use]
    #[inline]
    /// One past the highest FAT index holding a data cluster.
    pub const fn fat_entry_count(&self) -> u32 {
        self.total_clusters + 2
    }

    #[must_use]
    #[inline]
    pub const fn is_data_cluster(&self, cluster: Cluster) -> bool {
        cluster.value() >= 2 && cluster.value() < self.fat_entry_count()
    }

    #[must_use]
    #[inline]
    /// Location of a cluster's FAT entry: sector relative to the start of
    /// the FAT, and byte offset within that sector.
    pub const fn fat_location(cluster: Cluster) -> (u32, usize) {
        let index = cluster.value() as usize * 4;
        ((index / SECTOR_SIZE) as u32, index % SECTOR_SIZE)
    }

    /// First sector of a data cluster.
    pub fn cluster_to_lba(&self, cluster: Cluster) -> FatResult<u32> {
        if !self.is_data_cluster(cluster) {
            log::warn!("Cluster {:#x} is outside the data area", cluster.value());
            return Err(FatError::Inconsistent);
        }
        Ok(self.cluster_heap_begin + (cluster.value() - 2) * self.sectors_per_cluster)
    }
}

/// FS-info sector contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    /// `None` when the sector stores "unknown".
    free_clusters: Option<u32>,
}

impl FsInfo {
    const LEAD_SIGNATURE: u32 = 0x4161_5252;
    const STRUCT_SIGNATURE: u32 = 0x6141_7272;
    const FREE_COUNT_OFFSET: usize = 0x1E8;
    const UNKNOWN: u32 = 0xFFFF_FFFF;

    #[must_use]
    /// Returns `None` if the sector does not carry the FS-info signatures.
    pub fn parse(sector: &Sector) -> Option<Self> {
        if read_u32(sector, 0) != Self::LEAD_SIGNATURE
            || read_u32(sector, 0x1E4) != Self::STRUCT_SIGNATURE
        {
            return None;
        }
        let free_clusters = match read_u32(sector, Self::FREE_COUNT_OFFSET) {
            Self::UNKNOWN => None,
            n => Some(n),
        };
        Some(Self { free_clusters })
    }

    #[must_use]
    #[inline]
    pub const fn free_clusters(&self) -> Option<u32> {
        self.free_clusters
    }

    /// Stores a free-cluster count into an FS-info sector.
    pub fn write_free_clusters(sector: &mut Sector, free_clusters: u32) {
        write_u32(sector, Self::FREE_COUNT_OFFSET, free_clusters);
    }
}
