//! Hand-built FAT32 images for unit tests.
use super::{
    dirent::{DIR_ENTRY_SIZE, Slot},
    endian::{write_u16, write_u32},
};
use crate::SECTOR_SIZE;
use alloc::vec::Vec;
use cf_core::storage::RamDisk;

const RESERVED_SECTORS: u32 = 32;

struct PlannedFile {
    slot: Slot,
    start: u32,
    data: Vec<u8>,
}

/// Builds a small FAT32 volume whose root directory lives in cluster 2.
pub struct ImageBuilder {
    sectors_per_cluster: u8,
    clusters: u32,
    fat_count: u8,
    partition_offset: u32,
    /// `None` uses the real count, `Some(None)` stores "unknown".
    fs_info_free: Option<Option<u32>>,
    fill_fat: bool,
    files: Vec<PlannedFile>,
    raw_slots: Vec<Slot>,
}

impl ImageBuilder {
    pub const fn new() -> Self {
        Self {
            sectors_per_cluster: 1,
            clusters: 200,
            fat_count: 2,
            partition_offset: 0,
            fs_info_free: None,
            fill_fat: false,
            files: Vec::new(),
            raw_slots: Vec::new(),
        }
    }

    pub const fn sectors_per_cluster(mut self, sectors_per_cluster: u8) -> Self {
        self.sectors_per_cluster = sectors_per_cluster;
        self
    }

    pub const fn clusters(mut self, clusters: u32) -> Self {
        self.clusters = clusters;
        self
    }

    pub const fn fat_count(mut self, fat_count: u8) -> Self {
        self.fat_count = fat_count;
        self
    }

    /// Places the volume in the first partition of an MBR disk.
    pub const fn partition_offset(mut self, partition_offset: u32) -> Self {
        self.partition_offset = partition_offset;
        self
    }

    pub const fn fs_info_free(mut self, free: Option<u32>) -> Self {
        self.fs_info_free = Some(free);
        self
    }

    /// Marks every data cluster as used in the FAT.
    pub const fn fill_fat(mut self) -> Self {
        self.fill_fat = true;
        self
    }

    /// Adds a file stored contiguously from cluster `start`, with its 8.3
    /// entry appended to the root directory.
    pub fn file(mut self, name: &[u8; 11], start: u32, data: &[u8]) -> Self {
        let mut slot = [0u8; DIR_ENTRY_SIZE];
        slot[..11].copy_from_slice(name);
        slot[11] = 0x20;
        write_u16(&mut slot, 0x14, (start >> 16) as u16);
        write_u16(&mut slot, 0x1A, (start & 0xFFFF) as u16);
        write_u32(&mut slot, 0x1C, data.len() as u32);
        self.files.push(PlannedFile {
            slot,
            start,
            data: data.to_vec(),
        });
        self
    }

    /// Appends a raw slot to the root directory, after the files.
    pub fn root_slot(mut self, slot: Slot) -> Self {
        self.raw_slots.push(slot);
        self
    }

    fn sectors_per_fat(&self) -> u32 {
        ((self.clusters + 2) * 4).div_ceil(SECTOR_SIZE as u32)
    }

    fn cluster_bytes(&self) -> usize {
        usize::from(self.sectors_per_cluster) * SECTOR_SIZE
    }

    pub fn build(self) -> RamDisk {
        let spc = u32::from(self.sectors_per_cluster);
        let spf = self.sectors_per_fat();
        let fat_count = u32::from(self.fat_count);
        let heap = RESERVED_SECTORS + fat_count * spf;
        let total_sectors = heap + self.clusters * spc;

        let mut disk = RamDisk::new(self.partition_offset + total_sectors);
        let bytes = disk.as_bytes_mut();
        let base = self.partition_offset as usize * SECTOR_SIZE;
        let at = |lba: u32| base + lba as usize * SECTOR_SIZE;

        if self.partition_offset != 0 {
            bytes[0x1BE + 4] = 0x0C;
            write_u32(bytes, 0x1C6, self.partition_offset);
            write_u32(bytes, 0x1CA, total_sectors);
            write_u16(bytes, 0x1FE, 0xAA55);
        }

        // Boot sector
        let vbr = &mut bytes[base..base + SECTOR_SIZE];
        vbr[..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        vbr[3..11].copy_from_slice(b"CFDRIVE ");
        write_u16(vbr, 0x0B, SECTOR_SIZE as u16);
        vbr[0x0D] = self.sectors_per_cluster;
        write_u16(vbr, 0x0E, RESERVED_SECTORS as u16);
        vbr[0x10] = self.fat_count;
        vbr[0x15] = 0xF8;
        write_u32(vbr, 0x20, total_sectors);
        write_u32(vbr, 0x24, spf);
        write_u32(vbr, 0x2C, 2);
        write_u16(vbr, 0x30, 1);
        write_u16(vbr, 0x32, 6);
        vbr[0x42] = 0x29;
        write_u32(vbr, 0x43, 0x1234_5678);
        vbr[0x47..0x52].copy_from_slice(b"NO NAME    ");
        vbr[82..90].copy_from_slice(b"FAT32   ");
        write_u16(vbr, 0x1FE, 0xAA55);

        // FAT
        let mut fat = alloc::vec![0u32; (self.clusters + 2) as usize];
        fat[0] = 0x0FFF_FFF8;
        fat[1] = 0x0FFF_FFFF;
        fat[2] = 0x0FFF_FFFF;
        for file in &self.files {
            let clusters = file.data.len().div_ceil(self.cluster_bytes()).max(1) as u32;
            for i in 0..clusters {
                let cluster = (file.start + i) as usize;
                fat[cluster] = if i + 1 == clusters {
                    0x0FFF_FFFF
                } else {
                    file.start + i + 1
                };
            }
        }
        if self.fill_fat {
            for entry in &mut fat[3..] {
                if *entry == 0 {
                    *entry = 0x0FFF_FFFF;
                }
            }
        }
        let used = fat[2..].iter().filter(|&&e| e != 0).count() as u32;
        for copy in 0..fat_count {
            let start = at(RESERVED_SECTORS + copy * spf);
            for (i, &entry) in fat.iter().enumerate() {
                write_u32(bytes, start + i * 4, entry);
            }
        }

        // FS-info
        let fs_info = at(1);
        write_u32(bytes, fs_info, 0x4161_5252);
        write_u32(bytes, fs_info + 0x1E4, 0x6141_7272);
        let free = match self.fs_info_free {
            None => self.clusters - used,
            Some(None) => 0xFFFF_FFFF,
            Some(Some(free)) => free,
        };
        write_u32(bytes, fs_info + 0x1E8, free);
        write_u32(bytes, fs_info + 0x1EC, 0xFFFF_FFFF);
        write_u16(bytes, fs_info + 0x1FE, 0xAA55);

        // Root directory and file contents
        let cluster_at = |cluster: u32| at(heap + (cluster - 2) * spc);
        let root = cluster_at(2);
        let slots = self.files.iter().map(|f| &f.slot).chain(&self.raw_slots);
        for (i, slot) in slots.enumerate() {
            let offset = root + i * DIR_ENTRY_SIZE;
            bytes[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(slot);
        }
        for file in &self.files {
            let start = cluster_at(file.start);
            bytes[start..start + file.data.len()].copy_from_slice(&file.data);
        }

        disk
    }
}

/// Deterministic file contents.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
