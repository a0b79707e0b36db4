//! Positioned file I/O on top of cluster chains.
use super::{Cluster, FatEntry, FatError, FatFs, FatResult, dir::DirectoryEntry};
use crate::{BlockDevice, SECTOR_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Reference point of a seek.
pub enum Whence {
    /// From the start of the file.
    Set,
    /// From the current position.
    Cur,
    /// From the end of the file.
    End,
}

impl TryFrom<i32> for Whence {
    type Error = FatError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Set),
            1 => Ok(Self::Cur),
            2 => Ok(Self::End),
            _ => Err(FatError::BadInput),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    create: bool,
    directory: bool,
}

impl OpenOptions {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            create: false,
            directory: false,
        }
    }

    #[must_use]
    #[inline]
    /// Create the entry if it does not exist.
    pub const fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    #[must_use]
    #[inline]
    /// Created entries are directories.
    pub const fn directory(mut self, directory: bool) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    /// Parses a flag string: `c` sets `create`, `d` sets `directory`.
    /// Other characters are ignored.
    pub fn from_flags(flags: &str) -> Self {
        flags.chars().fold(Self::new(), |options, flag| match flag {
            'c' => options.create(true),
            'd' => options.directory(true),
            _ => options,
        })
    }

    #[must_use]
    #[inline]
    pub const fn is_create(&self) -> bool {
        self.create
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.directory
    }
}

/// An open file: its directory entry and a byte cursor.
///
/// The cursor points just past the last byte consumed, so `offset` is 512
/// once a sector has been fully used. The next cluster is only looked up
/// when more data is actually needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    entry: DirectoryEntry,
    position: u32,
    cluster: Cluster,
    sector: u32,
    offset: usize,
}

impl OpenFile {
    #[must_use]
    pub const fn new(entry: DirectoryEntry) -> Self {
        let cluster = entry.start_cluster();
        Self {
            entry,
            position: 0,
            cluster,
            sector: 0,
            offset: 0,
        }
    }

    #[must_use]
    #[inline]
    pub const fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    #[must_use]
    #[inline]
    pub const fn is_dir(&self) -> bool {
        self.entry.is_directory()
    }

    #[must_use]
    #[inline]
    pub const fn size(&self) -> u32 {
        self.entry.size()
    }

    #[must_use]
    #[inline]
    /// Current position from the start of the file.
    pub const fn tell(&self) -> u32 {
        self.position
    }
}

impl<D: BlockDevice> FatFs<D> {
    /// Opens (or creates, depending on `options`) `name` in directory
    /// `parent`.
    pub fn open_in(
        &mut self,
        name: &str,
        parent: &DirectoryEntry,
        options: OpenOptions,
    ) -> FatResult<OpenFile> {
        let mut cursor = self.dir_cursor(parent)?;
        let entry =
            self.find_or_create(name, &mut cursor, options.is_directory(), options.is_create())?;
        Ok(OpenFile::new(entry))
    }

    /// Returns the sector holding the byte after the cursor, moving the
    /// cursor to the next sector or cluster if the current one is used up.
    fn file_sector(&mut self, file: &mut OpenFile) -> FatResult<u32> {
        if file.offset == SECTOR_SIZE {
            let mut cluster = file.cluster;
            let mut sector = file.sector + 1;
            if sector == self.volume.sectors_per_cluster() {
                cluster = self
                    .next_cluster(cluster)?
                    .ok_or(FatError::EndOfFile)?;
                sector = 0;
            }
            file.cluster = cluster;
            file.sector = sector;
            file.offset = 0;
        }

        if !self.volume.is_data_cluster(file.cluster) {
            log::warn!(
                "File \"{}\" of {} bytes has no valid cluster",
                file.entry.name(),
                file.entry.size()
            );
            return Err(FatError::Inconsistent);
        }
        Ok(self.volume.cluster_to_lba(file.cluster)? + file.sector)
    }

    /// Reads from the cursor into `buf`, returning how many bytes were read.
    ///
    /// Reads stop at the end of the file; `Ok(0)` means the cursor is there.
    pub fn read(&mut self, file: &mut OpenFile, buf: &mut [u8]) -> FatResult<usize> {
        let remaining = (file.size() - file.position) as usize;
        let len = buf.len().min(remaining);

        let mut done = 0;
        while done < len {
            let lba = self.file_sector(file)?;
            self.file_cache.ensure(&mut self.device, lba)?;

            let chunk = (SECTOR_SIZE - file.offset).min(len - done);
            buf[done..done + chunk]
                .copy_from_slice(&self.file_cache.data()[file.offset..file.offset + chunk]);
            file.offset += chunk;
            done += chunk;
            file.position += chunk as u32;
        }
        Ok(done)
    }

    /// Moves the cursor, clamping the target to `0..=size`, and returns the
    /// new position.
    pub fn seek(&mut self, file: &mut OpenFile, offset: i64, whence: Whence) -> FatResult<u32> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => i64::from(file.position),
            Whence::End => i64::from(file.size()),
        };
        let target = base
            .saturating_add(offset)
            .clamp(0, i64::from(file.size()));
        // Clamped to a u32 above
        let target = u32::try_from(target).map_err(|_| FatError::BadInput)?;
        self.seek_to(file, target)?;
        Ok(target)
    }

    /// Places the cursor at `position`, which must be within the file.
    fn seek_to(&mut self, file: &mut OpenFile, position: u32) -> FatResult<()> {
        let start = file.entry.start_cluster();
        if position == 0 {
            file.position = 0;
            file.cluster = start;
            file.sector = 0;
            file.offset = 0;
            return Ok(());
        }
        if !self.volume.is_data_cluster(start) {
            return Err(FatError::Inconsistent);
        }

        let cluster_bytes = self.volume.bytes_per_cluster();
        let last_byte = position - 1;
        let cluster = self.nth_cluster(start, last_byte / cluster_bytes)?;
        let within = (last_byte % cluster_bytes) as usize;

        file.position = position;
        file.cluster = cluster;
        file.sector = (within / SECTOR_SIZE) as u32;
        file.offset = within % SECTOR_SIZE + 1;
        Ok(())
    }

    /// Grows or shrinks a file to `size` bytes, then writes its directory
    /// entry back.
    ///
    /// New clusters are not cleared. Setting the current size is a no-op.
    pub fn set_size(&mut self, entry: &mut DirectoryEntry, size: u32) -> FatResult<()> {
        if entry.is_directory() || entry.is_root() {
            return Err(FatError::BadInput);
        }
        if entry.size() == size {
            return Ok(());
        }

        let cluster_bytes = self.volume.bytes_per_cluster();
        let old_clusters = entry.size().div_ceil(cluster_bytes);
        let new_clusters = size.div_ceil(cluster_bytes);

        if new_clusters > old_clusters {
            // The chain may be longer than the size says, even for empty files
            let start = entry.start_cluster();
            let (mut last, length) = if start.is_free() {
                (Cluster::FREE, 0)
            } else {
                self.chain_end(start)?
            };
            let needed = new_clusters.saturating_sub(length);
            if self.volume.free_clusters() < needed {
                return Err(FatError::NoSpace);
            }

            for _ in 0..needed {
                // Space was checked above, running out now means the FAT lied
                let cluster = self.allocate_cluster(last).map_err(|err| match err {
                    FatError::NoSpace => FatError::Inconsistent,
                    err => err,
                })?;
                if last.is_free() {
                    entry.set_start_cluster(cluster);
                }
                last = cluster;
            }
        } else if new_clusters < old_clusters {
            let start = entry.start_cluster();
            if new_clusters == 0 {
                self.free_chain(start)?;
                entry.set_start_cluster(Cluster::FREE);
            } else {
                let last = self.nth_cluster(start, new_clusters - 1)?;
                let tail = self.next_cluster(last)?;
                self.set_fat_entry(last, FatEntry::EndOfChain)?;
                if let Some(tail) = tail {
                    self.free_chain(tail)?;
                }
            }
        }

        entry.set_size(size);
        self.flush_fat()?;
        self.write_back_entry(entry)?;
        self.flush_dir()?;

        log::trace!(
            "Resized \"{}\" to {} bytes ({} clusters)",
            entry.name(),
            size,
            new_clusters
        );
        Ok(())
    }

    /// Resizes an open file, pulling its cursor back if it is past the new
    /// end.
    pub fn resize(&mut self, file: &mut OpenFile, size: u32) -> FatResult<()> {
        self.set_size(&mut file.entry, size)?;
        let position = file.position.min(size);
        self.seek_to(file, position)
    }

    /// Writes `data` at the cursor, growing the file as needed.
    ///
    /// The data sectors are flushed before returning.
    pub fn write(&mut self, file: &mut OpenFile, data: &[u8]) -> FatResult<usize> {
        if file.is_dir() {
            return Err(FatError::BadInput);
        }
        let end = u32::try_from(data.len())
            .ok()
            .and_then(|len| file.position.checked_add(len))
            .ok_or(FatError::BadInput)?;
        if end > file.size() {
            self.set_size(&mut file.entry, end)?;
            // An empty file had no chain to point the cursor at
            self.seek_to(file, file.position)?;
        }

        let mut done = 0;
        while done < data.len() {
            let lba = self.file_sector(file)?;
            self.file_cache.ensure(&mut self.device, lba)?;

            let chunk = (SECTOR_SIZE - file.offset).min(data.len() - done);
            self.file_cache.data_mut()[file.offset..file.offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            file.offset += chunk;
            done += chunk;
            file.position += chunk as u32;
        }
        self.flush_file()?;
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat::{
        MountOptions,
        testing::{ImageBuilder, pattern},
    };
    use alloc::{vec, vec::Vec};
    use cf_core::storage::RamDisk;

    fn mount(builder: ImageBuilder) -> FatFs<RamDisk> {
        FatFs::mount(builder.build(), MountOptions::default()).unwrap()
    }

    fn open(fs: &mut FatFs<RamDisk>, name: &str) -> OpenFile {
        let root = fs.root();
        fs.open_in(name, &root, OpenOptions::new()).unwrap()
    }

    fn read_all(fs: &mut FatFs<RamDisk>, file: &mut OpenFile) -> Vec<u8> {
        let mut data = Vec::new();
        let mut chunk = [0u8; 700];
        loop {
            let n = fs.read(file, &mut chunk).unwrap();
            if n == 0 {
                return data;
            }
            data.extend_from_slice(&chunk[..n]);
        }
    }

    #[test]
    fn test_whence_from_raw() {
        assert_eq!(Whence::try_from(0), Ok(Whence::Set));
        assert_eq!(Whence::try_from(1), Ok(Whence::Cur));
        assert_eq!(Whence::try_from(2), Ok(Whence::End));
        assert_eq!(Whence::try_from(3), Err(FatError::BadInput));
        assert_eq!(Whence::try_from(-1), Err(FatError::BadInput));
    }

    #[test]
    fn test_open_flags() {
        assert_eq!(OpenOptions::from_flags(""), OpenOptions::new());
        let options = OpenOptions::from_flags("cd");
        assert!(options.is_create());
        assert!(options.is_directory());
        let options = OpenOptions::from_flags("rc");
        assert!(options.is_create());
        assert!(!options.is_directory());
    }

    #[test]
    fn test_read_whole_file_once() {
        let data = pattern(65536);
        let mut fs = mount(
            ImageBuilder::new()
                .sectors_per_cluster(4)
                .file(b"MENU    BIN", 10, &data),
        );
        let mut file = open(&mut fs, "MENU.BIN");
        assert_eq!(file.size(), 65536);
        assert!(!file.is_dir());

        let first = fs.volume().cluster_to_lba(Cluster::new(10)).unwrap();
        fs.device.reset_stats();

        let mut buf = vec![0u8; 65536];
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 65536);
        assert_eq!(buf, data);
        assert_eq!(file.tell(), 65536);

        // Every data sector exactly once, plus the FAT sector of the chain
        let log = fs.device().read_log();
        let data_reads = log.iter().filter(|&&lba| lba >= first && lba < first + 128).count();
        assert_eq!(data_reads, 128);
        assert!(fs.device().reads() <= 129);

        // At the end: nothing more, no error
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_in_chunks() {
        let data = pattern(5000);
        let mut fs = mount(ImageBuilder::new().sectors_per_cluster(2).file(b"DATA    BIN", 40, &data));
        let mut file = open(&mut fs, "data.bin");
        assert_eq!(read_all(&mut fs, &mut file), data);
    }

    #[test]
    fn test_seek() {
        let data = pattern(5000);
        let mut fs = mount(ImageBuilder::new().sectors_per_cluster(2).file(b"DATA    BIN", 40, &data));
        let mut file = open(&mut fs, "DATA.BIN");
        let mut buf = [0u8; 100];

        // Cluster boundary: 1024 bytes per cluster
        for position in [0, 1, 511, 512, 1023, 1024, 1025, 4900] {
            assert_eq!(fs.seek(&mut file, position, Whence::Set).unwrap(), position as u32);
            let n = fs.read(&mut file, &mut buf).unwrap();
            assert_eq!(n, 100);
            assert_eq!(&buf[..n], &data[position as usize..position as usize + 100]);
        }

        assert_eq!(fs.seek(&mut file, -200, Whence::End).unwrap(), 4800);
        assert_eq!(fs.seek(&mut file, 50, Whence::Cur).unwrap(), 4850);
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 100);
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 50);
        assert_eq!(&buf[..50], &data[4950..]);

        // Clamped to the file
        assert_eq!(fs.seek(&mut file, 10, Whence::End).unwrap(), 5000);
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 0);
        assert_eq!(fs.seek(&mut file, -10, Whence::Set).unwrap(), 0);
        assert_eq!(file.tell(), 0);
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 100);
        assert_eq!(&buf[..], &data[..100]);
    }

    #[test]
    fn test_short_chain() {
        let mut fs = mount(ImageBuilder::new().file(b"SHORT   BIN", 10, &pattern(1536)));
        fs.set_fat_entry(Cluster::new(11), FatEntry::EndOfChain).unwrap();

        let mut file = open(&mut fs, "SHORT.BIN");
        let mut buf = [0u8; 1536];
        let err = fs.read(&mut file, &mut buf).unwrap_err();
        assert_eq!(err, FatError::EndOfFile);
        assert!(err.needs_check());

        assert_eq!(fs.seek(&mut file, 1500, Whence::Set), Err(FatError::EndOfFile));
    }

    #[test]
    fn test_size_without_chain() {
        let mut fs = mount(ImageBuilder::new());
        let root = fs.root();
        let mut file = fs
            .open_in("empty", &root, OpenOptions::new().create(true))
            .unwrap();
        assert_eq!(file.size(), 0);
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 0);
        assert_eq!(fs.seek(&mut file, 5, Whence::Set).unwrap(), 0);
    }

    #[test]
    fn test_set_size_grow_and_shrink() {
        let mut fs = mount(ImageBuilder::new());
        let free = fs.free_clusters();
        let root = fs.root();
        let mut entry = fs
            .open_in("grow.bin", &root, OpenOptions::new().create(true))
            .unwrap()
            .entry()
            .clone();

        fs.set_size(&mut entry, 5000).unwrap();
        assert_eq!(fs.free_clusters(), free - 10);
        let start = entry.start_cluster();
        assert!(start.is_valid());

        // The directory entry on disk was updated
        let reopened = open(&mut fs, "grow.bin");
        assert_eq!(reopened.size(), 5000);
        assert_eq!(reopened.entry().start_cluster(), start);
        assert_eq!(fs.nth_cluster(start, 9).map(|_| ()), Ok(()));
        assert_eq!(fs.nth_cluster(start, 10), Err(FatError::EndOfFile));

        // Same size: nothing written
        let writes = fs.device().writes();
        fs.set_size(&mut entry, 5000).unwrap();
        assert_eq!(fs.device().writes(), writes);

        fs.set_size(&mut entry, 600).unwrap();
        assert_eq!(fs.free_clusters(), free - 2);
        assert_eq!(fs.last_cluster(start).unwrap(), fs.nth_cluster(start, 1).unwrap());

        fs.set_size(&mut entry, 0).unwrap();
        assert_eq!(fs.free_clusters(), free);
        assert_eq!(entry.start_cluster(), Cluster::FREE);
        assert_eq!(fs.fat_entry(start).unwrap(), FatEntry::Free);
        assert_eq!(open(&mut fs, "grow.bin").entry(), &entry);
    }

    #[test]
    fn test_set_size_extends_existing_chain() {
        let data = pattern(700);
        let mut fs = mount(ImageBuilder::new().file(b"DATA    BIN", 10, &data));
        let free = fs.free_clusters();
        let mut file = open(&mut fs, "DATA.BIN");

        fs.resize(&mut file, 2000).unwrap();
        assert_eq!(fs.free_clusters(), free - 2);
        assert_eq!(file.entry().start_cluster(), Cluster::new(10));
        assert_eq!(fs.nth_cluster(Cluster::new(10), 1), Ok(Cluster::new(11)));

        // Existing data untouched
        let mut buf = [0u8; 700];
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 700);
        assert_eq!(&buf[..], &data[..]);

        fs.seek(&mut file, 0, Whence::End).unwrap();
        fs.resize(&mut file, 100).unwrap();
        assert_eq!(file.tell(), 100);
        assert_eq!(fs.free_clusters(), free + 1);
    }

    #[test]
    fn test_set_size_reuses_chain_of_empty_file() {
        let mut fs = mount(ImageBuilder::new().file(b"EMPTY   BIN", 10, &[]));
        let free = fs.free_clusters();
        let mut entry = open(&mut fs, "EMPTY.BIN").entry().clone();
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.start_cluster(), Cluster::new(10));

        fs.set_size(&mut entry, 100).unwrap();
        assert_eq!(entry.start_cluster(), Cluster::new(10));
        assert_eq!(fs.free_clusters(), free);
        assert_eq!(fs.fat_entry(Cluster::new(10)).unwrap(), FatEntry::EndOfChain);

        fs.set_size(&mut entry, 600).unwrap();
        assert_eq!(fs.free_clusters(), free - 1);
        assert_eq!(fs.chain_end(Cluster::new(10)).unwrap().1, 2);
        assert_eq!(open(&mut fs, "EMPTY.BIN").entry(), &entry);
    }

    #[test]
    fn test_set_size_counts_the_real_chain() {
        let mut fs = mount(ImageBuilder::new().file(b"DATA    BIN", 10, &pattern(1536)));
        let free = fs.free_clusters();
        let mut entry = open(&mut fs, "DATA.BIN").entry().clone();
        // Three clusters on disk, but the entry claims none are used
        entry.set_size(0);

        fs.set_size(&mut entry, 1000).unwrap();
        assert_eq!(fs.free_clusters(), free);
        assert_eq!(entry.start_cluster(), Cluster::new(10));
        assert_eq!(fs.chain_end(Cluster::new(10)).unwrap(), (Cluster::new(12), 3));
    }

    #[test]
    fn test_set_size_no_space() {
        let mut fs = mount(ImageBuilder::new().clusters(8));
        let free = fs.free_clusters();
        let root = fs.root();
        let mut file = fs
            .open_in("big", &root, OpenOptions::new().create(true))
            .unwrap();
        let mut entry = file.entry().clone();

        assert_eq!(fs.set_size(&mut entry, 512 * 8), Err(FatError::NoSpace));
        assert_eq!(fs.free_clusters(), free);
        assert_eq!(entry.size(), 0);

        // Filling the volume exactly is fine
        fs.resize(&mut file, 512 * free).unwrap();
        assert_eq!(fs.free_clusters(), 0);
    }

    #[test]
    fn test_set_size_rejects_directories() {
        let mut fs = mount(ImageBuilder::new());
        let mut root = fs.root();
        assert_eq!(fs.set_size(&mut root, 10), Err(FatError::BadInput));

        let mut dir = fs
            .open_in("dir", &root, OpenOptions::from_flags("cd"))
            .unwrap()
            .entry()
            .clone();
        assert_eq!(fs.set_size(&mut dir, 10), Err(FatError::BadInput));
    }

    #[test]
    fn test_write_and_read_back() {
        let mut fs = mount(ImageBuilder::new());
        let root = fs.root();
        let data = pattern(3000);

        let mut file = fs
            .open_in("out.bin", &root, OpenOptions::new().create(true))
            .unwrap();
        assert_eq!(fs.write(&mut file, &data).unwrap(), 3000);
        assert_eq!(file.size(), 3000);
        assert_eq!(file.tell(), 3000);

        // Overwrite across a sector boundary, then append
        fs.seek(&mut file, 500, Whence::Set).unwrap();
        fs.write(&mut file, &[0xAA; 24]).unwrap();
        fs.seek(&mut file, 0, Whence::End).unwrap();
        fs.write(&mut file, b"tail").unwrap();

        let mut expected = data;
        expected[500..524].fill(0xAA);
        expected.extend_from_slice(b"tail");

        let mut file = open(&mut fs, "OUT.BIN");
        assert_eq!(file.size(), 3004);
        assert_eq!(read_all(&mut fs, &mut file), expected);
    }

    #[test]
    fn test_write_to_directory() {
        let mut fs = mount(ImageBuilder::new());
        let root = fs.root();
        let mut dir = fs.open_in("d", &root, OpenOptions::from_flags("cd")).unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs.write(&mut dir, b"x"), Err(FatError::BadInput));
    }
}
