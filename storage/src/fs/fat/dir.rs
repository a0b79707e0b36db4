//! Directory iteration, lookup and creation.
use super::{
    Cluster, FatError, FatFs, FatResult,
    date::DateTime,
    dirent::{
        Attributes, DIR_ENTRY_SIZE, DirEntry, ENTRIES_PER_SECTOR, LongNameBuffer, LongNameEntry,
        MAX_NAME_UNITS, Slot, calc_short_name_checksum, encode_long_name, long_name_entries,
    },
};
use crate::{BlockDevice, SECTOR_SIZE, fs::FileType};
use alloc::{string::String, vec::Vec};

/// Where an 8.3 entry is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotPosition {
    cluster: Cluster,
    sector: u32,
    index: u32,
}

/// A file or directory found in (or created in) a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    name: String,
    short_name: String,
    attributes: Attributes,
    start_cluster: Cluster,
    size: u32,
    modified: DateTime,
    /// `None` for the root directory, which has no entry of its own.
    position: Option<SlotPosition>,
}

impl DirectoryEntry {
    fn from_dir_entry(entry: &DirEntry, name: Option<String>, position: SlotPosition) -> Self {
        let short_name = entry.short_name();
        Self {
            name: name.unwrap_or_else(|| short_name.clone()),
            short_name,
            attributes: entry.attributes(),
            start_cluster: entry.first_cluster(),
            size: entry.file_size(),
            modified: entry.modified(),
            position: Some(position),
        }
    }

    #[must_use]
    #[inline]
    /// The long name if the entry has one, else the 8.3 name.
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    #[inline]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        self.attributes
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    #[must_use]
    #[inline]
    pub const fn file_type(&self) -> FileType {
        if self.is_directory() {
            FileType::Directory
        } else {
            FileType::File
        }
    }

    #[must_use]
    #[inline]
    /// First cluster of the entry's chain, `Cluster::FREE` if it has none.
    pub const fn start_cluster(&self) -> Cluster {
        self.start_cluster
    }

    #[must_use]
    #[inline]
    /// Size in bytes. Only meaningful for files.
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    #[inline]
    pub const fn modified(&self) -> DateTime {
        self.modified
    }

    #[must_use]
    #[inline]
    pub const fn is_root(&self) -> bool {
        self.position.is_none()
    }

    #[inline]
    pub(crate) const fn set_start_cluster(&mut self, cluster: Cluster) {
        self.start_cluster = cluster;
    }

    #[inline]
    pub(crate) const fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    #[must_use]
    #[inline]
    pub(crate) const fn position(&self) -> Option<SlotPosition> {
        self.position
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.short_name.eq_ignore_ascii_case(name)
    }
}

/// Position within a directory's chain of slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirCursor {
    first_cluster: Cluster,
    cluster: Cluster,
    sector: u32,
    /// Next slot in the sector; `ENTRIES_PER_SECTOR` once the sector is used up.
    index: u32,
    /// Clusters entered since the start, to detect looping chains.
    hops: u32,
}

impl DirCursor {
    const fn new(first_cluster: Cluster) -> Self {
        Self {
            first_cluster,
            cluster: first_cluster,
            sector: 0,
            index: 0,
            hops: 0,
        }
    }

    /// Goes back to the first slot of the directory.
    pub const fn rewind(&mut self) {
        *self = Self::new(self.first_cluster);
    }

    #[must_use]
    #[inline]
    pub const fn first_cluster(&self) -> Cluster {
        self.first_cluster
    }
}

/// Checks a name for a new entry and converts it to UTF-16.
fn encode_name(name: &str) -> FatResult<Vec<u16>> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(FatError::BadInput);
    }
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.len() > MAX_NAME_UNITS {
        return Err(FatError::BadInput);
    }
    Ok(units)
}

impl<D: BlockDevice> FatFs<D> {
    #[must_use]
    pub fn root(&self) -> DirectoryEntry {
        DirectoryEntry {
            name: String::from("/"),
            short_name: String::new(),
            attributes: Attributes::new(Attributes::DIRECTORY),
            start_cluster: self.volume.root_cluster(),
            size: 0,
            modified: DateTime::DOS_EPOCH,
            position: None,
        }
    }

    /// Returns a cursor at the first slot of directory `dir`.
    pub fn dir_cursor(&self, dir: &DirectoryEntry) -> FatResult<DirCursor> {
        if !dir.is_directory() {
            return Err(FatError::BadInput);
        }
        // `..` entries pointing at the root store cluster 0
        let first = if dir.start_cluster().is_free() {
            self.volume.root_cluster()
        } else {
            dir.start_cluster()
        };
        Ok(DirCursor::new(first))
    }

    fn slots_per_cluster(&self) -> u32 {
        self.volume.sectors_per_cluster() * ENTRIES_PER_SECTOR
    }

    /// Loads the sector holding the cursor's slot, moving to the next sector
    /// or cluster first if the current one is used up.
    ///
    /// Returns `false`, leaving the cursor in place, at the end of the chain.
    fn load_dir_sector(&mut self, cursor: &mut DirCursor) -> FatResult<bool> {
        if cursor.index == ENTRIES_PER_SECTOR {
            if cursor.sector + 1 == self.volume.sectors_per_cluster() {
                let Some(next) = self.next_cluster(cursor.cluster)? else {
                    return Ok(false);
                };
                cursor.hops += 1;
                if cursor.hops > self.volume.total_clusters() {
                    log::warn!(
                        "Directory chain at {} loops",
                        cursor.first_cluster.value()
                    );
                    return Err(FatError::Inconsistent);
                }
                cursor.cluster = next;
                cursor.sector = 0;
            } else {
                cursor.sector += 1;
            }
            cursor.index = 0;
        }

        let lba = self.volume.cluster_to_lba(cursor.cluster)? + cursor.sector;
        self.dir_cache.ensure(&mut self.device, lba)?;
        Ok(true)
    }

    fn slot(&self, index: u32) -> Slot {
        let offset = index as usize * DIR_ENTRY_SIZE;
        let mut slot = [0; DIR_ENTRY_SIZE];
        slot.copy_from_slice(&self.dir_cache.data()[offset..offset + DIR_ENTRY_SIZE]);
        slot
    }

    /// Returns the next entry of the directory, or `None` at its end.
    ///
    /// Deleted slots and volume labels are skipped. At the end the cursor is
    /// left on the end-of-directory slot, where new entries go.
    pub fn read_dir(&mut self, cursor: &mut DirCursor) -> FatResult<Option<DirectoryEntry>> {
        let mut long_name = LongNameBuffer::new();
        loop {
            if !self.load_dir_sector(cursor)? {
                return Ok(None);
            }
            let raw = self.slot(cursor.index);
            let entry = DirEntry::from_bytes(raw);
            if entry.is_end() {
                return Ok(None);
            }
            cursor.index += 1;

            if entry.is_deleted() {
                long_name.clear();
                continue;
            }
            if entry.attributes().is_long_name() {
                long_name.push(&LongNameEntry::from_bytes(raw));
                continue;
            }
            if entry.attributes().is_volume_id() {
                long_name.clear();
                continue;
            }

            let position = SlotPosition {
                cluster: cursor.cluster,
                sector: cursor.sector,
                index: cursor.index - 1,
            };
            let name = long_name.take(entry.checksum());
            return Ok(Some(DirectoryEntry::from_dir_entry(&entry, name, position)));
        }
    }

    /// Counts the slots from the cursor to the end of the directory's chain.
    fn remaining_slots(&mut self, cursor: &DirCursor) -> FatResult<u32> {
        let spc = self.volume.sectors_per_cluster();
        let mut remaining =
            (spc - cursor.sector - 1) * ENTRIES_PER_SECTOR + (ENTRIES_PER_SECTOR - cursor.index);

        let mut cluster = cursor.cluster;
        let mut hops = 0;
        while let Some(next) = self.next_cluster(cluster)? {
            hops += 1;
            if hops > self.volume.total_clusters() {
                return Err(FatError::Inconsistent);
            }
            remaining += self.slots_per_cluster();
            cluster = next;
        }
        Ok(remaining)
    }

    /// Makes sure `count` consecutive slots are available from the cursor,
    /// growing the directory by zero-filled clusters if needed.
    pub fn allocate_dirents(&mut self, cursor: &DirCursor, count: u32) -> FatResult<()> {
        let mut remaining = self.remaining_slots(cursor)?;
        if remaining >= count {
            return Ok(());
        }

        let mut last = self.last_cluster(cursor.cluster)?;
        while remaining < count {
            last = self.allocate_cluster(last)?;
            self.clear_cluster(last)?;
            remaining += self.slots_per_cluster();
        }
        self.flush_fat()
    }

    /// Writes a slot at the cursor and advances it.
    fn write_slot(&mut self, cursor: &mut DirCursor, slot: &Slot) -> FatResult<()> {
        if !self.load_dir_sector(cursor)? {
            return Err(FatError::Inconsistent);
        }
        let offset = cursor.index as usize * DIR_ENTRY_SIZE;
        self.dir_cache.data_mut()[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(slot);
        cursor.index += 1;
        Ok(())
    }

    /// Rewrites the 8.3 entry of `entry` with its current size and start
    /// cluster.
    pub(crate) fn write_back_entry(&mut self, entry: &DirectoryEntry) -> FatResult<()> {
        let position = entry.position().ok_or(FatError::BadInput)?;
        let lba = self.volume.cluster_to_lba(position.cluster)? + position.sector;
        self.dir_cache.ensure(&mut self.device, lba)?;

        let mut raw = DirEntry::from_bytes(self.slot(position.index));
        raw.set_file_size(entry.size());
        raw.set_first_cluster(entry.start_cluster());

        let offset = position.index as usize * DIR_ENTRY_SIZE;
        self.dir_cache.data_mut()[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(raw.as_bytes());
        Ok(())
    }

    /// Writes the `.` and `..` entries of a new directory and clears the
    /// rest of its cluster.
    fn init_directory(&mut self, cluster: Cluster, parent: Cluster) -> FatResult<()> {
        let timestamp = self.options.timestamp();
        let attributes = Attributes::new(Attributes::DIRECTORY);

        let mut dot = DirEntry::new(DirEntry::DOT_ENTRY, attributes, timestamp);
        dot.set_first_cluster(cluster);
        let mut dotdot = DirEntry::new(DirEntry::DOTDOT_ENTRY, attributes, timestamp);
        // FAT32 stores a root parent as cluster 0
        if parent != self.volume.root_cluster() {
            dotdot.set_first_cluster(parent);
        }

        let mut sector = [0u8; SECTOR_SIZE];
        sector[..DIR_ENTRY_SIZE].copy_from_slice(dot.as_bytes());
        sector[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE].copy_from_slice(dotdot.as_bytes());

        let first = self.volume.cluster_to_lba(cluster)?;
        let count = self.volume.sectors_per_cluster();
        self.forget_sectors(first, count);
        self.device.write_sector(first, &sector)?;
        let zero = [0u8; SECTOR_SIZE];
        for lba in first + 1..first + count {
            self.device.write_sector(lba, &zero)?;
        }
        Ok(())
    }

    /// Creates an entry named `name` at the end of the directory.
    ///
    /// `parent` must sit on the end-of-directory slot, as left by
    /// [`Self::read_dir`] returning `None`. On success it is moved past the
    /// new entry.
    pub fn create_entry(
        &mut self,
        name: &str,
        parent: &mut DirCursor,
        directory: bool,
    ) -> FatResult<DirectoryEntry> {
        let units = encode_name(name)?;
        let slots = 1 + long_name_entries(units.len()) as u32;

        let remaining = self.remaining_slots(parent)?;
        let mut clusters_needed = slots
            .saturating_sub(remaining)
            .div_ceil(self.slots_per_cluster());
        if directory {
            clusters_needed += 1;
        }
        if self.volume.free_clusters() < clusters_needed {
            return Err(FatError::NoSpace);
        }

        // Space was checked above, running out now means the FAT lied
        let lied = |err| match err {
            FatError::NoSpace => FatError::Inconsistent,
            err => err,
        };
        self.allocate_dirents(parent, slots).map_err(lied)?;

        let short_name = self.names.next_name();
        let checksum = calc_short_name_checksum(&short_name);
        let start = parent.clone();
        let mut cursor = parent.clone();
        for fragment in encode_long_name(&units, checksum) {
            self.write_slot(&mut cursor, fragment.as_bytes())?;
        }

        let attributes = if directory {
            Attributes::DIRECTORY | Attributes::ARCHIVE
        } else {
            Attributes::ARCHIVE
        };
        let mut entry = DirEntry::new(
            &short_name,
            Attributes::new(attributes),
            self.options.timestamp(),
        );
        if directory {
            let cluster = self.allocate_cluster(Cluster::FREE).map_err(lied)?;
            self.init_directory(cluster, parent.first_cluster())?;
            self.flush_fat()?;
            entry.set_first_cluster(cluster);
        }
        self.write_slot(&mut cursor, entry.as_bytes())?;
        self.flush_dir()?;

        log::debug!(
            "Created {} \"{}\" ({}) using {} slots",
            if directory { "directory" } else { "file" },
            name,
            entry.short_name(),
            slots
        );

        *parent = cursor;
        let mut read_back = start;
        self.read_dir(&mut read_back)?.ok_or(FatError::Inconsistent)
    }

    /// Looks `name` up in the directory (ignoring ASCII case, matching long
    /// or 8.3 names), creating it if missing and `create` is set.
    pub fn find_or_create(
        &mut self,
        name: &str,
        parent: &mut DirCursor,
        directory: bool,
        create: bool,
    ) -> FatResult<DirectoryEntry> {
        parent.rewind();
        while let Some(entry) = self.read_dir(parent)? {
            if entry.matches(name) {
                return Ok(entry);
            }
        }
        if !create {
            return Err(FatError::NotFound);
        }
        self.create_entry(name, parent, directory)
    }

    /// Writes a description of every slot of a directory to `out`, stopping
    /// at the end-of-directory marker.
    ///
    /// Failures of `out` itself are returned as [`DumpError::Output`].
    pub fn dump_directory(
        &mut self,
        dir: &DirectoryEntry,
        out: &mut impl core::fmt::Write,
    ) -> Result<(), DumpError> {
        let mut cursor = self.dir_cursor(dir)?;
        let mut current = None;
        while self.load_dir_sector(&mut cursor)? {
            if current != Some(cursor.cluster) {
                current = Some(cursor.cluster);
                writeln!(out, "cluster {:#010x}", cursor.cluster.value())?;
            }

            let raw = self.slot(cursor.index);
            write!(out, "  {}/{:2} ", cursor.sector, cursor.index)?;
            if raw[0] == DirEntry::END_OF_ENTRIES {
                writeln!(out, "end of directory")?;
                return Ok(());
            }
            cursor.index += 1;

            let entry = DirEntry::from_bytes(raw);
            if entry.attributes().is_long_name() {
                let lfn = LongNameEntry::from_bytes(raw);
                write!(out, "long  order {:2}", lfn.order())?;
                if lfn.is_last() {
                    write!(out, " (last)")?;
                }
                write!(out, " checksum {:02x} \"", lfn.checksum())?;
                let units = (0..LongNameEntry::CHARS_PER_ENTRY)
                    .map(|i| lfn.get_name(i))
                    .take_while(|&unit| unit != 0 && unit != 0xFFFF);
                for c in char::decode_utf16(units) {
                    let c = c.ok().filter(|c| !c.is_control()).unwrap_or('.');
                    write!(out, "{c}")?;
                }
                write!(out, "\"")?;
            } else {
                write!(
                    out,
                    "short {:12} attr {:02x} checksum {:02x} cluster {} size {}",
                    entry.short_name(),
                    entry.attributes().bits(),
                    entry.checksum(),
                    entry.first_cluster().value(),
                    entry.file_size()
                )?;
            }
            if entry.is_deleted() {
                write!(out, " deleted")?;
            }
            writeln!(out)?;
        }
        writeln!(out, "end of chain")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Fat(#[from] FatError),
    #[error("Failed to write the directory dump")]
    Output(#[from] core::fmt::Error),
}
