//! On-disk directory slots: 8.3 entries and long-name fragments.
use super::{
    Cluster,
    date::{Date, DateTime, Time},
    endian::{read_u16, read_u32, write_u16, write_u32},
};
use alloc::string::String;

/// Size of a directory entry in bytes (always 32 bytes)
pub const DIR_ENTRY_SIZE: usize = 32;
/// Directory slots per sector.
pub const ENTRIES_PER_SECTOR: u32 = 16;
/// Longest long name, in UTF-16 units.
pub const MAX_NAME_UNITS: usize = 255;

/// A raw 32-byte directory slot.
pub type Slot = [u8; DIR_ENTRY_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Directory entry attributes
pub struct Attributes(u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    /// Marks a long file name fragment
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    const LONG_NAME_MASK: u8 = Self::LONG_NAME | Self::DIRECTORY | Self::ARCHIVE;

    #[must_use]
    #[inline]
    pub const fn new(attributes: u8) -> Self {
        Self(attributes)
    }

    #[must_use]
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn is_read_only(&self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_hidden(&self) -> bool {
        self.0 & Self::HIDDEN != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_volume_id(&self) -> bool {
        self.0 & Self::VOLUME_ID != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_archive(&self) -> bool {
        self.0 & Self::ARCHIVE != 0
    }

    #[must_use]
    #[inline]
    pub const fn is_long_name(&self) -> bool {
        (self.0 & Self::LONG_NAME_MASK) == Self::LONG_NAME
    }
}

/// An 8.3 directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    raw: Slot,
}

impl DirEntry {
    /// Deleted entry marker (first byte)
    pub const DELETED_ENTRY: u8 = 0xE5;
    /// End of directory marker (first byte)
    pub const END_OF_ENTRIES: u8 = 0x00;
    /// Stands for a leading 0xE5 in a real name
    const KANJI_E5: u8 = 0x05;
    /// Dot entry (current directory)
    pub const DOT_ENTRY: &'static [u8; 11] = b".          ";
    /// Dotdot entry (parent directory)
    pub const DOTDOT_ENTRY: &'static [u8; 11] = b"..         ";

    const NT_LOWER_BASE: u8 = 0x08;
    const NT_LOWER_EXT: u8 = 0x10;

    #[must_use]
    #[inline]
    pub const fn from_bytes(raw: Slot) -> Self {
        Self { raw }
    }

    #[must_use]
    /// A fresh entry with every time stamp set to `timestamp`.
    pub fn new(name: &[u8; 11], attributes: Attributes, timestamp: DateTime) -> Self {
        let mut entry = Self {
            raw: [0; DIR_ENTRY_SIZE],
        };
        entry.raw[..11].copy_from_slice(name);
        entry.raw[11] = attributes.bits();

        let date = timestamp.date().encode();
        let time = timestamp.time().encode();
        entry.raw[13] = timestamp.time().encode_tenths();
        write_u16(&mut entry.raw, 14, time);
        write_u16(&mut entry.raw, 16, date);
        write_u16(&mut entry.raw, 18, date);
        write_u16(&mut entry.raw, 22, time);
        write_u16(&mut entry.raw, 24, date);
        entry
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &Slot {
        &self.raw
    }

    #[must_use]
    #[inline]
    pub const fn is_end(&self) -> bool {
        self.raw[0] == Self::END_OF_ENTRIES
    }

    #[must_use]
    #[inline]
    pub const fn is_deleted(&self) -> bool {
        self.raw[0] == Self::DELETED_ENTRY
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        Attributes::new(self.raw[11])
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.attributes().is_directory()
    }

    #[must_use]
    /// The name and extension fields, space padded.
    pub fn filename_raw(&self) -> [u8; 11] {
        let mut name = [0; 11];
        name.copy_from_slice(&self.raw[..11]);
        name
    }

    #[must_use]
    /// The 8.3 name as displayed: padding removed, dot only if there is an
    /// extension.
    pub fn short_name(&self) -> String {
        let nt_flags = self.raw[12];
        let mut name = String::with_capacity(12);

        let push = |name: &mut String, bytes: &[u8], lower: bool| {
            let len = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
            for &b in &bytes[..len] {
                let b = if lower { b.to_ascii_lowercase() } else { b };
                name.push(char::from(b));
            }
        };

        let mut base = [0; 8];
        base.copy_from_slice(&self.raw[..8]);
        if base[0] == Self::KANJI_E5 {
            base[0] = Self::DELETED_ENTRY;
        }
        push(&mut name, &base, nt_flags & Self::NT_LOWER_BASE != 0);

        let ext = &self.raw[8..11];
        if ext.iter().any(|&b| b != b' ') {
            name.push('.');
            push(&mut name, ext, nt_flags & Self::NT_LOWER_EXT != 0);
        }
        name
    }

    #[must_use]
    pub const fn first_cluster(&self) -> Cluster {
        let high = read_u16(&self.raw, 0x14) as u32;
        let low = read_u16(&self.raw, 0x1A) as u32;
        Cluster::new((high << 16) | low)
    }

    pub fn set_first_cluster(&mut self, cluster: Cluster) {
        write_u16(&mut self.raw, 0x14, (cluster.value() >> 16) as u16);
        write_u16(&mut self.raw, 0x1A, (cluster.value() & 0xFFFF) as u16);
    }

    #[must_use]
    #[inline]
    pub const fn file_size(&self) -> u32 {
        read_u32(&self.raw, 0x1C)
    }

    #[inline]
    pub fn set_file_size(&mut self, size: u32) {
        write_u32(&mut self.raw, 0x1C, size);
    }

    #[must_use]
    /// Last modification date and time.
    pub const fn modified(&self) -> DateTime {
        DateTime::new(
            Date::decode(read_u16(&self.raw, 24)),
            Time::decode(read_u16(&self.raw, 22), 0),
        )
    }

    #[must_use]
    pub fn checksum(&self) -> u8 {
        calc_short_name_checksum(&self.filename_raw())
    }
}

/// Entry for long file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongNameEntry {
    raw: Slot,
}

impl LongNameEntry {
    /// Flag of the fragment holding the end of the name
    pub const LAST_ENTRY: u8 = 0x40;
    const ORDER_MASK: u8 = 0x1F;
    pub const CHARS_PER_ENTRY: usize = 13;
    /// Fragments needed by a name of `MAX_NAME_UNITS` units.
    pub const MAX_ENTRIES: u8 = 20;
    /// Byte offsets of the 13 UTF-16 units
    const CHAR_OFFSETS: [usize; Self::CHARS_PER_ENTRY] =
        [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

    #[must_use]
    #[inline]
    pub const fn from_bytes(raw: Slot) -> Self {
        Self { raw }
    }

    #[must_use]
    pub fn new(order: u8, last: bool, checksum: u8) -> Self {
        let mut raw = [0; DIR_ENTRY_SIZE];
        raw[0] = if last { order | Self::LAST_ENTRY } else { order };
        raw[11] = Attributes::LONG_NAME;
        raw[13] = checksum;
        Self { raw }
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &Slot {
        &self.raw
    }

    #[must_use]
    #[inline]
    /// 1-based position of the fragment within the name.
    pub const fn order(&self) -> u8 {
        self.raw[0] & Self::ORDER_MASK
    }

    #[must_use]
    #[inline]
    pub const fn is_last(&self) -> bool {
        self.raw[0] & Self::LAST_ENTRY != 0
    }

    #[must_use]
    #[inline]
    pub const fn checksum(&self) -> u8 {
        self.raw[13]
    }

    #[must_use]
    pub const fn get_name(&self, index: usize) -> u16 {
        read_u16(&self.raw, Self::CHAR_OFFSETS[index])
    }

    pub fn set_name(&mut self, index: usize, unit: u16) {
        write_u16(&mut self.raw, Self::CHAR_OFFSETS[index], unit);
    }
}

#[must_use]
pub fn calc_short_name_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

#[must_use]
/// Number of fragments needed to store a name of `units` UTF-16 units.
pub const fn long_name_entries(units: usize) -> usize {
    units.div_ceil(LongNameEntry::CHARS_PER_ENTRY)
}

/// Splits a name into long-name fragments, in on-disk order (last fragment
/// first).
///
/// The name is NUL terminated when it does not fill its last fragment, and
/// the remaining units are `0xFFFF`.
pub fn encode_long_name(units: &[u16], checksum: u8) -> impl Iterator<Item = LongNameEntry> + '_ {
    let count = long_name_entries(units.len());
    (1..=count).rev().map(move |order| {
        let mut entry = LongNameEntry::new(order as u8, order == count, checksum);
        let base = (order - 1) * LongNameEntry::CHARS_PER_ENTRY;
        for i in 0..LongNameEntry::CHARS_PER_ENTRY {
            let unit = match (base + i).cmp(&units.len()) {
                core::cmp::Ordering::Less => units[base + i],
                core::cmp::Ordering::Equal => 0,
                core::cmp::Ordering::Greater => 0xFFFF,
            };
            entry.set_name(i, unit);
        }
        entry
    })
}

/// Collects long-name fragments while a directory is scanned.
pub struct LongNameBuffer {
    units: [u16; LongNameEntry::MAX_ENTRIES as usize * LongNameEntry::CHARS_PER_ENTRY],
    /// Bit `n - 1` is set once fragment `n` was seen.
    present: u32,
    /// Number of fragments announced by the last fragment, 0 if none yet.
    count: u8,
    checksum: u8,
    mismatch: bool,
}

impl LongNameBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            units: [0; LongNameEntry::MAX_ENTRIES as usize * LongNameEntry::CHARS_PER_ENTRY],
            present: 0,
            count: 0,
            checksum: 0,
            mismatch: false,
        }
    }

    pub const fn clear(&mut self) {
        self.present = 0;
        self.count = 0;
        self.mismatch = false;
    }

    pub fn push(&mut self, entry: &LongNameEntry) {
        let order = entry.order();
        if order == 0 || order > LongNameEntry::MAX_ENTRIES {
            log::debug!("Ignoring long name fragment with order {order}");
            return;
        }

        // The last fragment is stored first and starts a new name
        if entry.is_last() {
            self.clear();
            self.count = order;
            self.checksum = entry.checksum();
        } else if entry.checksum() != self.checksum {
            self.mismatch = true;
        }

        let base = usize::from(order - 1) * LongNameEntry::CHARS_PER_ENTRY;
        for i in 0..LongNameEntry::CHARS_PER_ENTRY {
            self.units[base + i] = entry.get_name(i);
        }
        self.present |= 1 << (order - 1);
    }

    /// Returns the collected name if it is complete and belongs to the 8.3
    /// entry with checksum `short_checksum`, and resets the buffer.
    pub fn take(&mut self, short_checksum: u8) -> Option<String> {
        let complete = self.count != 0
            && self.present == (1u32 << self.count) - 1
            && !self.mismatch
            && self.checksum == short_checksum;
        let count = usize::from(self.count);
        let had_fragments = self.present != 0;
        self.clear();

        if !complete {
            if had_fragments {
                log::warn!("Discarding incomplete or orphaned long name");
            }
            return None;
        }

        let units = &self.units[..count * LongNameEntry::CHARS_PER_ENTRY];
        let len = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        let name: String = char::decode_utf16(units[..len].iter().copied())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        (!name.is_empty()).then_some(name)
    }
}

impl Default for LongNameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Generator of placeholder 8.3 names for new entries.
///
/// Names are eleven random capital letters. Uniqueness within a directory is
/// not checked.
#[derive(Debug, Clone)]
pub struct ShortNameGen {
    state: u32,
}

impl ShortNameGen {
    #[must_use]
    #[inline]
    pub const fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Folds more entropy into the generator.
    pub const fn mix(&mut self, value: u32) {
        self.state ^= value;
    }

    pub fn next_name(&mut self) -> [u8; 11] {
        let mut name = [b'A'; 11];
        for b in &mut name {
            self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            *b += ((self.state >> 16) % 26) as u8;
        }
        name
    }
}
