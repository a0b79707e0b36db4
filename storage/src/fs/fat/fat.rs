//! The file allocation table: entry access, free-cluster search and chain
//! maintenance.
use super::{Cluster, FatError, FatFs, FatResult, bs::VolumeDescriptor};
use crate::{BlockDevice, Sector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 table entry
pub enum FatEntry {
    /// Free cluster
    Free,
    /// Used cluster, pointing to the next cluster in the chain
    Next(Cluster),
    /// Last cluster in the chain
    EndOfChain,
    /// Bad cluster
    Bad,
    /// Reserved value
    Reserved,
}

impl FatEntry {
    /// Bits of an entry that hold the cluster number.
    const MASK: u32 = 0x0FFF_FFFF;

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw & Self::MASK {
            0 => Self::Free,
            1 | 0x0FFF_FFF0..=0x0FFF_FFF6 => Self::Reserved,
            0x0FFF_FFF7 => Self::Bad,
            0x0FFF_FFF8.. => Self::EndOfChain,
            next => Self::Next(Cluster::new(next)),
        }
    }

    #[must_use]
    pub const fn into_raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Next(next) => next.value() & Self::MASK,
            Self::EndOfChain => Cluster::END_OF_CHAIN.value(),
            Self::Bad => Cluster::BAD.value(),
            Self::Reserved => 0x0FFF_FFF6,
        }
    }
}

/// Reads the entry at `offset` of a FAT sector, ignoring the top four bits.
fn read_fat_entry(sector: &Sector, offset: usize) -> FatEntry {
    FatEntry::from_raw(super::endian::read_u32(sector, offset))
}

/// Writes the entry at `offset` of a FAT sector, keeping the top four bits.
fn write_fat_entry(sector: &mut Sector, offset: usize, entry: FatEntry) {
    let kept = super::endian::read_u32(sector, offset) & !FatEntry::MASK;
    super::endian::write_u32(sector, offset, kept | entry.into_raw());
}

impl<D: BlockDevice> FatFs<D> {
    /// Loads the FAT sector holding `cluster`'s entry and returns the entry's
    /// offset within it.
    fn load_fat_sector(&mut self, cluster: Cluster) -> FatResult<usize> {
        if cluster.value() >= self.volume.fat_entry_count() {
            return Err(FatError::BadInput);
        }
        let (sector, offset) = VolumeDescriptor::fat_location(cluster);
        self.fat_cache
            .ensure(&mut self.device, self.volume.fat_begin() + sector)?;
        Ok(offset)
    }

    /// Returns the FAT entry of `cluster`.
    pub fn fat_entry(&mut self, cluster: Cluster) -> FatResult<FatEntry> {
        let offset = self.load_fat_sector(cluster)?;
        Ok(read_fat_entry(self.fat_cache.data(), offset))
    }

    /// Sets the FAT entry of data cluster `cluster`.
    ///
    /// The change stays in the FAT cache until [`Self::flush_fat`].
    pub fn set_fat_entry(&mut self, cluster: Cluster, entry: FatEntry) -> FatResult<()> {
        if cluster.value() < 2 {
            return Err(FatError::BadInput);
        }
        let offset = self.load_fat_sector(cluster)?;
        write_fat_entry(self.fat_cache.data_mut(), offset, entry);
        Ok(())
    }

    /// Finds a free cluster, scanning upwards from `hint` and then wrapping
    /// around to the start of the data area.
    pub fn find_free_cluster(&mut self, hint: u32) -> FatResult<Option<Cluster>> {
        let end = self.volume.fat_entry_count();
        let start = if (2..end).contains(&hint) { hint } else { 2 };

        for value in (start..end).chain(2..start) {
            let cluster = Cluster::new(value);
            if self.fat_entry(cluster)? == FatEntry::Free {
                return Ok(Some(cluster));
            }
        }
        Ok(None)
    }

    /// Allocates a cluster and appends it to the chain ending at `last`.
    ///
    /// `Cluster::FREE` as `last` starts a new chain. The new cluster is
    /// marked as the end of its chain.
    pub fn allocate_cluster(&mut self, last: Cluster) -> FatResult<Cluster> {
        if self.volume.free_clusters() == 0 {
            return Err(FatError::NoSpace);
        }

        let hint = if last.is_free() {
            self.next_free
        } else {
            last.value()
        };
        let Some(cluster) = self.find_free_cluster(hint)? else {
            log::warn!(
                "FAT has no free cluster but the free count is {}",
                self.volume.free_clusters()
            );
            return Err(FatError::Inconsistent);
        };

        if !last.is_free() {
            self.set_fat_entry(last, FatEntry::Next(cluster))?;
        }
        self.set_fat_entry(cluster, FatEntry::EndOfChain)?;
        self.volume
            .set_free_clusters(self.volume.free_clusters() - 1);
        self.next_free = cluster.value() + 1;

        log::trace!(
            "Allocated cluster {} after {}",
            cluster.value(),
            last.value()
        );
        Ok(cluster)
    }

    /// Returns the cluster following `cluster` in its chain, or `None` at the
    /// end of the chain.
    pub fn next_cluster(&mut self, cluster: Cluster) -> FatResult<Option<Cluster>> {
        match self.fat_entry(cluster)? {
            FatEntry::EndOfChain => Ok(None),
            FatEntry::Next(next) if self.volume.is_data_cluster(next) => Ok(Some(next)),
            entry => {
                log::warn!(
                    "Broken chain: cluster {} links to {:?}",
                    cluster.value(),
                    entry
                );
                Err(FatError::Inconsistent)
            }
        }
    }

    /// Returns the `n`th cluster of the chain starting at `start` (the 0th
    /// being `start` itself).
    ///
    /// Fails with [`FatError::EndOfFile`] if the chain is shorter.
    pub fn nth_cluster(&mut self, start: Cluster, n: u32) -> FatResult<Cluster> {
        if n >= self.volume.total_clusters() {
            return Err(FatError::Inconsistent);
        }
        let mut cluster = start;
        for _ in 0..n {
            cluster = self.next_cluster(cluster)?.ok_or(FatError::EndOfFile)?;
        }
        Ok(cluster)
    }

    /// Returns the last cluster of the chain starting at `start`.
    ///
    /// A chain longer than the volume is a cycle and reported as
    /// [`FatError::Inconsistent`].
    pub fn last_cluster(&mut self, start: Cluster) -> FatResult<Cluster> {
        self.chain_end(start).map(|(last, _)| last)
    }

    /// Returns the last cluster of the chain starting at `start` and the
    /// number of clusters in the chain.
    pub fn chain_end(&mut self, start: Cluster) -> FatResult<(Cluster, u32)> {
        let mut cluster = start;
        for length in 1..=self.volume.total_clusters() {
            match self.next_cluster(cluster)? {
                Some(next) => cluster = next,
                None => return Ok((cluster, length)),
            }
        }
        log::warn!("Cluster chain at {} loops", start.value());
        Err(FatError::Inconsistent)
    }

    /// Frees every cluster of the chain starting at `start` and returns how
    /// many were released.
    ///
    /// Stops at the first entry that is not a link to another data cluster,
    /// so a chain looping back onto itself ends once it reaches a cluster
    /// that was already freed.
    pub fn free_chain(&mut self, start: Cluster) -> FatResult<u32> {
        let mut freed = 0;
        let mut cluster = start;
        while self.volume.is_data_cluster(cluster) {
            let entry = self.fat_entry(cluster)?;
            if entry == FatEntry::Free {
                break;
            }
            self.set_fat_entry(cluster, FatEntry::Free)?;
            freed += 1;

            match entry {
                FatEntry::Next(next) => cluster = next,
                _ => break,
            }
        }

        self.volume
            .set_free_clusters(self.volume.free_clusters() + freed);
        Ok(freed)
    }

    /// Counts free clusters by scanning the whole FAT.
    pub fn count_free_clusters(&mut self) -> FatResult<u32> {
        let mut free = 0;
        for value in 2..self.volume.fat_entry_count() {
            if self.fat_entry(Cluster::new(value))? == FatEntry::Free {
                free += 1;
            }
        }
        Ok(free)
    }
}
