use super::date::DateTime;

/// Tunables chosen when a volume is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    max_depth: usize,
    name_seed: u32,
    timestamp: DateTime,
}

impl MountOptions {
    /// Default depth of the path resolver's directory stack.
    pub const DEFAULT_MAX_DEPTH: usize = 16;
    const DEFAULT_NAME_SEED: u32 = 0x2545_F491;

    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            name_seed: Self::DEFAULT_NAME_SEED,
            timestamp: DateTime::DOS_EPOCH,
        }
    }

    #[must_use]
    #[inline]
    /// How many nested directories a path may descend into.
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    #[inline]
    /// Seed of the generator producing short names for new entries.
    ///
    /// It is mixed with the volume serial number and free-cluster count at
    /// mount time.
    pub const fn with_name_seed(mut self, name_seed: u32) -> Self {
        self.name_seed = name_seed;
        self
    }

    #[must_use]
    #[inline]
    /// Stamp written into the date fields of created entries.
    pub const fn with_timestamp(mut self, timestamp: DateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    #[inline]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    #[inline]
    pub const fn name_seed(&self) -> u32 {
        self.name_seed
    }

    #[must_use]
    #[inline]
    pub const fn timestamp(&self) -> DateTime {
        self.timestamp
    }
}

impl Default for MountOptions {
    fn default() -> Self {
        Self::new()
    }
}
