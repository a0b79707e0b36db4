//! DOS date and time stamps stored in directory entries.

/// A calendar date in the range DOS can store.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Date {
    /// Valid range is [1980, 2107].
    year: u16,
    /// Valid range is [1, 12].
    month: u8,
    /// Valid range is [1, 31].
    day: u8,
}

impl Date {
    const MIN_YEAR: u16 = 1980;
    const MAX_YEAR: u16 = 2107;

    /// Creates a new `Date`.
    ///
    /// # Panics
    ///
    /// Panics if one of provided arguments is out of the supported range.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        assert!(
            year >= Self::MIN_YEAR && year <= Self::MAX_YEAR,
            "year out of range"
        );
        assert!(month >= 1 && month <= 12, "month out of range");
        assert!(day >= 1 && day <= 31, "day out of range");
        Self { year, month, day }
    }

    #[must_use]
    /// Decodes an on-disk date. Fields are taken as stored, unvalidated.
    pub const fn decode(raw: u16) -> Self {
        Self {
            year: (raw >> 9) + Self::MIN_YEAR,
            month: ((raw >> 5) & 0x0F) as u8,
            day: (raw & 0x1F) as u8,
        }
    }

    #[must_use]
    pub const fn encode(self) -> u16 {
        ((self.year - Self::MIN_YEAR) << 9) | ((self.month as u16) << 5) | self.day as u16
    }

    #[must_use]
    #[inline]
    pub const fn year(&self) -> u16 {
        self.year
    }

    #[must_use]
    #[inline]
    pub const fn month(&self) -> u8 {
        self.month
    }

    #[must_use]
    #[inline]
    pub const fn day(&self) -> u8 {
        self.day
    }
}

/// A time of day with two-second resolution, plus the creation-time
/// refinement byte some entries carry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Time {
    hour: u8,
    min: u8,
    sec: u8,
}

impl Time {
    /// Creates a new `Time`.
    ///
    /// # Panics
    ///
    /// Panics if one of provided arguments is out of the supported range.
    #[must_use]
    pub const fn new(hour: u8, min: u8, sec: u8) -> Self {
        assert!(hour <= 23 && min <= 59 && sec <= 59, "time out of range");
        Self { hour, min, sec }
    }

    #[must_use]
    /// Decodes an on-disk time and its 10 ms refinement byte.
    pub const fn decode(raw: u16, tenths: u8) -> Self {
        Self {
            hour: (raw >> 11) as u8,
            min: ((raw >> 5) & 0x3F) as u8,
            sec: ((raw & 0x1F) * 2) as u8 + tenths / 100,
        }
    }

    #[must_use]
    pub const fn encode(self) -> u16 {
        ((self.hour as u16) << 11) | ((self.min as u16) << 5) | (self.sec as u16 / 2)
    }

    #[must_use]
    /// The refinement byte: odd seconds are carried as 100 units of 10 ms.
    pub const fn encode_tenths(self) -> u8 {
        (self.sec % 2) * 100
    }

    #[must_use]
    #[inline]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    #[must_use]
    #[inline]
    pub const fn min(&self) -> u8 {
        self.min
    }

    #[must_use]
    #[inline]
    pub const fn sec(&self) -> u8 {
        self.sec
    }
}

/// A DOS date and time.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DateTime {
    date: Date,
    time: Time,
}

impl DateTime {
    /// 1980-01-01 00:00:00, the smallest stamp DOS can represent.
    pub const DOS_EPOCH: Self = Self::new(Date::new(1980, 1, 1), Time::new(0, 0, 0));

    #[must_use]
    #[inline]
    pub const fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }

    #[must_use]
    #[inline]
    pub const fn date(&self) -> Date {
        self.date
    }

    #[must_use]
    #[inline]
    pub const fn time(&self) -> Time {
        self.time
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::DOS_EPOCH
    }
}
