use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

/// Offset applied to every timestamp written to `services`. Rows are stored as
/// naive wall-clock values in this offset, not in UTC.
pub const DEFAULT_TIMESTAMP_OFFSET_HOURS: i32 = 7;

pub trait Clock {
    /// Current wall-clock time in the store's timestamp offset.
    fn now(&self) -> NaiveDateTime;

    fn offset(&self) -> FixedOffset;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetClock {
    offset: FixedOffset,
}

impl OffsetClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Default for OffsetClock {
    fn default() -> Self {
        Self::new(default_offset())
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Returns `None` when the hour count is outside a valid UTC offset.
pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    hours
        .checked_mul(3_600)
        .and_then(FixedOffset::east_opt)
}

pub fn default_offset() -> FixedOffset {
    offset_from_hours(DEFAULT_TIMESTAMP_OFFSET_HOURS).unwrap_or_else(|| Utc.fix())
}
