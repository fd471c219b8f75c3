//! Time bucketing for analytics
//!
//! Buckets have a fixed width and are aligned to the start of the local day
//! (in the requested timezone) containing the oldest bound. Every bucket
//! overlapping `[oldest, newest)` is emitted, empty ones with zero counters.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::data::types::{Bucket, SpanNode};

/// Hourly buckets up to this range, daily beyond.
pub const HOURLY_RANGE_HOURS: i64 = 48;
pub const HOURLY_INTERVAL_MINUTES: i64 = 60;
pub const DAILY_INTERVAL_MINUTES: i64 = 1440;

/// Upper bound on emitted buckets per request.
pub const MAX_BUCKETS: i64 = 10_000;

/// Widest accepted bucket (one leap year).
pub const MAX_INTERVAL_MINUTES: i64 = 366 * DAILY_INTERVAL_MINUTES;

pub fn default_interval(range: TimeDelta) -> i64 {
    if range <= TimeDelta::hours(HOURLY_RANGE_HOURS) {
        HOURLY_INTERVAL_MINUTES
    } else {
        DAILY_INTERVAL_MINUTES
    }
}

/// Midnight of the local day containing `at`, in UTC.
pub fn local_day_start(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local_midnight = at.with_timezone(&tz).date_naive().and_time(chrono::NaiveTime::MIN);
    // midnight can fall in a DST gap; the zone's first instant of the day wins
    match tz.from_local_datetime(&local_midnight) {
        chrono::LocalResult::Single(start) => start.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        chrono::LocalResult::None => (0..24)
            .filter_map(|hour| {
                tz.from_local_datetime(&(local_midnight + TimeDelta::hours(hour)))
                    .earliest()
            })
            .next()
            .map_or(at, |start| start.with_timezone(&Utc)),
    }
}

/// Bucket layout for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlan {
    pub first: DateTime<Utc>,
    pub interval_minutes: i64,
    pub count: i64,
}

impl BucketPlan {
    /// `None` when the plan would exceed [`MAX_BUCKETS`]. `interval_minutes`
    /// must be in `1..=MAX_INTERVAL_MINUTES`.
    pub fn new(
        oldest: DateTime<Utc>,
        newest: DateTime<Utc>,
        interval_minutes: i64,
        tz: Tz,
    ) -> Option<Self> {
        let width = TimeDelta::minutes(interval_minutes);
        let day_start = local_day_start(oldest, tz);
        let skipped = (oldest - day_start).num_seconds().max(0) / width.num_seconds();
        let first = day_start + width * skipped as i32;

        let width_ns = width.num_nanoseconds()?;
        let range_ns = (newest - first).num_nanoseconds()?;
        let count = if range_ns <= 0 {
            0
        } else {
            range_ns / width_ns + i64::from(range_ns % width_ns != 0)
        };
        (count <= MAX_BUCKETS).then_some(Self {
            first,
            interval_minutes,
            count,
        })
    }

    fn width(&self) -> TimeDelta {
        TimeDelta::minutes(self.interval_minutes)
    }

    /// Index of the bucket containing `at`.
    pub fn index_of(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.first {
            return None;
        }
        let index = (at - self.first).num_milliseconds() / self.width().num_milliseconds();
        (index < self.count).then_some(index as usize)
    }

    pub fn fill(&self, spans: &[SpanNode]) -> Vec<Bucket> {
        let width = self.width();
        let mut buckets: Vec<Bucket> = (0..self.count)
            .map(|i| Bucket::empty(self.first + width * i as i32, self.interval_minutes))
            .collect();
        for node in spans {
            match self.index_of(node.span.start_time) {
                Some(index) => buckets[index].record(node),
                None => tracing::trace!(span_id = %node.span_id(), "Span outside bucket range"),
            }
        }
        buckets
    }
}
