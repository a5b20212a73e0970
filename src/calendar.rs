use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{AvailabilityRow, RelationalStore, UnavailabilityRow};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySegment {
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u8,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl AvailabilitySegment {
    pub fn new(weekday: u8, start_minute: u32, end_minute: u32) -> Option<Self> {
        let valid = weekday < 7 && end_minute <= MINUTES_PER_DAY && end_minute > start_minute;
        valid.then_some(Self {
            weekday,
            start_minute,
            end_minute,
        })
    }

    pub fn from_row(row: &AvailabilityRow) -> Option<Self> {
        let weekday = u8::try_from(row.day_of_week?).ok()?;
        let start = parse_time_to_minutes(row.start_time.as_deref()?)?;
        let end = parse_time_to_minutes(row.end_time.as_deref()?)?;
        Self::new(weekday, start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailabilityInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UnavailabilityInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    fn from_row(row: &UnavailabilityRow, offset: FixedOffset) -> Option<Self> {
        Self::new(
            local_to_utc(row.start?, offset),
            local_to_utc(row.end?, offset),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MinuteRange {
    start: u32,
    end: u32,
}

/// A professional's weekly opening hours plus blackout windows, used to
/// measure elapsed time only through declared availability.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    days: [Vec<MinuteRange>; 7],
    blackouts: Vec<UnavailabilityInterval>,
    offset: FixedOffset,
    always_open: bool,
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::always_open(utc_offset())
    }
}

impl BusinessCalendar {
    pub fn always_open(offset: FixedOffset) -> Self {
        Self {
            days: std::array::from_fn(|_| {
                vec![MinuteRange {
                    start: 0,
                    end: MINUTES_PER_DAY,
                }]
            }),
            blackouts: Vec::new(),
            offset,
            always_open: true,
        }
    }

    /// Builds a calendar from raw segments. An empty segment list means the
    /// professional never declared hours and is treated as open around the clock.
    pub fn new(
        segments: &[AvailabilitySegment],
        blackouts: Vec<UnavailabilityInterval>,
        offset: FixedOffset,
    ) -> Self {
        let mut calendar = if segments.is_empty() {
            Self::always_open(offset)
        } else {
            let mut days: [Vec<MinuteRange>; 7] = Default::default();
            for segment in segments {
                days[segment.weekday as usize].push(MinuteRange {
                    start: segment.start_minute,
                    end: segment.end_minute,
                });
            }
            Self {
                days: days.map(merge_ranges),
                blackouts: Vec::new(),
                offset,
                always_open: false,
            }
        };
        calendar.blackouts = merge_blackouts(blackouts);
        calendar
    }

    /// Reads availability and blackouts for a professional. Read failures
    /// degrade to the always-open calendar instead of failing the caller.
    pub async fn load(
        store: Option<&dyn RelationalStore>,
        professional_id: &str,
        offset: FixedOffset,
    ) -> Self {
        let Some(store) = store else {
            return Self::always_open(offset);
        };

        let (availability, unavailability) = tokio::join!(
            store.availability(professional_id),
            store.unavailability(professional_id)
        );

        let segments: Vec<AvailabilitySegment> = match availability {
            Ok(rows) => rows.iter().filter_map(AvailabilitySegment::from_row).collect(),
            Err(err) => {
                warn!(professional_id, error = %err, "availability query failed");
                Vec::new()
            }
        };

        let blackouts = match unavailability {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| UnavailabilityInterval::from_row(row, offset))
                .collect(),
            Err(err) => {
                warn!(professional_id, error = %err, "unavailability query failed");
                Vec::new()
            }
        };

        Self::new(&segments, blackouts, offset)
    }

    pub fn is_always_open(&self) -> bool {
        self.always_open
    }

    pub fn blackout_count(&self) -> usize {
        self.blackouts.len()
    }

    /// Minutes between `start` and `end` that fall inside available hours and
    /// outside every blackout. Zero when `end <= start`.
    pub fn elapsed_business_minutes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        if end <= start {
            return 0.0;
        }

        let mut total = 0.0;
        let mut cursor = start;
        while cursor < end {
            let local = cursor.with_timezone(&self.offset);
            let day_start = local_to_utc(local.date_naive().and_time(NaiveTime::MIN), self.offset);
            let day_end = day_start
                .checked_add_signed(Duration::days(1))
                .unwrap_or(end);
            if day_end <= cursor {
                break;
            }
            let limit = end.min(day_end);
            let weekday = local.weekday().num_days_from_sunday() as usize;

            for range in &self.days[weekday] {
                let Some(open) = day_start.checked_add_signed(Duration::minutes(range.start.into()))
                else {
                    continue;
                };
                let close = day_start
                    .checked_add_signed(Duration::minutes(range.end.into()))
                    .unwrap_or(limit);
                let window_start = cursor.max(open);
                let window_end = limit.min(close);
                if window_end <= window_start {
                    continue;
                }
                let mut minutes = minutes_between(window_start, window_end);
                for blackout in &self.blackouts {
                    let overlap_start = blackout.start.max(window_start);
                    let overlap_end = blackout.end.min(window_end);
                    if overlap_end > overlap_start {
                        minutes -= minutes_between(overlap_start, overlap_end);
                    }
                }
                if minutes > 0.0 {
                    total += minutes;
                }
            }

            cursor = day_end;
        }

        total.max(0.0)
    }
}

/// Accepts `H`, `HH:MM` or `HH:MM:SS`, clamped into a single day.
pub fn parse_time_to_minutes(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours: i64 = parts.next()?.trim().parse().ok()?;
    let minutes: i64 = match parts.next() {
        Some(part) => {
            let part = part.trim();
            part.get(..part.len().min(2))?.parse().ok()?
        }
        None => 0,
    };
    let total = (hours * 60 + minutes).clamp(0, MINUTES_PER_DAY as i64);
    u32::try_from(total).ok()
}

pub fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    match offset.from_local_datetime(&naive).single() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(utc_offset)
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn merge_ranges(mut ranges: Vec<MinuteRange>) -> Vec<MinuteRange> {
    ranges.sort_by_key(|range| range.start);
    let mut merged: Vec<MinuteRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

fn merge_blackouts(mut blackouts: Vec<UnavailabilityInterval>) -> Vec<UnavailabilityInterval> {
    blackouts.sort_by_key(|interval| interval.start);
    let mut merged: Vec<UnavailabilityInterval> = Vec::with_capacity(blackouts.len());
    for interval in blackouts {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => last.end = last.end.max(interval.end),
            _ => merged.push(interval),
        }
    }
    merged
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}
