//! Day-counting over endorsement periods
//!
//! A period is walked as a sequence of dwell intervals: the span from the
//! period start to the first recorded rank change at `start_position`, then
//! from each change to the next at that change's position, and finally from
//! the last change to the effective end. Each interval contributes its day
//! count to the top-5/top-10 totals according to the position in effect at
//! the interval's start.
//!
//! Day lengths use a ceiling over elapsed milliseconds: any partial day
//! rounds up to a full day. This over-counts by up to one day per interval
//! boundary. It is a known approximation carried over intentionally; do not
//! "fix" it to exact calendar differencing without migrating stored totals.

use bson::DateTime;

use crate::db::schemas::PositionChange;

/// Milliseconds in one day
pub const MS_PER_DAY: i64 = 24 * 3600 * 1000;

/// Reserved rank meaning "not eligible for top-5/top-10 credit"
///
/// Used as the start position of admin-backdated spans, where no
/// competitive position applies.
pub const BACKDATE_POSITION: i32 = 100;

/// Day counts for a single period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodTotals {
    pub days_in_period: i64,
    pub days_in_top5: i64,
    pub days_in_top10: i64,
}

/// Elapsed days between two instants, partial days rounding up
pub fn ceil_days(start: DateTime, end: DateTime) -> i64 {
    let elapsed = end.timestamp_millis() - start.timestamp_millis();
    if elapsed <= 0 {
        return 0;
    }
    (elapsed + MS_PER_DAY - 1) / MS_PER_DAY
}

/// Count a period's days and top-5/top-10 credit
///
/// `position_history` may arrive unsorted; it is normalized by date here
/// rather than trusting insertion order. `days_in_period` spans the whole
/// `[start_date, effective_end]` range, independent of the interval walk.
pub fn count_period_days(
    start_date: DateTime,
    start_position: i32,
    position_history: &[PositionChange],
    effective_end: DateTime,
) -> PeriodTotals {
    let mut changes = position_history.to_vec();
    changes.sort_by_key(|c| c.date.timestamp_millis());

    let mut totals = PeriodTotals {
        days_in_period: ceil_days(start_date, effective_end),
        days_in_top5: 0,
        days_in_top10: 0,
    };

    let mut cursor = start_date;
    let mut position = start_position;

    for change in &changes {
        credit(&mut totals, position, ceil_days(cursor, change.date));
        cursor = change.date;
        position = change.position;
    }

    // Tail interval: last recorded position through the effective end
    credit(&mut totals, position, ceil_days(cursor, effective_end));

    totals
}

fn credit(totals: &mut PeriodTotals, position: i32, days: i64) {
    // Top-10 is inclusive of top-5, both accrue for the same interval
    if position <= 5 {
        totals.days_in_top5 += days;
    }
    if position <= 10 {
        totals.days_in_top10 += days;
    }
}
