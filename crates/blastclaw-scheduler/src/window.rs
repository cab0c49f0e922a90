//! Send-window computations.
//!
//! All times are UTC. Weekdays use ISO numbering (Monday = 1).

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::SendWindow;

fn minutes_of_day(t: DateTime<Utc>) -> u16 {
    (t.hour() * 60 + t.minute()) as u16
}

fn iso_weekday(t: DateTime<Utc>) -> u8 {
    t.weekday().number_from_monday() as u8
}

/// Same calendar date as `t`, at `minute` minutes past midnight.
fn date_at_minute(t: DateTime<Utc>, minute: u16) -> DateTime<Utc> {
    let naive = t
        .date_naive()
        .and_hms_opt(u32::from(minute) / 60, u32::from(minute) % 60, 0)
        .unwrap_or_else(|| t.naive_utc());
    Utc.from_utc_datetime(&naive)
}

/// Compute the next instant at which a send is legal under `window`,
/// starting from `now`.
///
/// If `now` already falls on an active weekday inside the daily range it
/// is returned unchanged, so the function is idempotent for a fixed
/// input. A window with no active days is a config error — there is no
/// fallback default.
pub fn next_send_slot(window: &SendWindow, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    window.validate()?;

    let minute = minutes_of_day(now);
    if window.active_days.contains(&iso_weekday(now)) {
        if minute >= window.start_minute && minute < window.end_minute {
            return Ok(now);
        }
        // Active day, but the window has not opened yet today.
        if minute < window.start_minute {
            return Ok(date_at_minute(now, window.start_minute));
        }
    }

    // Past today's window (or inactive day): cyclic forward search, at
    // most a week out.
    for offset in 1..=7 {
        let day = now + Duration::days(offset);
        if window.active_days.contains(&iso_weekday(day)) {
            return Ok(date_at_minute(day, window.start_minute));
        }
    }

    // validate() guarantees at least one day in 1..=7, so the search
    // above always hits.
    Err(BlastClawError::Config(
        "no eligible send day within a week".into(),
    ))
}

/// Assign dispatch times to `count` messages starting at
/// `next_send_slot(window, base)`, spacing them `message_interval_secs`
/// apart and rolling to the next eligible day's opening whenever a step
/// would land outside the daily range.
pub fn plan_batch(window: &SendWindow, count: usize, base: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
    window.validate()?;

    let mut slots = Vec::with_capacity(count);
    if count == 0 {
        return Ok(slots);
    }

    let mut current = next_send_slot(window, base)?;
    slots.push(current);
    for _ in 1..count {
        let stepped = current + Duration::seconds(i64::from(window.message_interval_secs));
        current = next_send_slot(window, stepped)?;
        slots.push(current);
    }

    tracing::debug!(
        "Planned {} slot(s): {} → {}",
        slots.len(),
        slots[0],
        slots[slots.len() - 1]
    );
    Ok(slots)
}
