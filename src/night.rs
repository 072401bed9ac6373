//! Observing-night numbers.
//!
//! A night is a 4-digit integer counting days from the epoch 2023-02-23
//! (night 0). Date arguments accept either the integer directly or an ISO
//! calendar date.

use crate::Result;
use anyhow::{Context, bail};
use chrono::NaiveDate;

pub const MIN_NIGHT: i64 = 0;
pub const MAX_NIGHT: i64 = 9999;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 2, 23).expect("epoch date")
}

/// Night number of a calendar date. Negative before the epoch.
pub fn from_date(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

/// Parse a night argument: a bare integer passes through, anything else is
/// tried as an ISO date.
pub fn parse(arg: &str) -> Result<i64> {
    if let Ok(night) = arg.parse::<i64>() {
        return Ok(night);
    }
    let date = NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .with_context(|| format!("invalid date: {arg}"))?;
    Ok(from_date(date))
}

/// Clamp a night into the supported 0..=9999 range, warning when the value
/// falls outside it.
pub fn clamp(night: i64, label: &str) -> u16 {
    if night < MIN_NIGHT {
        log::warn!("date value before modern OCA era: {label}={night}");
        return MIN_NIGHT as u16;
    }
    if night > MAX_NIGHT {
        log::warn!("date value later than 2050-07-11 not fully supported, {label}={night}");
        return MAX_NIGHT as u16;
    }
    night as u16
}

/// Resolve a date argument list into an inclusive night range.
///
/// No argument means the full range; one argument is a single night; two
/// are start and end. The returned range may be empty (start > end) —
/// callers treat that as a valid, empty selection.
pub fn parse_range(args: &[String]) -> Result<(u16, u16)> {
    match args {
        [] => Ok((MIN_NIGHT as u16, MAX_NIGHT as u16)),
        [single] => {
            let night = clamp(parse(single)?, "date");
            Ok((night, night))
        }
        [start, end] => Ok((clamp(parse(start)?, "start"), clamp(parse(end)?, "end"))),
        _ => bail!("date takes one or two values, got {}", args.len()),
    }
}
