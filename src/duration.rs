//! Human-readable durations (`"1.5h"`, `"30 secs"`, `"2 days"`) and sleeps.

use std::time::Duration;

use crate::error::{Error, Result};

const MAX_INPUT_LEN: usize = 100;

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

fn unit_ms(unit: &str) -> Option<f64> {
    let ms = match unit {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };
    Some(ms)
}

/// Parse a duration such as `"100"` (milliseconds), `"2h"`, `"1.5 days"`.
///
/// Units are case-insensitive. Negative values are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() || s.len() > MAX_INPUT_LEN {
        return Err(Error::invalid("duration", format!("'{input}' is empty or too long")));
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err(Error::invalid("duration", format!("'{input}' has no number")));
    }

    let value: f64 = number
        .parse()
        .map_err(|_| Error::invalid("duration", format!("'{number}' is not a number")))?;
    let unit = unit.trim().to_ascii_lowercase();
    let scale = unit_ms(&unit)
        .ok_or_else(|| Error::invalid("duration", format!("unknown unit '{unit}'")))?;

    let micros = (value * scale * 1000.0).round();
    // u64::MAX is not representable as f64; the cast rounds up to 2^64
    if !micros.is_finite() || micros >= u64::MAX as f64 {
        return Err(Error::invalid("duration", format!("'{input}' is out of range")));
    }
    Ok(Duration::from_micros(micros as u64))
}

/// Render `d` in its largest whole unit, e.g. `"2h"` or `"2 hours"`.
pub fn format_duration(d: Duration, long: bool) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    let units: [(f64, &str, &str); 4] = [
        (DAY, "d", "day"),
        (HOUR, "h", "hour"),
        (MINUTE, "m", "minute"),
        (SECOND, "s", "second"),
    ];
    for (size, short, name) in units {
        if ms >= size {
            return render(ms, size, short, name, long);
        }
    }
    render(ms, 1.0, "ms", "ms", long)
}

fn render(ms: f64, size: f64, short: &str, name: &str, long: bool) -> String {
    let n = (ms / size).round() as u64;
    if !long {
        return format!("{n}{short}");
    }
    if name == "ms" {
        return format!("{n} ms");
    }
    // plural once the value is at least 1.5 units
    if ms >= size * 1.5 {
        format!("{n} {name}s")
    } else {
        format!("{n} {name}")
    }
}

pub async fn sleep(d: Duration) {
    tokio::time::sleep(d).await
}

pub async fn sleep_ms(ms: u64) {
    sleep(Duration::from_millis(ms)).await
}
