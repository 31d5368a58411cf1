//! Human-friendly duration strings (`500ms`, `2s`, `1m30s`, `1h`).
//!
//! Used by the command-line tools and by alert summaries.

use std::time::Duration;

use crate::{DomainError, DomainResult};

/// Parses a duration such as `500ms`, `1.5s`, `2m` or `1h30m`.
///
/// Components are summed, so `1m30s` is ninety seconds. A unit is required
/// for every component.
pub fn parse_duration(input: &str) -> DomainResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid(input, "empty duration"));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid(input, "expected a number"));
        }
        let (number, tail) = rest.split_at(num_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let value: f64 = number
            .parse()
            .map_err(|_| invalid(input, &format!("bad number {number:?}")))?;

        let scale = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(invalid(input, "missing unit (ms, s, m, h)")),
            other => return Err(invalid(input, &format!("unknown unit {other:?}"))),
        };

        let part = Duration::try_from_secs_f64(value * scale)
            .map_err(|e| invalid(input, &e.to_string()))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| invalid(input, "duration overflow"))?;
        rest = next;
    }

    Ok(total)
}

/// Formats a duration compactly, the inverse of [`parse_duration`] for
/// whole-millisecond values under a minute.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        return format!("{millis}ms");
    }

    let secs = d.as_secs();
    if secs < 60 {
        let frac = d.subsec_millis();
        if frac == 0 {
            return format!("{secs}s");
        }
        let frac = format!("{frac:03}");
        return format!("{secs}.{}s", frac.trim_end_matches('0'));
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

fn invalid(value: &str, reason: &str) -> DomainError {
    DomainError::InvalidDuration {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
